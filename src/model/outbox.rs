use super::{Account, Role};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const ACCOUNT_AGGREGATE: &str = "Account";

/// Externally significant account mutations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountEvent {
    Created,
    Deleted,
}

impl AccountEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "AccountCreated",
            Self::Deleted => "AccountDeleted",
        }
    }
}

/// Snapshot of the fields downstream consumers see.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPayload<'a> {
    pub id: Uuid,
    pub login_id: &'a str,
    pub role: Role,
}

impl<'a> From<&'a Account> for AccountPayload<'a> {
    fn from(account: &'a Account) -> Self {
        Self {
            id: account.id,
            login_id: &account.login_id,
            role: account.role,
        }
    }
}

/// Propagation headers captured by the caller, carried through untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TraceContext(BTreeMap<String, String>);

impl TraceContext {
    #[must_use]
    pub fn new(headers: BTreeMap<String, String>) -> Self {
        Self(headers)
    }

    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Serialize the headers as a JSON object.
    ///
    /// # Errors
    /// Returns an error if the map cannot be serialized.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

impl opentelemetry::propagation::Injector for TraceContext {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

/// Append-only event row. Never updated; removed by the relay after publish.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: String,
    pub trace_context: String,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// Build the event row describing `event` on `account`.
    ///
    /// # Errors
    /// Returns an error if the payload or trace context fail to serialize.
    pub fn for_account(
        event: AccountEvent,
        account: &Account,
        trace: &TraceContext,
        now: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: Uuid::now_v7(),
            aggregate_type: ACCOUNT_AGGREGATE.to_string(),
            aggregate_id: account.id.to_string(),
            event_type: event.as_str().to_string(),
            payload: serde_json::to_string(&AccountPayload::from(account))?,
            trace_context: trace.encode()?,
            created_at: now,
        })
    }
}
