use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

/// Account role, stored as its lowercase name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Standard,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Standard => "standard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct RoleParseError(pub String);

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "standard" => Ok(Self::Standard),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// Identity record. `login_id` is immutable once created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub login_id: String,
    pub role: Role,
    pub phone: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Caller supplied fields for a new account.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub login_id: String,
    pub role: Role,
    pub phone: String,
    pub email: String,
}

impl NewAccount {
    /// Build the stored record with a fresh identifier and timestamps.
    #[must_use]
    pub fn into_account(self, id: Uuid, now: DateTime<Utc>) -> Account {
        Account {
            id,
            login_id: self.login_id,
            role: self.role,
            phone: self.phone,
            email: self.email,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Mutable account fields; `None` leaves the stored value as is.
#[derive(Clone, Debug, Default)]
pub struct AccountChanges {
    pub role: Option<Role>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl AccountChanges {
    pub fn apply(self, account: &mut Account, now: DateTime<Utc>) {
        if let Some(role) = self.role {
            account.role = role;
        }
        if let Some(phone) = self.phone {
            account.phone = phone;
        }
        if let Some(email) = self.email {
            account.email = email;
        }
        account.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Admin, Role::Standard] {
            assert_eq!(role.as_str().parse::<Role>().ok(), Some(role));
        }
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn changes_touch_only_named_fields() {
        let created = Utc::now();
        let mut account = NewAccount {
            login_id: "alice1234".to_string(),
            role: Role::Standard,
            phone: "010-1234-5678".to_string(),
            email: "alice@example.com".to_string(),
        }
        .into_account(Uuid::new_v4(), created);

        let later = created + chrono::Duration::seconds(5);
        AccountChanges {
            email: Some("alice@example.org".to_string()),
            ..AccountChanges::default()
        }
        .apply(&mut account, later);

        assert_eq!(account.email, "alice@example.org");
        assert_eq!(account.phone, "010-1234-5678");
        assert_eq!(account.role, Role::Standard);
        assert_eq!(account.updated_at, later);
        assert_eq!(account.created_at, created);
    }
}
