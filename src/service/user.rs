//! Account lifecycle.
//!
//! Create, update and delete each run in one primary transaction holding the
//! account, credential and (for create and delete) outbox writes. Any failing
//! step rolls the whole scope back and returns the step's error. If the
//! rollback itself fails the outcome is unknown and the caller gets
//! [`ServiceError::ServerError`].

use super::ServiceError;
use crate::{
    auth::hash_secret,
    model::{
        Account, AccountChanges, AccountEvent, Credential, CredentialChange, NewAccount,
        OutboxEvent, TraceContext,
    },
    repo::{AccountRepository, CredentialRepository, OutboxRepository, Transaction, Transactor},
};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Window size used when a list call asks for zero rows.
pub const DEFAULT_LIST_LIMIT: u64 = 50;

#[async_trait]
pub trait UserService: Send + Sync {
    /// Live accounts from the secondary store. A `limit` of zero means [`DEFAULT_LIST_LIMIT`].
    async fn list_accounts(&self, offset: u64, limit: u64) -> Result<Vec<Account>, ServiceError>;

    async fn create_account(
        &self,
        fields: NewAccount,
        password: &str,
        trace: &TraceContext,
    ) -> Result<Account, ServiceError>;

    /// Read from the secondary store; may lag a just-committed write.
    async fn get_account(&self, id: Uuid) -> Result<Account, ServiceError>;

    /// Read from the primary store.
    async fn get_account_primary(&self, id: Uuid) -> Result<Account, ServiceError>;

    async fn update_account(
        &self,
        id: Uuid,
        changes: AccountChanges,
        password: &str,
    ) -> Result<Account, ServiceError>;

    async fn delete_account(&self, id: Uuid, trace: &TraceContext) -> Result<(), ServiceError>;
}

pub struct UserLifecycle<T, A, C, O> {
    transactor: T,
    accounts: A,
    credentials: C,
    outbox: O,
}

impl<T, A, C, O> UserLifecycle<T, A, C, O>
where
    T: Transactor,
    A: AccountRepository<Tx = T::Tx>,
    C: CredentialRepository<Tx = T::Tx>,
    O: OutboxRepository<Tx = T::Tx>,
{
    pub const fn new(transactor: T, accounts: A, credentials: C, outbox: O) -> Self {
        Self {
            transactor,
            accounts,
            credentials,
            outbox,
        }
    }

    async fn create_in(
        &self,
        tx: &T::Tx,
        account: &Account,
        password: &str,
        trace: &TraceContext,
    ) -> Result<(), ServiceError> {
        self.accounts.with_tx(tx).create(account).await?;

        let password = hash_secret(password.as_bytes())?;
        let credential = Credential::new(account.id, password, account.created_at);
        self.credentials.with_tx(tx).create(&credential).await?;

        let event = OutboxEvent::for_account(AccountEvent::Created, account, trace, Utc::now())?;
        self.outbox.with_tx(tx).create(&event).await?;
        Ok(())
    }

    async fn update_in(
        &self,
        tx: &T::Tx,
        id: Uuid,
        changes: AccountChanges,
        password: &str,
    ) -> Result<Account, ServiceError> {
        let accounts = self.accounts.with_tx(tx);
        let mut account = accounts.get(id).await?;
        changes.apply(&mut account, Utc::now());
        accounts.update(&account).await?;

        let password = hash_secret(password.as_bytes())?;
        self.credentials
            .with_tx(tx)
            .update(id, CredentialChange::Password(password))
            .await?;
        Ok(account)
    }

    async fn delete_in(
        &self,
        tx: &T::Tx,
        id: Uuid,
        trace: &TraceContext,
    ) -> Result<Account, ServiceError> {
        let accounts = self.accounts.with_tx(tx);
        let account = accounts.get(id).await?;
        accounts.delete(id).await?;
        self.credentials.with_tx(tx).delete(id).await?;

        let event = OutboxEvent::for_account(AccountEvent::Deleted, &account, trace, Utc::now())?;
        self.outbox.with_tx(tx).create(&event).await?;
        Ok(account)
    }
}

/// Roll back after a failed step and pick the error the caller sees.
async fn abort<Tx: Transaction>(
    operation: &'static str,
    tx: Tx,
    err: ServiceError,
) -> ServiceError {
    match tx.rollback().await {
        Ok(()) => {
            warn!(operation, error = %err, "rolled back");
            err
        }
        Err(rollback_err) => {
            error!(
                operation,
                error = %err,
                rollback_error = %rollback_err,
                "rollback failed, outcome unknown"
            );
            ServiceError::ServerError
        }
    }
}

async fn commit<Tx: Transaction>(operation: &'static str, tx: Tx) -> Result<(), ServiceError> {
    tx.commit().await.map_err(|err| {
        error!(operation, error = %err, "commit failed");
        ServiceError::from(err)
    })
}

#[async_trait]
impl<T, A, C, O> UserService for UserLifecycle<T, A, C, O>
where
    T: Transactor,
    A: AccountRepository<Tx = T::Tx>,
    C: CredentialRepository<Tx = T::Tx>,
    O: OutboxRepository<Tx = T::Tx>,
{
    async fn list_accounts(&self, offset: u64, limit: u64) -> Result<Vec<Account>, ServiceError> {
        let limit = if limit == 0 { DEFAULT_LIST_LIMIT } else { limit };
        Ok(self.accounts.list(offset, limit).await?)
    }

    async fn create_account(
        &self,
        fields: NewAccount,
        password: &str,
        trace: &TraceContext,
    ) -> Result<Account, ServiceError> {
        let account = fields.into_account(Uuid::new_v4(), Utc::now());

        let tx = self.transactor.begin().await?;
        if let Err(err) = self.create_in(&tx, &account, password, trace).await {
            return Err(abort("create_account", tx, err).await);
        }
        commit("create_account", tx).await?;

        info!(account_id = %account.id, login_id = %account.login_id, "account created");
        Ok(account)
    }

    async fn get_account(&self, id: Uuid) -> Result<Account, ServiceError> {
        Ok(self.accounts.get(id).await?)
    }

    async fn get_account_primary(&self, id: Uuid) -> Result<Account, ServiceError> {
        Ok(self.accounts.on_primary().get(id).await?)
    }

    async fn update_account(
        &self,
        id: Uuid,
        changes: AccountChanges,
        password: &str,
    ) -> Result<Account, ServiceError> {
        let tx = self.transactor.begin().await?;
        let account = match self.update_in(&tx, id, changes, password).await {
            Ok(account) => account,
            Err(err) => return Err(abort("update_account", tx, err).await),
        };
        commit("update_account", tx).await?;

        info!(account_id = %id, "account updated");
        Ok(account)
    }

    async fn delete_account(&self, id: Uuid, trace: &TraceContext) -> Result<(), ServiceError> {
        let tx = self.transactor.begin().await?;
        let account = match self.delete_in(&tx, id, trace).await {
            Ok(account) => account,
            Err(err) => return Err(abort("delete_account", tx, err).await),
        };
        commit("delete_account", tx).await?;

        info!(account_id = %id, login_id = %account.login_id, "account deleted");
        Ok(())
    }
}
