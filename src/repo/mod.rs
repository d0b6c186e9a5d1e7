//! Replicated repository layer.
//!
//! Every repository value is bound to one of three targets: the secondary store
//! (the default for reads), the primary store, or an open transaction. Writes on
//! a value that is not bound to a transaction go to the primary. `with_tx`
//! returns a new value and leaves the receiver untouched.
//!
//! Storage-engine errors never cross this boundary; they are collapsed into
//! [`RepoError`].

use crate::model::{Account, Credential, CredentialChange, OutboxEvent};
use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    #[error("record conflicts with an existing one")]
    Conflict,
    #[error("storage failure")]
    ServerError,
}

/// One unit of work against the primary store.
///
/// `commit` and `rollback` consume the scope. Repositories still bound to it
/// fail every call with [`RepoError::ServerError`] afterwards.
#[async_trait]
pub trait Transaction: Send + Sync + Sized {
    /// # Errors
    /// Returns an error if the store rejects the commit.
    async fn commit(self) -> Result<(), RepoError>;

    /// # Errors
    /// Returns an error if the store rejects the rollback.
    async fn rollback(self) -> Result<(), RepoError>;
}

/// Opens transactions on the primary store. Nested scopes are not supported.
#[async_trait]
pub trait Transactor: Send + Sync {
    type Tx: Transaction;

    /// # Errors
    /// Returns an error if no connection can be acquired.
    async fn begin(&self) -> Result<Self::Tx, RepoError>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync + Sized {
    type Tx: Transaction;

    #[must_use]
    fn with_tx(&self, tx: &Self::Tx) -> Self;

    /// Bind reads to the primary store for read-your-writes callers.
    #[must_use]
    fn on_primary(&self) -> Self;

    /// Live accounts ordered by creation time.
    async fn list(&self, offset: u64, limit: u64) -> Result<Vec<Account>, RepoError>;

    async fn create(&self, account: &Account) -> Result<(), RepoError>;

    async fn get(&self, id: Uuid) -> Result<Account, RepoError>;

    async fn get_by_login_id(&self, login_id: &str) -> Result<Account, RepoError>;

    /// Persist role, phone, email and `updated_at` of a live account.
    async fn update(&self, account: &Account) -> Result<(), RepoError>;

    /// Soft delete.
    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CredentialRepository: Send + Sync + Sized {
    type Tx: Transaction;

    #[must_use]
    fn with_tx(&self, tx: &Self::Tx) -> Self;

    #[must_use]
    fn on_primary(&self) -> Self;

    async fn create(&self, credential: &Credential) -> Result<(), RepoError>;

    async fn get(&self, id: Uuid) -> Result<Credential, RepoError>;

    async fn update(&self, id: Uuid, change: CredentialChange) -> Result<(), RepoError>;

    /// Soft delete.
    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync + Sized {
    type Tx: Transaction;

    #[must_use]
    fn with_tx(&self, tx: &Self::Tx) -> Self;

    async fn create(&self, event: &OutboxEvent) -> Result<(), RepoError>;

    /// Hard delete, used by the relay once the event is published.
    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;
}
