//! In-memory repositories.
//!
//! Used by the test suites and for running the API without a database. The
//! store keeps a primary table set and, optionally, a lagging replica that only
//! catches up on [`MemoryStore::sync_replica`]. Transactions stage a copy of the
//! primary tables and swap it in on commit; a write gate serializes them so a
//! commit can never overwrite another writer's changes.
//!
//! Failures can be injected at named points to exercise rollback paths.

use super::{
    AccountRepository, CredentialRepository, OutboxRepository, RepoError, Transaction, Transactor,
};
use crate::model::{Account, Credential, CredentialChange, OutboxEvent};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    sync::Arc,
};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error};
use uuid::Uuid;

/// Named operations that can be forced to fail with [`RepoError::ServerError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    Commit,
    Rollback,
    AccountCreate,
    AccountUpdate,
    AccountDelete,
    CredentialCreate,
    CredentialUpdate,
    CredentialDelete,
    OutboxCreate,
    OutboxDelete,
}

/// Raw table contents, tombstoned rows included.
#[derive(Clone, Debug, Default)]
pub struct Tables {
    pub accounts: HashMap<Uuid, Account>,
    pub credentials: HashMap<Uuid, Credential>,
    pub outbox: Vec<OutboxEvent>,
}

impl Tables {
    #[must_use]
    pub fn live_account_ids(&self) -> BTreeSet<Uuid> {
        self.accounts
            .values()
            .filter(|account| account.deleted_at.is_none())
            .map(|account| account.id)
            .collect()
    }

    #[must_use]
    pub fn live_credential_ids(&self) -> BTreeSet<Uuid> {
        self.credentials
            .values()
            .filter(|credential| credential.deleted_at.is_none())
            .map(|credential| credential.id)
            .collect()
    }
}

#[derive(Default)]
struct Shared {
    primary: RwLock<Tables>,
    replica: Option<RwLock<Tables>>,
    write_gate: Arc<Mutex<()>>,
    faults: Mutex<HashSet<FailPoint>>,
}

impl Shared {
    async fn check(&self, point: FailPoint) -> Result<(), RepoError> {
        if self.faults.lock().await.contains(&point) {
            debug!("injected failure at {:?}", point);
            return Err(RepoError::ServerError);
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("lagging_replica", &self.shared.replica.is_some())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Store whose secondary reads see the primary immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose secondary only reflects the primary after [`Self::sync_replica`].
    #[must_use]
    pub fn with_replica_lag() -> Self {
        Self {
            shared: Arc::new(Shared {
                replica: Some(RwLock::new(Tables::default())),
                ..Shared::default()
            }),
        }
    }

    /// Copy the committed primary state to the replica.
    pub async fn sync_replica(&self) {
        if let Some(replica) = &self.shared.replica {
            let primary = self.shared.primary.read().await.clone();
            *replica.write().await = primary;
        }
    }

    pub async fn fail_at(&self, point: FailPoint) {
        self.shared.faults.lock().await.insert(point);
    }

    pub async fn clear_failures(&self) {
        self.shared.faults.lock().await.clear();
    }

    /// Committed primary state.
    pub async fn snapshot(&self) -> Tables {
        self.shared.primary.read().await.clone()
    }

    #[must_use]
    pub fn transactor(&self) -> MemoryTransactor {
        MemoryTransactor {
            shared: Arc::clone(&self.shared),
        }
    }

    #[must_use]
    pub fn accounts(&self) -> MemoryAccountRepository {
        MemoryAccountRepository {
            handle: self.handle(),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> MemoryCredentialRepository {
        MemoryCredentialRepository {
            handle: self.handle(),
        }
    }

    #[must_use]
    pub fn outbox(&self) -> MemoryOutboxRepository {
        MemoryOutboxRepository {
            handle: self.handle(),
        }
    }

    fn handle(&self) -> Handle {
        Handle {
            shared: Arc::clone(&self.shared),
            binding: Binding::Secondary,
        }
    }
}

struct Staged {
    tables: Tables,
    _gate: OwnedMutexGuard<()>,
}

#[derive(Clone)]
pub struct MemoryTx {
    shared: Arc<Shared>,
    staged: Arc<Mutex<Option<Staged>>>,
}

impl fmt::Debug for MemoryTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTx").finish_non_exhaustive()
    }
}

fn finished_scope() -> RepoError {
    error!("Transaction scope used after commit or rollback");
    RepoError::ServerError
}

#[async_trait]
impl Transaction for MemoryTx {
    async fn commit(self) -> Result<(), RepoError> {
        let staged = self.staged.lock().await.take().ok_or_else(finished_scope)?;
        self.shared.check(FailPoint::Commit).await?;
        *self.shared.primary.write().await = staged.tables;
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepoError> {
        let staged = self.staged.lock().await.take().ok_or_else(finished_scope)?;
        drop(staged);
        self.shared.check(FailPoint::Rollback).await
    }
}

#[derive(Clone)]
pub struct MemoryTransactor {
    shared: Arc<Shared>,
}

#[async_trait]
impl Transactor for MemoryTransactor {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, RepoError> {
        self.shared.check(FailPoint::Begin).await?;
        let gate = Arc::clone(&self.shared.write_gate).lock_owned().await;
        let tables = self.shared.primary.read().await.clone();
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            staged: Arc::new(Mutex::new(Some(Staged {
                tables,
                _gate: gate,
            }))),
        })
    }
}

#[derive(Clone)]
enum Binding {
    Secondary,
    Primary,
    Tx(MemoryTx),
}

#[derive(Clone)]
struct Handle {
    shared: Arc<Shared>,
    binding: Binding,
}

impl Handle {
    fn with_tx(&self, tx: &MemoryTx) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            binding: Binding::Tx(tx.clone()),
        }
    }

    fn on_primary(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            binding: Binding::Primary,
        }
    }

    async fn read<R, F>(&self, f: F) -> Result<R, RepoError>
    where
        F: FnOnce(&Tables) -> Result<R, RepoError> + Send,
        R: Send,
    {
        match &self.binding {
            Binding::Tx(tx) => {
                let guard = tx.staged.lock().await;
                let staged = guard.as_ref().ok_or_else(finished_scope)?;
                f(&staged.tables)
            }
            Binding::Primary => f(&*self.shared.primary.read().await),
            Binding::Secondary => match &self.shared.replica {
                Some(replica) => f(&*replica.read().await),
                None => f(&*self.shared.primary.read().await),
            },
        }
    }

    async fn write<R, F>(&self, point: FailPoint, f: F) -> Result<R, RepoError>
    where
        F: FnOnce(&mut Tables) -> Result<R, RepoError> + Send,
        R: Send,
    {
        self.shared.check(point).await?;
        match &self.binding {
            Binding::Tx(tx) => {
                let mut guard = tx.staged.lock().await;
                let staged = guard.as_mut().ok_or_else(finished_scope)?;
                f(&mut staged.tables)
            }
            Binding::Primary | Binding::Secondary => {
                let _gate = self.shared.write_gate.lock().await;
                f(&mut *self.shared.primary.write().await)
            }
        }
    }
}

fn live_account(tables: &mut Tables, id: Uuid) -> Result<&mut Account, RepoError> {
    tables
        .accounts
        .get_mut(&id)
        .filter(|account| account.deleted_at.is_none())
        .ok_or(RepoError::NotFound)
}

fn live_credential(tables: &mut Tables, id: Uuid) -> Result<&mut Credential, RepoError> {
    tables
        .credentials
        .get_mut(&id)
        .filter(|credential| credential.deleted_at.is_none())
        .ok_or(RepoError::NotFound)
}

#[derive(Clone)]
pub struct MemoryAccountRepository {
    handle: Handle,
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    type Tx = MemoryTx;

    fn with_tx(&self, tx: &MemoryTx) -> Self {
        Self {
            handle: self.handle.with_tx(tx),
        }
    }

    fn on_primary(&self) -> Self {
        Self {
            handle: self.handle.on_primary(),
        }
    }

    async fn list(&self, offset: u64, limit: u64) -> Result<Vec<Account>, RepoError> {
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        self.handle
            .read(|tables| {
                let mut live: Vec<Account> = tables
                    .accounts
                    .values()
                    .filter(|account| account.deleted_at.is_none())
                    .cloned()
                    .collect();
                live.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
                Ok(live.into_iter().skip(offset).take(limit).collect())
            })
            .await
    }

    async fn create(&self, account: &Account) -> Result<(), RepoError> {
        let account = account.clone();
        self.handle
            .write(FailPoint::AccountCreate, move |tables| {
                let handle_taken = tables.accounts.values().any(|existing| {
                    existing.deleted_at.is_none() && existing.login_id == account.login_id
                });
                if handle_taken || tables.accounts.contains_key(&account.id) {
                    return Err(RepoError::Conflict);
                }
                tables.accounts.insert(account.id, account);
                Ok(())
            })
            .await
    }

    async fn get(&self, id: Uuid) -> Result<Account, RepoError> {
        self.handle
            .read(|tables| {
                tables
                    .accounts
                    .get(&id)
                    .filter(|account| account.deleted_at.is_none())
                    .cloned()
                    .ok_or(RepoError::NotFound)
            })
            .await
    }

    async fn get_by_login_id(&self, login_id: &str) -> Result<Account, RepoError> {
        self.handle
            .read(|tables| {
                tables
                    .accounts
                    .values()
                    .find(|account| account.deleted_at.is_none() && account.login_id == login_id)
                    .cloned()
                    .ok_or(RepoError::NotFound)
            })
            .await
    }

    async fn update(&self, account: &Account) -> Result<(), RepoError> {
        let account = account.clone();
        self.handle
            .write(FailPoint::AccountUpdate, move |tables| {
                let stored = live_account(tables, account.id)?;
                stored.role = account.role;
                stored.phone = account.phone;
                stored.email = account.email;
                stored.updated_at = account.updated_at;
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.handle
            .write(FailPoint::AccountDelete, move |tables| {
                let stored = live_account(tables, id)?;
                let now = Utc::now();
                stored.deleted_at = Some(now);
                stored.updated_at = now;
                Ok(())
            })
            .await
    }
}

#[derive(Clone)]
pub struct MemoryCredentialRepository {
    handle: Handle,
}

#[async_trait]
impl CredentialRepository for MemoryCredentialRepository {
    type Tx = MemoryTx;

    fn with_tx(&self, tx: &MemoryTx) -> Self {
        Self {
            handle: self.handle.with_tx(tx),
        }
    }

    fn on_primary(&self) -> Self {
        Self {
            handle: self.handle.on_primary(),
        }
    }

    async fn create(&self, credential: &Credential) -> Result<(), RepoError> {
        let credential = credential.clone();
        self.handle
            .write(FailPoint::CredentialCreate, move |tables| {
                if tables.credentials.contains_key(&credential.id) {
                    return Err(RepoError::Conflict);
                }
                tables.credentials.insert(credential.id, credential);
                Ok(())
            })
            .await
    }

    async fn get(&self, id: Uuid) -> Result<Credential, RepoError> {
        self.handle
            .read(|tables| {
                tables
                    .credentials
                    .get(&id)
                    .filter(|credential| credential.deleted_at.is_none())
                    .cloned()
                    .ok_or(RepoError::NotFound)
            })
            .await
    }

    async fn update(&self, id: Uuid, change: CredentialChange) -> Result<(), RepoError> {
        self.handle
            .write(FailPoint::CredentialUpdate, move |tables| {
                let stored = live_credential(tables, id)?;
                change.apply(stored, Utc::now());
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.handle
            .write(FailPoint::CredentialDelete, move |tables| {
                let stored = live_credential(tables, id)?;
                let now = Utc::now();
                stored.deleted_at = Some(now);
                stored.updated_at = now;
                Ok(())
            })
            .await
    }
}

#[derive(Clone)]
pub struct MemoryOutboxRepository {
    handle: Handle,
}

#[async_trait]
impl OutboxRepository for MemoryOutboxRepository {
    type Tx = MemoryTx;

    fn with_tx(&self, tx: &MemoryTx) -> Self {
        Self {
            handle: self.handle.with_tx(tx),
        }
    }

    async fn create(&self, event: &OutboxEvent) -> Result<(), RepoError> {
        let event = event.clone();
        self.handle
            .write(FailPoint::OutboxCreate, move |tables| {
                if tables.outbox.iter().any(|existing| existing.id == event.id) {
                    return Err(RepoError::Conflict);
                }
                tables.outbox.push(event);
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.handle
            .write(FailPoint::OutboxDelete, move |tables| {
                let before = tables.outbox.len();
                tables.outbox.retain(|event| event.id != id);
                if tables.outbox.len() == before {
                    Err(RepoError::NotFound)
                } else {
                    Ok(())
                }
            })
            .await
    }
}
