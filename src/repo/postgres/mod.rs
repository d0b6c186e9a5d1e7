//! Postgres-backed repositories.
//!
//! [`DataSources`] holds the primary and secondary pools and is built once at
//! startup. Repositories clone the pools (cheap, reference counted) and carry a
//! [`Binding`] that picks which connection a call borrows.

mod accounts;
mod credentials;
mod outbox;

pub use accounts::PgAccountRepository;
pub use credentials::PgCredentialRepository;
pub use outbox::PgOutboxRepository;

use super::{RepoError, Transaction, Transactor};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    PgConnection, PgPool, Postgres,
    postgres::{PgArguments, PgPoolOptions, PgRow},
};
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{Instrument, Span, debug, error, info_span};

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const UNIQUE_VIOLATION: &str = "23505";

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Primary and secondary connection pools.
#[derive(Clone, Debug)]
pub struct DataSources {
    pub primary: PgPool,
    pub secondary: PgPool,
}

impl DataSources {
    /// Connect both pools. Without a replica DSN the secondary shares the primary pool.
    ///
    /// # Errors
    /// Returns an error if either pool cannot connect.
    pub async fn connect(
        primary_dsn: &str,
        replica_dsn: Option<&str>,
        max_connections: u32,
    ) -> Result<Self> {
        let primary = pool_options(max_connections)
            .connect(primary_dsn)
            .await
            .context("Failed to connect to primary database")?;

        let secondary = match replica_dsn {
            Some(dsn) => pool_options(max_connections)
                .connect(dsn)
                .await
                .context("Failed to connect to replica database")?,
            None => primary.clone(),
        };

        Ok(Self { primary, secondary })
    }
}

fn pool_options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(max_connections)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
}

/// Apply `sql/schema.sql`. Every statement is idempotent.
///
/// # Errors
/// Returns an error naming the failing statement.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    let mut conn = pool
        .acquire()
        .await
        .context("failed to acquire connection for schema setup")?;
    run_schema(&mut conn).await
}

async fn run_schema(conn: &mut PgConnection) -> Result<()> {
    for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut *conn)
            .instrument(db_span("DDL", "schema.sql"))
            .await
            .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
    }
    debug!("schema applied");
    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

pub(crate) fn db_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

/// Collapse a driver error into the repository taxonomy.
pub(crate) fn translate(err: sqlx::Error) -> RepoError {
    match &err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db_err)
            if db_err
                .code()
                .is_some_and(|code| code.as_ref() == UNIQUE_VIOLATION) =>
        {
            debug!("Unique violation: {}", db_err);
            RepoError::Conflict
        }
        _ => {
            error!("Database error: {}", err);
            RepoError::ServerError
        }
    }
}

/// Transaction scope over one primary connection.
#[derive(Clone)]
pub struct PgTx {
    inner: Arc<Mutex<Option<sqlx::Transaction<'static, Postgres>>>>,
}

impl fmt::Debug for PgTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTx").finish_non_exhaustive()
    }
}

fn finished_scope() -> RepoError {
    error!("Transaction scope used after commit or rollback");
    RepoError::ServerError
}

#[async_trait]
impl Transaction for PgTx {
    async fn commit(self) -> Result<(), RepoError> {
        let tx = self.inner.lock().await.take().ok_or_else(finished_scope)?;
        tx.commit()
            .instrument(db_span("COMMIT", "COMMIT"))
            .await
            .map_err(translate)
    }

    async fn rollback(self) -> Result<(), RepoError> {
        let tx = self.inner.lock().await.take().ok_or_else(finished_scope)?;
        tx.rollback()
            .instrument(db_span("ROLLBACK", "ROLLBACK"))
            .await
            .map_err(translate)
    }
}

#[derive(Clone, Debug)]
pub struct PgTransactor {
    primary: PgPool,
}

impl PgTransactor {
    #[must_use]
    pub fn new(sources: &DataSources) -> Self {
        Self {
            primary: sources.primary.clone(),
        }
    }
}

#[async_trait]
impl Transactor for PgTransactor {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, RepoError> {
        let tx = self
            .primary
            .begin()
            .instrument(db_span("BEGIN", "BEGIN"))
            .await
            .map_err(translate)?;
        Ok(PgTx {
            inner: Arc::new(Mutex::new(Some(tx))),
        })
    }
}

#[derive(Clone, Debug)]
enum Binding {
    Secondary,
    Primary,
    Tx(PgTx),
}

/// Pools plus the binding shared by every Postgres repository.
#[derive(Clone, Debug)]
pub(crate) struct Bound {
    sources: DataSources,
    binding: Binding,
}

impl Bound {
    pub(crate) fn new(sources: &DataSources) -> Self {
        Self {
            sources: sources.clone(),
            binding: Binding::Secondary,
        }
    }

    pub(crate) fn with_tx(&self, tx: &PgTx) -> Self {
        Self {
            sources: self.sources.clone(),
            binding: Binding::Tx(tx.clone()),
        }
    }

    pub(crate) fn on_primary(&self) -> Self {
        Self {
            sources: self.sources.clone(),
            binding: Binding::Primary,
        }
    }

    pub(crate) fn reader(&self) -> Target {
        match &self.binding {
            Binding::Secondary => Target::Pool(self.sources.secondary.clone()),
            Binding::Primary => Target::Pool(self.sources.primary.clone()),
            Binding::Tx(tx) => Target::Tx(tx.clone()),
        }
    }

    pub(crate) fn writer(&self) -> Target {
        match &self.binding {
            Binding::Secondary | Binding::Primary => Target::Pool(self.sources.primary.clone()),
            Binding::Tx(tx) => Target::Tx(tx.clone()),
        }
    }
}

/// The connection one call borrows.
pub(crate) enum Target {
    Pool(PgPool),
    Tx(PgTx),
}

impl Target {
    /// Run a statement and return the affected row count.
    pub(crate) async fn execute(&self, span: Span, query: PgQuery<'_>) -> Result<u64, RepoError> {
        let result = match self {
            Self::Pool(pool) => query.execute(pool).instrument(span).await,
            Self::Tx(tx) => {
                let mut guard = tx.inner.lock().await;
                let conn = guard.as_mut().ok_or_else(finished_scope)?;
                query.execute(&mut **conn).instrument(span).await
            }
        };
        result.map(|done| done.rows_affected()).map_err(translate)
    }

    pub(crate) async fn fetch_optional(
        &self,
        span: Span,
        query: PgQuery<'_>,
    ) -> Result<Option<PgRow>, RepoError> {
        let result = match self {
            Self::Pool(pool) => query.fetch_optional(pool).instrument(span).await,
            Self::Tx(tx) => {
                let mut guard = tx.inner.lock().await;
                let conn = guard.as_mut().ok_or_else(finished_scope)?;
                query.fetch_optional(&mut **conn).instrument(span).await
            }
        };
        result.map_err(translate)
    }

    pub(crate) async fn fetch_all(
        &self,
        span: Span,
        query: PgQuery<'_>,
    ) -> Result<Vec<PgRow>, RepoError> {
        let result = match self {
            Self::Pool(pool) => query.fetch_all(pool).instrument(span).await,
            Self::Tx(tx) => {
                let mut guard = tx.inner.lock().await;
                let conn = guard.as_mut().ok_or_else(finished_scope)?;
                query.fetch_all(&mut **conn).instrument(span).await
            }
        };
        result.map_err(translate)
    }
}

/// Zero affected rows on a keyed write means the live row does not exist.
pub(crate) const fn expect_row(rows_affected: u64) -> Result<(), RepoError> {
    if rows_affected == 0 {
        Err(RepoError::NotFound)
    } else {
        Ok(())
    }
}

/// Map a row decode failure to `ServerError`.
pub(crate) fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, RepoError> {
    result.map_err(|err| {
        error!("Failed to decode row: {}", err);
        RepoError::ServerError
    })
}
