use super::{Bound, DataSources, PgTx, db_span, decode, expect_row};
use crate::{
    model::{Account, Role},
    repo::{AccountRepository, RepoError},
};
use async_trait::async_trait;
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgAccountRepository {
    bound: Bound,
}

impl PgAccountRepository {
    #[must_use]
    pub fn new(sources: &DataSources) -> Self {
        Self {
            bound: Bound::new(sources),
        }
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let role = role.parse::<Role>().map_err(|err| {
        sqlx::Error::Decode(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            err.to_string(),
        )))
    })?;

    Ok(Account {
        id: row.try_get("id")?,
        login_id: row.try_get("login_id")?,
        role,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    type Tx = PgTx;

    fn with_tx(&self, tx: &PgTx) -> Self {
        Self {
            bound: self.bound.with_tx(tx),
        }
    }

    fn on_primary(&self) -> Self {
        Self {
            bound: self.bound.on_primary(),
        }
    }

    async fn list(&self, offset: u64, limit: u64) -> Result<Vec<Account>, RepoError> {
        const QUERY: &str = r"
            SELECT id, login_id, role, phone, email, created_at, updated_at, deleted_at
            FROM accounts
            WHERE deleted_at IS NULL
            ORDER BY created_at, id
            LIMIT $1 OFFSET $2
        ";
        let rows = self
            .bound
            .reader()
            .fetch_all(
                db_span("SELECT", QUERY),
                sqlx::query(QUERY)
                    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                    .bind(i64::try_from(offset).unwrap_or(i64::MAX)),
            )
            .await?;
        rows.iter().map(|row| decode(account_from_row(row))).collect()
    }

    async fn create(&self, account: &Account) -> Result<(), RepoError> {
        const QUERY: &str = r"
            INSERT INTO accounts (id, login_id, role, phone, email, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        self.bound
            .writer()
            .execute(
                db_span("INSERT", QUERY),
                sqlx::query(QUERY)
                    .bind(account.id)
                    .bind(&account.login_id)
                    .bind(account.role.as_str())
                    .bind(&account.phone)
                    .bind(&account.email)
                    .bind(account.created_at)
                    .bind(account.updated_at),
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Account, RepoError> {
        const QUERY: &str = r"
            SELECT id, login_id, role, phone, email, created_at, updated_at, deleted_at
            FROM accounts
            WHERE id = $1 AND deleted_at IS NULL
        ";
        let row = self
            .bound
            .reader()
            .fetch_optional(db_span("SELECT", QUERY), sqlx::query(QUERY).bind(id))
            .await?
            .ok_or(RepoError::NotFound)?;
        decode(account_from_row(&row))
    }

    async fn get_by_login_id(&self, login_id: &str) -> Result<Account, RepoError> {
        const QUERY: &str = r"
            SELECT id, login_id, role, phone, email, created_at, updated_at, deleted_at
            FROM accounts
            WHERE login_id = $1 AND deleted_at IS NULL
        ";
        let row = self
            .bound
            .reader()
            .fetch_optional(db_span("SELECT", QUERY), sqlx::query(QUERY).bind(login_id))
            .await?
            .ok_or(RepoError::NotFound)?;
        decode(account_from_row(&row))
    }

    async fn update(&self, account: &Account) -> Result<(), RepoError> {
        const QUERY: &str = r"
            UPDATE accounts
            SET role = $2, phone = $3, email = $4, updated_at = $5
            WHERE id = $1 AND deleted_at IS NULL
        ";
        let rows = self
            .bound
            .writer()
            .execute(
                db_span("UPDATE", QUERY),
                sqlx::query(QUERY)
                    .bind(account.id)
                    .bind(account.role.as_str())
                    .bind(&account.phone)
                    .bind(&account.email)
                    .bind(account.updated_at),
            )
            .await?;
        expect_row(rows)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        const QUERY: &str = r"
            UPDATE accounts
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
        ";
        let rows = self
            .bound
            .writer()
            .execute(db_span("UPDATE", QUERY), sqlx::query(QUERY).bind(id))
            .await?;
        expect_row(rows)
    }
}
