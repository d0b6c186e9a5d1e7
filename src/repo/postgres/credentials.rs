use super::{Bound, DataSources, PgTx, db_span, decode, expect_row};
use crate::{
    model::{Credential, CredentialChange, SaltedHash},
    repo::{CredentialRepository, RepoError},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgCredentialRepository {
    bound: Bound,
}

impl PgCredentialRepository {
    #[must_use]
    pub fn new(sources: &DataSources) -> Self {
        Self {
            bound: Bound::new(sources),
        }
    }
}

fn credential_from_row(row: &PgRow) -> Result<Credential, sqlx::Error> {
    let refresh_hash: Option<Vec<u8>> = row.try_get("refresh_token_hash")?;
    let refresh_salt: Option<Vec<u8>> = row.try_get("refresh_token_salt")?;
    let refresh_token = match (refresh_hash, refresh_salt) {
        (Some(hash), Some(salt)) => Some(SaltedHash { hash, salt }),
        _ => None,
    };

    Ok(Credential {
        id: row.try_get("id")?,
        password: SaltedHash {
            hash: row.try_get("password_hash")?,
            salt: row.try_get("password_salt")?,
        },
        refresh_token,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

#[async_trait]
impl CredentialRepository for PgCredentialRepository {
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

    async fn create(&self, credential: &Credential) -> Result<(), RepoError> {
        const QUERY: &str = r"
            INSERT INTO credentials (
                id, password_hash, password_salt, refresh_token_hash, refresh_token_salt,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        let refresh = credential.refresh_token.as_ref();
        self.bound
            .writer()
            .execute(
                db_span("INSERT", QUERY),
                sqlx::query(QUERY)
                    .bind(credential.id)
                    .bind(&credential.password.hash)
                    .bind(&credential.password.salt)
                    .bind(refresh.map(|r| r.hash.clone()))
                    .bind(refresh.map(|r| r.salt.clone()))
                    .bind(credential.created_at)
                    .bind(credential.updated_at),
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Credential, RepoError> {
        const QUERY: &str = r"
            SELECT id, password_hash, password_salt, refresh_token_hash, refresh_token_salt,
                   created_at, updated_at, deleted_at
            FROM credentials
            WHERE id = $1 AND deleted_at IS NULL
        ";
        let row = self
            .bound
            .reader()
            .fetch_optional(db_span("SELECT", QUERY), sqlx::query(QUERY).bind(id))
            .await?
            .ok_or(RepoError::NotFound)?;
        decode(credential_from_row(&row))
    }

    async fn update(&self, id: Uuid, change: CredentialChange) -> Result<(), RepoError> {
        const PASSWORD: &str = r"
            UPDATE credentials
            SET password_hash = $2, password_salt = $3, updated_at = $4
            WHERE id = $1 AND deleted_at IS NULL
        ";
        const REFRESH_TOKEN: &str = r"
            UPDATE credentials
            SET refresh_token_hash = $2, refresh_token_salt = $3, updated_at = $4
            WHERE id = $1 AND deleted_at IS NULL
        ";
        let (statement, hash) = match change {
            CredentialChange::Password(hash) => (PASSWORD, hash),
            CredentialChange::RefreshToken(hash) => (REFRESH_TOKEN, hash),
        };
        let rows = self
            .bound
            .writer()
            .execute(
                db_span("UPDATE", statement),
                sqlx::query(statement)
                    .bind(id)
                    .bind(hash.hash)
                    .bind(hash.salt)
                    .bind(Utc::now()),
            )
            .await?;
        expect_row(rows)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        const QUERY: &str = r"
            UPDATE credentials
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
