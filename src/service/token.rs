//! Login and refresh.
//!
//! Login never tells a caller whether the handle or the password was wrong.
//! The salted hash of the newest refresh token is stored on the credential; a
//! refresh token whose signature still verifies is refused once a newer login
//! has replaced that hash.

use super::ServiceError;
use crate::{
    auth::{AuthClaims, IssuedToken, TokenIssuer, hash_secret, verify_absent, verify_secret},
    model::CredentialChange,
    repo::{AccountRepository, CredentialRepository, RepoError},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

#[async_trait]
pub trait TokenService: Send + Sync {
    async fn login(&self, login_id: &str, password: &str) -> Result<TokenPair, ServiceError>;

    /// Mint a new access token. The refresh token itself is not rotated.
    async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, ServiceError>;

    /// Validate an access token presented on a request.
    ///
    /// # Errors
    /// Returns [`ServiceError::Unauthorized`] for malformed, foreign or expired tokens.
    fn authenticate(&self, access_token: &str) -> Result<AuthClaims, ServiceError>;
}

pub struct TokenExchange<A, C> {
    accounts: A,
    credentials: C,
    issuer: Arc<TokenIssuer>,
}

impl<A, C> TokenExchange<A, C>
where
    A: AccountRepository,
    C: CredentialRepository,
{
    pub const fn new(accounts: A, credentials: C, issuer: Arc<TokenIssuer>) -> Self {
        Self {
            accounts,
            credentials,
            issuer,
        }
    }
}

/// Spend the same derivation a password mismatch costs, then refuse.
fn reject_unknown(password: &str) -> ServiceError {
    let _ = verify_absent(password.as_bytes());
    ServiceError::Unauthorized
}

/// Collapse "no such row" into an authentication failure.
fn hide_missing(err: RepoError) -> ServiceError {
    match err {
        RepoError::NotFound => ServiceError::Unauthorized,
        other => other.into(),
    }
}

#[async_trait]
impl<A, C> TokenService for TokenExchange<A, C>
where
    A: AccountRepository,
    C: CredentialRepository,
{
    async fn login(&self, login_id: &str, password: &str) -> Result<TokenPair, ServiceError> {
        let account = match self.accounts.get_by_login_id(login_id).await {
            Ok(account) => account,
            Err(RepoError::NotFound) => return Err(reject_unknown(password)),
            Err(err) => return Err(err.into()),
        };
        let credential = match self.credentials.get(account.id).await {
            Ok(credential) => credential,
            Err(RepoError::NotFound) => return Err(reject_unknown(password)),
            Err(err) => return Err(err.into()),
        };

        if !verify_secret(password.as_bytes(), &credential.password) {
            debug!(account_id = %account.id, "password mismatch");
            return Err(ServiceError::Unauthorized);
        }

        let claims = AuthClaims::from(&account);
        let access = self.issuer.issue_access(&claims)?;
        let refresh = self.issuer.issue_refresh(&claims)?;

        let refresh_hash = hash_secret(refresh.token.as_bytes())?;
        self.credentials
            .on_primary()
            .update(account.id, CredentialChange::RefreshToken(refresh_hash))
            .await
            .map_err(|err| {
                error!(
                    account_id = %account.id,
                    error = %err,
                    "failed to store refresh token hash"
                );
                ServiceError::from(err)
            })?;

        info!(account_id = %account.id, "login succeeded");
        Ok(TokenPair { access, refresh })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, ServiceError> {
        let claims = self.issuer.validate_refresh(refresh_token).map_err(|err| {
            debug!(error = %err, "refresh token rejected");
            ServiceError::Unauthorized
        })?;

        let credential = self
            .credentials
            .on_primary()
            .get(claims.user_id)
            .await
            .map_err(hide_missing)?;

        let Some(stored) = credential.refresh_token else {
            debug!(account_id = %claims.user_id, "no refresh token on record");
            return Err(ServiceError::Unauthorized);
        };
        if !verify_secret(refresh_token.as_bytes(), &stored) {
            debug!(account_id = %claims.user_id, "refresh token superseded");
            return Err(ServiceError::Unauthorized);
        }

        Ok(self.issuer.issue_access(&claims)?)
    }

    fn authenticate(&self, access_token: &str) -> Result<AuthClaims, ServiceError> {
        self.issuer.validate_access(access_token).map_err(|err| {
            debug!(error = %err, "access token rejected");
            ServiceError::Unauthorized
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{TokenConfig, TokenKind},
        model::{NewAccount, Role, TraceContext},
        repo::memory::{
            FailPoint, MemoryAccountRepository, MemoryCredentialRepository, MemoryStore,
        },
        service::{UserLifecycle, UserService},
    };
    use chrono::{Duration, Utc};
    use secrecy::SecretString;

    fn issuer() -> Arc<TokenIssuer> {
        let config = TokenConfig::new(
            SecretString::from("access-secret-for-tests"),
            SecretString::from("refresh-secret-for-tests"),
        );
        match TokenIssuer::new(&config) {
            Ok(issuer) => Arc::new(issuer),
            Err(err) => panic!("test issuer: {err}"),
        }
    }

    async fn seeded(
        store: &MemoryStore,
    ) -> Result<
        (
            TokenExchange<MemoryAccountRepository, MemoryCredentialRepository>,
            Arc<TokenIssuer>,
        ),
        ServiceError,
    > {
        let lifecycle = UserLifecycle::new(
            store.transactor(),
            store.accounts(),
            store.credentials(),
            store.outbox(),
        );
        lifecycle
            .create_account(
                NewAccount {
                    login_id: "alice1234".to_string(),
                    role: Role::Standard,
                    phone: String::new(),
                    email: String::new(),
                },
                "Secret123",
                &TraceContext::default(),
            )
            .await?;
        let issuer = issuer();
        Ok((
            TokenExchange::new(store.accounts(), store.credentials(), Arc::clone(&issuer)),
            issuer,
        ))
    }

    #[tokio::test]
    async fn login_issues_both_tokens_and_stores_refresh_hash() -> Result<(), ServiceError> {
        let store = MemoryStore::new();
        let (tokens, issuer) = seeded(&store).await?;

        let pair = tokens.login("alice1234", "Secret123").await?;
        let claims = tokens.authenticate(&pair.access.token)?;
        assert_eq!(claims.login_id, "alice1234");
        assert_eq!(claims.role, Role::Standard);
        assert!(issuer.validate_refresh(&pair.refresh.token).is_ok());
        assert!(pair.refresh.expires_at > pair.access.expires_at);

        let tables = store.snapshot().await;
        let stored = tables.credentials[&claims.user_id].refresh_token.clone();
        assert!(stored.is_some_and(|hash| verify_secret(pair.refresh.token.as_bytes(), &hash)));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_handle_and_wrong_password_look_the_same() -> Result<(), ServiceError> {
        let store = MemoryStore::new();
        let (tokens, _) = seeded(&store).await?;

        assert_eq!(
            tokens.login("nobody0000", "Secret123").await,
            Err(ServiceError::Unauthorized)
        );
        assert_eq!(
            tokens.login("alice1234", "Secret124").await,
            Err(ServiceError::Unauthorized)
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_handle_costs_as_much_as_wrong_password() -> Result<(), ServiceError> {
        let store = MemoryStore::new();
        let (tokens, _) = seeded(&store).await?;

        let started = std::time::Instant::now();
        for _ in 0..5 {
            let _ = tokens.login("alice1234", "Wrong1234").await;
        }
        let wrong_password = started.elapsed();

        let started = std::time::Instant::now();
        for _ in 0..5 {
            let _ = tokens.login("nobody0000", "Wrong1234").await;
        }
        let unknown_handle = started.elapsed();

        assert!(
            unknown_handle * 4 >= wrong_password,
            "unknown {unknown_handle:?} vs wrong password {wrong_password:?}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn login_fails_when_refresh_hash_cannot_be_stored() -> Result<(), ServiceError> {
        let store = MemoryStore::new();
        let (tokens, _) = seeded(&store).await?;
        store.fail_at(FailPoint::CredentialUpdate).await;

        assert_eq!(
            tokens.login("alice1234", "Secret123").await,
            Err(ServiceError::RepoServerError)
        );
        Ok(())
    }

    #[tokio::test]
    async fn refresh_accepts_only_the_latest_refresh_token() -> Result<(), ServiceError> {
        let store = MemoryStore::new();
        let (tokens, issuer) = seeded(&store).await?;

        let first = tokens.login("alice1234", "Secret123").await?;
        let access = tokens.refresh(&first.refresh.token).await?;
        assert!(tokens.authenticate(&access.token).is_ok());

        let second = tokens.login("alice1234", "Secret123").await?;
        assert!(issuer.validate_refresh(&first.refresh.token).is_ok());
        assert_eq!(
            tokens.refresh(&first.refresh.token).await,
            Err(ServiceError::Unauthorized)
        );
        assert!(tokens.refresh(&second.refresh.token).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens_and_expired_tokens() -> Result<(), ServiceError> {
        let store = MemoryStore::new();
        let (tokens, issuer) = seeded(&store).await?;
        let pair = tokens.login("alice1234", "Secret123").await?;

        assert_eq!(
            tokens.refresh(&pair.access.token).await,
            Err(ServiceError::Unauthorized)
        );

        let claims = tokens.authenticate(&pair.access.token)?;
        let stale = issuer.issue_at(TokenKind::Refresh, &claims, Utc::now() - Duration::days(30))?;
        assert_eq!(
            tokens.refresh(&stale.token).await,
            Err(ServiceError::Unauthorized)
        );
        Ok(())
    }

    #[tokio::test]
    async fn refresh_before_any_login_is_unauthorized() -> Result<(), ServiceError> {
        let store = MemoryStore::new();
        let (tokens, issuer) = seeded(&store).await?;
        let account = store.accounts().get_by_login_id("alice1234").await?;

        let forged = issuer.issue_refresh(&AuthClaims::from(&account))?;
        assert_eq!(
            tokens.refresh(&forged.token).await,
            Err(ServiceError::Unauthorized)
        );
        Ok(())
    }

    #[tokio::test]
    async fn expired_access_token_does_not_authenticate() -> Result<(), ServiceError> {
        let store = MemoryStore::new();
        let (tokens, issuer) = seeded(&store).await?;
        let account = store.accounts().get_by_login_id("alice1234").await?;

        let stale = issuer.issue_at(
            TokenKind::Access,
            &AuthClaims::from(&account),
            Utc::now() - Duration::hours(2),
        )?;
        assert_eq!(
            tokens.authenticate(&stale.token),
            Err(ServiceError::Unauthorized)
        );
        Ok(())
    }
}
