//! HS256 access and refresh tokens.
//!
//! Each kind has its own key and lifetime. A refresh token never validates as
//! an access token and vice versa because the keys differ.

use crate::model::{Account, Role};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default access token lifetime: one hour.
pub const DEFAULT_ACCESS_TTL_SECONDS: u64 = 60 * 60;
/// Default refresh token lifetime: two weeks.
pub const DEFAULT_REFRESH_TTL_SECONDS: u64 = 60 * 60 * 24 * 14;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("failed to sign token: {0}")]
    Signing(jsonwebtoken::errors::Error),
    #[error("invalid token configuration: {0}")]
    Config(&'static str),
}

/// Identity embedded in every token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthClaims {
    pub user_id: Uuid,
    pub login_id: String,
    pub role: Role,
}

impl From<&Account> for AuthClaims {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.id,
            login_id: account.login_id.clone(),
            role: account.role,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    user_id: Uuid,
    login_id: String,
    role: Role,
    iat: i64,
    exp: i64,
    jti: Uuid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub access_ttl: std::time::Duration,
    pub refresh_ttl: std::time::Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new(access_secret: SecretString, refresh_secret: SecretString) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl: std::time::Duration::from_secs(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_ttl: std::time::Duration::from_secs(DEFAULT_REFRESH_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SigningKey {
    fn new(secret: &SecretString, ttl: std::time::Duration) -> Result<Self, TokenError> {
        let secret = secret.expose_secret().as_bytes();
        if secret.is_empty() {
            return Err(TokenError::Config("signing secret must not be empty"));
        }
        let ttl = Duration::from_std(ttl).map_err(|_| TokenError::Config("ttl out of range"))?;
        if ttl <= Duration::zero() {
            return Err(TokenError::Config("ttl must be positive"));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        })
    }
}

pub struct TokenIssuer {
    access: SigningKey,
    refresh: SigningKey,
    validation: Validation,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access.ttl)
            .field("refresh_ttl", &self.refresh.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Build an issuer from two distinct secrets.
    ///
    /// # Errors
    /// Returns [`TokenError::Config`] if a secret is empty, both secrets are equal,
    /// or the refresh lifetime does not exceed the access lifetime.
    pub fn new(config: &TokenConfig) -> Result<Self, TokenError> {
        if config.access_secret.expose_secret() == config.refresh_secret.expose_secret() {
            return Err(TokenError::Config(
                "access and refresh secrets must differ",
            ));
        }
        if config.refresh_ttl <= config.access_ttl {
            return Err(TokenError::Config(
                "refresh ttl must be longer than access ttl",
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            access: SigningKey::new(&config.access_secret, config.access_ttl)?,
            refresh: SigningKey::new(&config.refresh_secret, config.refresh_ttl)?,
            validation,
        })
    }

    /// # Errors
    /// Returns [`TokenError::Signing`] if encoding fails.
    pub fn issue_access(&self, claims: &AuthClaims) -> Result<IssuedToken, TokenError> {
        self.issue_at(TokenKind::Access, claims, Utc::now())
    }

    /// # Errors
    /// Returns [`TokenError::Signing`] if encoding fails.
    pub fn issue_refresh(&self, claims: &AuthClaims) -> Result<IssuedToken, TokenError> {
        self.issue_at(TokenKind::Refresh, claims, Utc::now())
    }

    /// # Errors
    /// Returns [`TokenError::Expired`] or [`TokenError::Invalid`].
    pub fn validate_access(&self, token: &str) -> Result<AuthClaims, TokenError> {
        self.validate(TokenKind::Access, token)
    }

    /// # Errors
    /// Returns [`TokenError::Expired`] or [`TokenError::Invalid`].
    pub fn validate_refresh(&self, token: &str) -> Result<AuthClaims, TokenError> {
        self.validate(TokenKind::Refresh, token)
    }

    const fn key(&self, kind: TokenKind) -> &SigningKey {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub(crate) fn issue_at(
        &self,
        kind: TokenKind,
        claims: &AuthClaims,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let key = self.key(kind);
        let issued_at = now.trunc_subsecs(0);
        let expires_at = issued_at + key.ttl;

        let wire = WireClaims {
            user_id: claims.user_id,
            login_id: claims.login_id.clone(),
            role: claims.role,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &wire, &key.encoding)
            .map_err(TokenError::Signing)?;

        Ok(IssuedToken {
            token,
            issued_at,
            expires_at,
        })
    }

    fn validate(&self, kind: TokenKind, token: &str) -> Result<AuthClaims, TokenError> {
        let data = decode::<WireClaims>(token, &self.key(kind).decoding, &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        Ok(AuthClaims {
            user_id: data.claims.user_id,
            login_id: data.claims.login_id,
            role: data.claims.role,
        })
    }
}
