//! Account lifecycle and token exchange services.
//!
//! Services speak [`ServiceError`]; repository, hashing and token failures are
//! re-wrapped here so transport code can pick a status without inspecting
//! lower layers. Nothing is retried.

mod token;
mod user;

pub use token::{TokenExchange, TokenPair, TokenService};
pub use user::{DEFAULT_LIST_LIMIT, UserLifecycle, UserService};

use crate::{
    auth::{HashError, TokenError},
    repo::RepoError,
};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("account not found")]
    RepoNotFound,
    #[error("account already exists")]
    RepoConflict,
    #[error("storage failure")]
    RepoServerError,
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal server error")]
    ServerError,
}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::RepoNotFound,
            RepoError::Conflict => Self::RepoConflict,
            RepoError::ServerError => Self::RepoServerError,
        }
    }
}

impl From<HashError> for ServiceError {
    fn from(err: HashError) -> Self {
        error!("Failed to hash secret: {}", err);
        Self::ServerError
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid | TokenError::Expired => Self::Unauthorized,
            TokenError::Signing(_) | TokenError::Config(_) => {
                error!("Token issuer failure: {}", err);
                Self::ServerError
            }
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        error!("Failed to serialize outbox event: {}", err);
        Self::ServerError
    }
}
