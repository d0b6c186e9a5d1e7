//! Credential hashing and token primitives.
//!
//! Both are leaves: they know nothing about storage and are driven by the
//! service layer.

pub mod hashing;
pub mod token;

pub use hashing::{HashError, hash_secret, verify_absent, verify_secret};
pub use token::{AuthClaims, IssuedToken, TokenConfig, TokenError, TokenIssuer, TokenKind};
