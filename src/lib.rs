//! # Keyward (accounts, credentials and tokens)
//!
//! `keyward` owns user accounts and their credentials, issues access and
//! refresh tokens, and records account lifecycle events in a transactional
//! outbox so a separate relay can publish them.
//!
//! ## Storage
//!
//! Reads are served from a secondary (replica) store, writes go to the
//! primary. Multi-row writes run inside one primary transaction: the account,
//! its credential and the outbox event either all land or none do.
//!
//! - **Shared identifier:** an account and its credential share one id,
//!   generated once at creation.
//! - **Soft deletes:** deleted rows keep a tombstone and are filtered out of
//!   every read. A deleted login handle can be taken again.
//! - **Outbox:** `AccountCreated` and `AccountDeleted` events are appended in
//!   the same transaction as the mutation. Updates emit nothing.
//!
//! ## Tokens
//!
//! Access and refresh tokens are HS256 JWTs signed with separate keys. A
//! refresh token is only honoured while its salted hash matches the one
//! stored on the credential, so a newer login revokes older refresh tokens.

pub mod api;
pub mod auth;
pub mod cli;
pub mod model;
pub mod repo;
pub mod service;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// `name/version`, sent in the `X-App` health header.
pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
