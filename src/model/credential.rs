use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Output of the credential hasher: a derived key plus the salt it used.
#[derive(Clone, PartialEq, Eq)]
pub struct SaltedHash {
    pub hash: Vec<u8>,
    pub salt: Vec<u8>,
}

impl fmt::Debug for SaltedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaltedHash")
            .field("hash_len", &self.hash.len())
            .field("salt_len", &self.salt.len())
            .finish()
    }
}

/// Secret material for an account, keyed by the account id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub id: Uuid,
    pub password: SaltedHash,
    /// Empty until the first successful login.
    pub refresh_token: Option<SaltedHash>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Credential {
    #[must_use]
    pub fn new(id: Uuid, password: SaltedHash, now: DateTime<Utc>) -> Self {
        Self {
            id,
            password,
            refresh_token: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// The single hash pair an update replaces.
#[derive(Clone, Debug)]
pub enum CredentialChange {
    Password(SaltedHash),
    RefreshToken(SaltedHash),
}

impl CredentialChange {
    pub fn apply(self, credential: &mut Credential, now: DateTime<Utc>) {
        match self {
            Self::Password(hash) => credential.password = hash,
            Self::RefreshToken(hash) => credential.refresh_token = Some(hash),
        }
        credential.updated_at = now;
    }
}
