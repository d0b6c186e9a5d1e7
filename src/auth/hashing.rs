//! Salted PBKDF2-HMAC-SHA256 hashing for passwords and refresh tokens.

use crate::model::SaltedHash;
use constant_time_eq::constant_time_eq;
use once_cell::sync::Lazy;
use pbkdf2::pbkdf2_hmac;
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;

pub const ROUNDS: u32 = 4096;
pub const SALT_LEN: usize = 20;
pub const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("failed to gather salt: {0}")]
    Randomness(#[from] rand::Error),
}

/// Hash `secret` under a fresh OS-random salt.
///
/// # Errors
/// Returns an error only if the system randomness source fails.
pub fn hash_secret(secret: &[u8]) -> Result<SaltedHash, HashError> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.try_fill_bytes(&mut salt)?;
    let hash = derive(secret, &salt);
    Ok(SaltedHash { hash, salt })
}

/// Recompute the hash of `secret` under the stored salt and compare in constant time.
#[must_use]
pub fn verify_secret(secret: &[u8], stored: &SaltedHash) -> bool {
    let derived = derive(secret, &stored.salt);
    constant_time_eq(&derived, &stored.hash)
}

static ABSENT: Lazy<SaltedHash> = Lazy::new(|| SaltedHash {
    hash: vec![0u8; KEY_LEN],
    salt: vec![0u8; SALT_LEN],
});

/// Pay for one full derivation when there is no stored hash to check against.
/// Always false.
#[must_use]
pub fn verify_absent(secret: &[u8]) -> bool {
    std::hint::black_box(verify_secret(secret, &ABSENT));
    false
}

fn derive(secret: &[u8], salt: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(secret, salt, ROUNDS, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_the_hashed_secret() -> Result<(), HashError> {
        let stored = hash_secret(b"Secret123")?;
        assert_eq!(stored.salt.len(), SALT_LEN);
        assert_eq!(stored.hash.len(), KEY_LEN);
        assert!(verify_secret(b"Secret123", &stored));
        Ok(())
    }

    #[test]
    fn verify_rejects_any_single_byte_change() -> Result<(), HashError> {
        let secret = b"Secret123".to_vec();
        let stored = hash_secret(&secret)?;
        for index in 0..secret.len() {
            let mut altered = secret.clone();
            altered[index] ^= 0x01;
            assert!(!verify_secret(&altered, &stored), "byte {index} flipped");
        }
        assert!(!verify_secret(b"Secret12", &stored));
        assert!(!verify_secret(b"Secret1234", &stored));
        Ok(())
    }

    #[test]
    fn salts_are_fresh_per_call() -> Result<(), HashError> {
        let first = hash_secret(b"same")?;
        let second = hash_secret(b"same")?;
        assert_ne!(first.salt, second.salt);
        assert_ne!(first.hash, second.hash);
        Ok(())
    }

    #[test]
    fn absent_record_never_verifies() {
        assert!(!verify_absent(b"Secret123"));
        assert!(!verify_absent(b""));
    }

    #[test]
    fn absent_record_costs_a_derivation() -> Result<(), HashError> {
        let stored = hash_secret(b"Secret123")?;
        let started = std::time::Instant::now();
        for _ in 0..5 {
            assert!(!verify_secret(b"Wrong1234", &stored));
        }
        let mismatch = started.elapsed();

        let started = std::time::Instant::now();
        for _ in 0..5 {
            assert!(!verify_absent(b"Wrong1234"));
        }
        let absent = started.elapsed();

        assert!(absent * 4 >= mismatch, "absent {absent:?} vs mismatch {mismatch:?}");
        Ok(())
    }

    #[test]
    fn empty_secret_still_round_trips() -> Result<(), HashError> {
        let stored = hash_secret(b"")?;
        assert!(verify_secret(b"", &stored));
        assert!(!verify_secret(b"\0", &stored));
        Ok(())
    }
}
