//! Password hashing and verification.
//!
//! New hashes are always bcrypt. Accounts migrated from the previous
//! system may still carry an unsalted SHA-256 hex digest, which is
//! accepted on verification but never produced.

use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::warn;

use super::AuthError;

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Minimum accepted length for a new password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

const BCRYPT_PREFIXES: &[&str] = &["$2a$", "$2b$", "$2y$"];

/// Hashing parameters for new passwords.
#[derive(Debug)]
pub struct PasswordPolicy {
    pub bcrypt_cost: u32,
    pub min_length: usize,
    dummy_hash: OnceLock<Option<String>>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordPolicy {
    pub fn new(bcrypt_cost: u32) -> Self {
        Self {
            bcrypt_cost,
            min_length: MIN_PASSWORD_LENGTH,
            dummy_hash: OnceLock::new(),
        }
    }

    /// Reject secrets shorter than the minimum length.
    pub fn validate(&self, secret: &str) -> Result<(), AuthError> {
        if secret.chars().count() < self.min_length {
            return Err(AuthError::validation(
                "password",
                format!("must be at least {} characters", self.min_length),
            ));
        }
        Ok(())
    }

    /// Hash a password with bcrypt at the configured cost.
    pub fn hash(&self, secret: &str) -> Result<String, AuthError> {
        bcrypt::hash(secret, self.bcrypt_cost)
            .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
    }

    /// Validate then hash.
    pub fn hash_new(&self, secret: &str) -> Result<String, AuthError> {
        self.validate(secret)?;
        self.hash(secret)
    }

    /// Spend one bcrypt verification so an unknown account costs the
    /// same as a wrong password.
    pub fn dummy_verify(&self, secret: &str) {
        let dummy = self
            .dummy_hash
            .get_or_init(|| bcrypt::hash("keyward-timing-equalizer", self.bcrypt_cost).ok());
        if let Some(hash) = dummy {
            let _ = bcrypt::verify(secret, hash);
        }
    }
}

/// Whether `stored` is a legacy SHA-256 hex digest.
pub fn is_legacy_hash(stored: &str) -> bool {
    stored.len() == 64 && stored.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_bcrypt_hash(stored: &str) -> bool {
    BCRYPT_PREFIXES.iter().any(|p| stored.starts_with(p))
}

fn sha256_hex(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

/// Verify a secret against a stored hash of any supported format.
///
/// Unknown or corrupt hashes never match.
pub fn verify_password(secret: &str, stored: &str) -> bool {
    if is_bcrypt_hash(stored) {
        return match bcrypt::verify(secret, stored) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(error = %e, "stored bcrypt hash is corrupt");
                false
            }
        };
    }
    if is_legacy_hash(stored) {
        let computed = sha256_hex(secret);
        let expected = stored.to_ascii_lowercase();
        return computed.as_bytes().ct_eq(expected.as_bytes()).into();
    }
    warn!("stored password hash has an unknown format");
    false
}
