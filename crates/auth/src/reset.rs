//! Password-reset tokens.
//!
//! The plain token goes to the user by email; only its SHA-256 digest is
//! stored, so a leaked database cannot be used to reset passwords.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

/// How long a reset token stays usable.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetToken {
    /// Sent to the user.
    pub plain: String,
    /// Stored on the user.
    pub digest: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetToken {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let bytes: [u8; 32] = rand::random();
        let plain = hex::encode(bytes);
        Self {
            digest: digest(&plain),
            plain,
            expires_at: now + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
        }
    }
}

/// Hex SHA-256 of a plain reset token.
pub fn digest(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}
