use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use natours_core::DocumentId;

/// Claims carried by an access token.
///
/// `iat` and `exp` are whole seconds since the epoch, as JWT registered claims
/// are. `iat_ms` repeats the issue time in milliseconds so it can be ordered
/// against a password change made within the same second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Id of the user the token was issued to.
    pub sub: DocumentId,

    /// Issued-at.
    pub iat: i64,

    /// Issued-at, epoch milliseconds.
    pub iat_ms: i64,

    /// Expiration.
    pub exp: i64,
}

impl TokenClaims {
    pub fn new(sub: DocumentId, issued_at: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            sub,
            iat: issued_at.timestamp(),
            iat_ms: issued_at.timestamp_millis(),
            exp: (issued_at + ttl).timestamp(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    /// Bad signature, wrong algorithm, garbage input.
    #[error("Invalid token. Please log in again")]
    Invalid,

    #[error("Your token has expired. Please log in again")]
    Expired,
}

/// Check the time window of already-decoded claims.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::Invalid);
    }
    if now.timestamp() >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn claims_window() {
        let claims = TokenClaims::new(DocumentId::new(), at(1_000), Duration::seconds(60));
        assert_eq!(claims.exp, 1_060);
        assert_eq!(claims.iat_ms, 1_000_000);

        assert_eq!(validate_claims(&claims, at(1_000)), Ok(()));
        assert_eq!(validate_claims(&claims, at(1_059)), Ok(()));
        assert_eq!(
            validate_claims(&claims, at(1_060)),
            Err(TokenValidationError::Expired)
        );
    }

    #[test]
    fn inverted_window_is_invalid() {
        let claims = TokenClaims {
            sub: DocumentId::new(),
            iat: 10,
            iat_ms: 10_000,
            exp: 10,
        };
        assert_eq!(
            validate_claims(&claims, at(5)),
            Err(TokenValidationError::Invalid)
        );
    }
}
