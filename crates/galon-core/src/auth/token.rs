//! Access token inspection.
//!
//! Tokens are JWTs issued by the backend. The client never verifies the
//! signature; it only reads the payload to learn who is logged in and when
//! the token stops being accepted.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Refresh this long before the token actually expires.
pub const EXPIRY_BUFFER_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub username: String,
    /// Older tokens were issued without a role
    #[serde(default)]
    pub role: String,
    /// Expiry as seconds since the epoch
    #[serde(default)]
    pub exp: Option<i64>,
}

impl Claims {
    /// Decode the payload segment of `token`.
    ///
    /// Returns `None` for anything that is not a three-part token with a
    /// base64url JSON payload carrying the expected claims.
    pub fn decode(token: &str) -> Option<Self> {
        let payload = token.split('.').nth(1)?;
        let bytes = match URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Access token payload is not base64url");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(claims) => Some(claims),
            Err(e) => {
                warn!(error = %e, "Access token payload is not a claims object");
                None
            }
        }
    }

    pub fn user(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            role: self.role.clone(),
        }
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    /// A token without an expiry is treated as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|exp| exp < now).unwrap_or(true)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the token expires within the refresh buffer.
    pub fn is_expiring_soon_at(&self, now: DateTime<Utc>) -> bool {
        self.is_expired_at(now + Duration::minutes(EXPIRY_BUFFER_MINUTES))
    }

    pub fn is_expiring_soon(&self) -> bool {
        self.is_expiring_soon_at(Utc::now())
    }
}
