//! Authentication Models
//!
//! Session token claims and the verified context extracted from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims of a session token
///
/// The token is stateless: its validity is the HS256 signature plus `exp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject - account ID
    pub sub: String,

    /// Account email at issuance time
    pub email: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(
        account_id: Uuid,
        email: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: account_id.to_string(),
            email: email.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }
}

/// Verified caller identity attached to authenticated requests
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub account_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn from_claims(claims: &SessionClaims) -> Result<Self, uuid::Error> {
        let account_id = Uuid::parse_str(&claims.sub)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);

        Ok(Self {
            account_id,
            email: claims.email.clone(),
            expires_at,
        })
    }
}
