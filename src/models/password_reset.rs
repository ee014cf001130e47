//! Password Reset Model
//!
//! One in-flight reset attempt. Only the SHA-256 digest of the mailed token
//! is ever stored.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Lifetime of a reset request
pub const RESET_REQUEST_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PasswordResetRequest {
    pub id: Uuid,

    /// Account that asked for the reset
    pub account_id: Uuid,

    /// SHA-256 hex digest of the raw token
    pub token_hash: String,

    pub expires_at: DateTime<Utc>,

    /// Flips to true once the token has been redeemed; terminal
    pub consumed: bool,

    pub created_at: DateTime<Utc>,
}

impl PasswordResetRequest {
    pub fn new(account_id: Uuid, token_hash: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id,
            token_hash,
            expires_at: now + ttl,
            consumed: false,
            created_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What the caller learns about a freshly created reset request
#[derive(Debug, Clone, Serialize)]
pub struct ResetHandle {
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
}
