//! Store Interfaces
//!
//! Narrow persistence traits consumed by the services. Uniqueness of email
//! and of every provider id is the store's job: a violated constraint comes
//! back as [`StoreError::UniqueViolation`], never as a generic failure.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Account, AccountWithPassword, OAuthProvider, PasswordResetRequest, Role, Subscriber,
};

/// Errors surfaced by any store implementation
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write; carries the offending field
    #[error("Unique constraint violated on {0}")]
    UniqueViolation(String),

    /// The record addressed by the write does not exist
    #[error("Record not found")]
    NotFound,

    /// The store did not answer within the configured timeout
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Stored data could not be mapped back to a model
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Account persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<AccountWithPassword>>;

    /// Exact match on the normalized email
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<AccountWithPassword>>;

    /// First account whose email is in `emails`, preferring earlier entries
    async fn find_by_any_email(&self, emails: &[String])
        -> StoreResult<Option<AccountWithPassword>>;

    async fn find_by_provider_id(
        &self,
        provider: OAuthProvider,
        provider_id: &str,
    ) -> StoreResult<Option<AccountWithPassword>>;

    async fn find_by_linkage_code(&self, code: &str, role: Role) -> StoreResult<Vec<Account>>;

    /// Case-insensitive substring search over name and email, newest first.
    /// Returns the page and the total number of matches.
    async fn search(
        &self,
        query: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> StoreResult<(Vec<Account>, u64)>;

    async fn insert(&self, record: &AccountWithPassword) -> StoreResult<()>;

    /// Persists profile fields and provider slots; the password hash is untouched
    async fn update(&self, account: &Account) -> StoreResult<()>;

    async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StoreResult<()>;

    /// Returns false when no account had that id
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Password reset request persistence
#[async_trait]
pub trait ResetRequestStore: Send + Sync {
    async fn find_unconsumed_by_account(
        &self,
        account_id: Uuid,
    ) -> StoreResult<Option<PasswordResetRequest>>;

    async fn insert(&self, request: &PasswordResetRequest) -> StoreResult<()>;

    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Flips the consumed flag; `NotFound` if the request is gone or already consumed
    async fn mark_consumed(&self, id: Uuid) -> StoreResult<()>;
}

/// Per-account client settings document
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_or_create(&self, account_id: Uuid) -> StoreResult<JsonValue>;
}

/// Read access to subscription records
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn find_by_account(&self, account_id: Uuid) -> StoreResult<Option<Subscriber>>;
}
