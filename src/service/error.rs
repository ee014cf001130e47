//! Service Errors
//!
//! Error taxonomy shared by the identity, account, password reset and OAuth
//! services, with conversions from each collaborator's error type.

use thiserror::Error;

use crate::database::StoreError;
use crate::service::jwt::TokenError;
use crate::utils::validation::describe_validation_errors;

/// Failure of an identity or account operation
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Input failed validation; nothing was mutated
    #[error("Validation error: {0}")]
    Validation(String),

    /// A uniqueness rule would be violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Credentials or token did not check out
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Caller is authenticated but not allowed to act on the target
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Reset request is missing, consumed or past its expiry
    #[error("Expired: {0}")]
    Expired(String),

    /// Reset token does not match the stored request
    #[error("Token mismatch: {0}")]
    Mismatch(String),

    /// Outbound mail could not be delivered
    #[error("Mail delivery failed: {0}")]
    MailDelivery(String),

    /// An identity provider rejected or failed a call
    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for service operations
pub type IdentityResult<T> = Result<T, IdentityError>;

impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(field) => match field.as_str() {
                "email" => IdentityError::Conflict(
                    "You have already signed up. Did you forget your password?".into(),
                ),
                "facebook" | "google" | "apple" => IdentityError::Conflict(format!(
                    "This {} identity is already linked to another account",
                    field
                )),
                _ => IdentityError::Conflict(format!("Duplicate {}", field)),
            },
            StoreError::NotFound => IdentityError::NotFound("Account not found".into()),
            other => IdentityError::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for IdentityError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(msg) => IdentityError::Authentication(msg),
            TokenError::Signing(msg) => IdentityError::Internal(msg),
        }
    }
}

impl From<bcrypt::BcryptError> for IdentityError {
    fn from(err: bcrypt::BcryptError) -> Self {
        IdentityError::Internal(format!("Password hashing failed: {}", err))
    }
}

impl From<validator::ValidationErrors> for IdentityError {
    fn from(err: validator::ValidationErrors) -> Self {
        IdentityError::Validation(describe_validation_errors(&err))
    }
}
