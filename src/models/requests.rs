//! Request and Response Models
//!
//! Data structures for API request and response payloads with validation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::utils::validation::{email_validator, linkage_code_validator, name_validator};

use super::account::Account;
use super::subscription::SubscriberSummary;

/// Request payload for local registration
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address (must be unique and valid format)
    #[validate(custom(function = "email_validator"))]
    pub email: String,

    /// Password (8-128 characters)
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    pub password: String,

    /// Display name
    #[serde(default)]
    #[validate(custom(function = "name_validator"))]
    pub name: Option<String>,

    #[serde(default)]
    pub birthdate: Option<NaiveDate>,

    /// Role tag; parsed by the service so an unknown value is a validation error
    #[serde(default, rename = "profession")]
    pub role: Option<String>,

    /// Practitioner linkage code (only meaningful for patients)
    #[serde(default, rename = "matricule")]
    #[validate(custom(function = "linkage_code_validator"))]
    pub linkage_code: Option<String>,

    #[serde(default)]
    #[validate(length(max = 16, message = "Locale is too long"))]
    pub locale: Option<String>,
}

/// Request payload for local sign-in
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email cannot be empty"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password cannot be empty"))]
    pub password: String,
}

/// Request payload for updating an account
///
/// Absent fields are left untouched. A `location` key never overwrites the
/// stored location; it only requests an address-based backfill.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[serde(default)]
    #[validate(custom(function = "email_validator"))]
    pub email: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "name_validator"))]
    pub name: Option<String>,

    #[serde(default)]
    pub birthdate: Option<NaiveDate>,

    #[serde(default, rename = "profession")]
    pub role: Option<String>,

    #[serde(default, rename = "matricule")]
    #[validate(custom(function = "linkage_code_validator"))]
    pub linkage_code: Option<String>,

    #[serde(default)]
    #[validate(length(max = 16, message = "Locale is too long"))]
    pub locale: Option<String>,

    #[serde(default)]
    pub location: Option<JsonValue>,

    #[serde(default, alias = "isFirstLogin")]
    pub is_first_login: Option<bool>,
}

/// Request payload for `POST /user/forgot`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(custom(function = "email_validator"))]
    pub email: String,
}

/// Request payload for `POST /user/store-password`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StorePasswordRequest {
    #[serde(alias = "userid")]
    pub account_id: Uuid,

    #[validate(length(min = 1, message = "Token cannot be empty"))]
    pub token: String,

    #[validate(length(
        min = 8,
        max = 128,
        message = "Password must be between 8 and 128 characters"
    ))]
    pub password: String,
}

/// Query of the linkage-code lookups
#[derive(Debug, Clone, Deserialize)]
pub struct LinkageQuery {
    #[serde(default)]
    pub matricule: Option<String>,
}

/// Query of `GET /user`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAccountsQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

/// Account plus derived settings and subscription, with a fresh session token
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub account: Account,
    pub settings: JsonValue,
    pub subscriber: SubscriberSummary,
    pub auth_token: String,
}

/// Account plus derived settings
#[derive(Debug, Clone, Serialize)]
pub struct AccountResponse {
    #[serde(flatten)]
    pub account: Account,
    pub settings: JsonValue,
}

/// Response for a successful registration
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub email: String,
    pub message: String,
}

/// Response for a created password reset request
#[derive(Debug, Serialize)]
pub struct ResetRequestedResponse {
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

/// Plain confirmation message
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// One page of a listing
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

/// Response for health check
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_json(value: serde_json::Value) -> RegisterRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_register_request_validation() {
        let valid = register_json(serde_json::json!({
            "email": "a@x.com",
            "password": "longenough",
            "profession": "patient",
            "matricule": "M1"
        }));
        assert!(valid.validate().is_ok());
        assert_eq!(valid.role.as_deref(), Some("patient"));
        assert_eq!(valid.linkage_code.as_deref(), Some("M1"));

        let short_password = register_json(serde_json::json!({
            "email": "a@x.com",
            "password": "short",
            "profession": "patient"
        }));
        assert!(short_password.validate().is_err());

        let bad_email = register_json(serde_json::json!({
            "email": "not-an-email",
            "password": "longenough",
            "profession": "patient"
        }));
        assert!(bad_email.validate().is_err());
    }

    #[test]
    fn test_store_password_accepts_legacy_userid() {
        let id = Uuid::new_v4();
        let request: StorePasswordRequest = serde_json::from_value(serde_json::json!({
            "userid": id,
            "token": "abc",
            "password": "newpassword1"
        }))
        .unwrap();

        assert_eq!(request.account_id, id);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_update_request_location_presence() {
        let request: UpdateAccountRequest = serde_json::from_value(serde_json::json!({
            "location": {},
            "isFirstLogin": false
        }))
        .unwrap();

        assert!(request.location.is_some());
        assert_eq!(request.is_first_login, Some(false));
        assert!(request.email.is_none());
    }
}
