//! Password Reset Service
//!
//! Mailed one-time tokens. Only the SHA-256 digest of a token is stored and
//! each account has at most one open request.

use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{info, warn};
use uuid::Uuid;

use super::email_service::Mailer;
use super::error::{IdentityError, IdentityResult};
use super::Collaborators;
use crate::config::ResetConfig;
use crate::database::{AccountStore, ResetRequestStore};
use crate::models::{PasswordResetRequest, ResetHandle};
use crate::utils::security::{
    generate_reset_token, hash_password_with_cost, hash_sensitive_data, verify_token_hash,
};
use crate::utils::validation::normalize_email;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

const NO_OPEN_REQUEST: &str = "This password reset link is no longer valid.";

#[derive(Clone)]
pub struct PasswordResetService {
    accounts: Arc<dyn AccountStore>,
    resets: Arc<dyn ResetRequestStore>,
    mailer: Arc<dyn Mailer>,
    config: ResetConfig,
    bcrypt_cost: u32,
}

impl PasswordResetService {
    pub fn new(collaborators: &Collaborators, config: ResetConfig, bcrypt_cost: u32) -> Self {
        Self {
            accounts: collaborators.accounts.clone(),
            resets: collaborators.resets.clone(),
            mailer: collaborators.mailer.clone(),
            config,
            bcrypt_cost,
        }
    }

    /// Opens a reset request for `email` and mails its link
    ///
    /// The link points at `origin` when it is an allowed origin, otherwise at
    /// the configured default domain. A previous open request is discarded.
    pub async fn request_password_reset(
        &self,
        email: &str,
        origin: Option<&str>,
    ) -> IdentityResult<ResetHandle> {
        let account = self
            .accounts
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| {
                IdentityError::NotFound(
                    "No user found with that email address. Check your input.".into(),
                )
            })?
            .account;

        if let Some(previous) = self.resets.find_unconsumed_by_account(account.id).await? {
            self.resets.delete(previous.id).await?;
        }

        let raw_token = generate_reset_token();
        let request = PasswordResetRequest::new(
            account.id,
            hash_sensitive_data(&raw_token),
            Duration::hours(self.config.ttl_hours),
        );
        self.resets.insert(&request).await?;

        let domain = self.config.link_domain(origin);
        self.mailer
            .send_reset_link(&account.email, &domain, account.id, &raw_token)
            .await
            .map_err(|e| {
                warn!("Reset mail for account {} failed: {}", account.id, e);
                IdentityError::MailDelivery(e.to_string())
            })?;

        info!("Password reset requested for account {}", account.id);
        Ok(ResetHandle {
            account_id: account.id,
            expires_at: request.expires_at,
        })
    }

    /// Redeems a mailed token and sets a new password
    pub async fn reset_password(
        &self,
        account_id: Uuid,
        raw_token: &str,
        new_password: &str,
    ) -> IdentityResult<()> {
        let request = self
            .resets
            .find_unconsumed_by_account(account_id)
            .await?
            .ok_or_else(|| IdentityError::Expired(NO_OPEN_REQUEST.into()))?;

        if request.is_expired_at(Utc::now()) {
            return Err(IdentityError::Expired(NO_OPEN_REQUEST.into()));
        }

        if !verify_token_hash(raw_token, &request.token_hash) {
            warn!("Reset token mismatch for account {}", account_id);
            return Err(IdentityError::Mismatch(
                "The password reset token is not valid.".into(),
            ));
        }

        let length = new_password.chars().count();
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length) {
            return Err(IdentityError::Validation(
                "Password must be between 8 and 128 characters".into(),
            ));
        }

        let password_hash = hash_password_with_cost(new_password, self.bcrypt_cost)?;
        self.accounts
            .set_password_hash(account_id, &password_hash)
            .await
            .map_err(|e| IdentityError::Internal(format!("Failed to store password: {}", e)))?;
        self.resets
            .mark_consumed(request.id)
            .await
            .map_err(|e| IdentityError::Internal(format!("Failed to consume reset: {}", e)))?;

        info!("Password reset completed for account {}", account_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RegisterRequest;
    use crate::service::testing::{Harness, ALLOWED_ORIGIN, DEFAULT_DOMAIN};

    async fn registered(h: &Harness) -> Uuid {
        h.identity
            .register_local(
                RegisterRequest {
                    email: "a@x.com".into(),
                    password: "password123".into(),
                    name: None,
                    birthdate: None,
                    role: Some("patient".into()),
                    linkage_code: None,
                    locale: None,
                },
                None,
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_reset_round_trip() {
        let h = Harness::new();
        let id = registered(&h).await;

        let handle = h.resets.request_password_reset("A@x.com", None).await.unwrap();
        assert_eq!(handle.account_id, id);

        let sent = h.mailer.last_reset().await.unwrap();
        assert_eq!(sent.email, "a@x.com");
        assert_eq!(sent.domain, DEFAULT_DOMAIN);
        assert_eq!(sent.token.len(), 64);
        assert!(sent.token.chars().all(|c| c.is_ascii_alphanumeric()));

        // Only the digest is stored
        let stored = h.store.find_unconsumed_by_account(id).await.unwrap().unwrap();
        assert_ne!(stored.token_hash, sent.token);
        assert_eq!(stored.expires_at, handle.expires_at);

        h.resets
            .reset_password(id, &sent.token, "brand-new-password")
            .await
            .unwrap();

        assert!(h
            .identity
            .authenticate_local("a@x.com", "brand-new-password", None)
            .await
            .is_ok());
        assert!(h
            .identity
            .authenticate_local("a@x.com", "password123", None)
            .await
            .is_err());

        // Second redemption finds nothing open
        assert!(matches!(
            h.resets.reset_password(id, &sent.token, "another-password").await,
            Err(IdentityError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_email_not_found() {
        let h = Harness::new();
        assert!(matches!(
            h.resets.request_password_reset("nobody@x.com", None).await,
            Err(IdentityError::NotFound(_))
        ));
        assert!(h.mailer.resets().await.is_empty());
    }

    #[tokio::test]
    async fn test_allowed_origin_is_used_for_link() {
        let h = Harness::new();
        registered(&h).await;

        h.resets
            .request_password_reset("a@x.com", Some(ALLOWED_ORIGIN))
            .await
            .unwrap();
        assert_eq!(h.mailer.last_reset().await.unwrap().domain, ALLOWED_ORIGIN);

        h.resets
            .request_password_reset("a@x.com", Some("https://phishing.example"))
            .await
            .unwrap();
        assert_eq!(h.mailer.last_reset().await.unwrap().domain, DEFAULT_DOMAIN);
    }

    #[tokio::test]
    async fn test_new_request_supersedes_previous() {
        let h = Harness::new();
        let id = registered(&h).await;

        h.resets.request_password_reset("a@x.com", None).await.unwrap();
        let first = h.mailer.last_reset().await.unwrap();
        h.resets.request_password_reset("a@x.com", None).await.unwrap();
        let second = h.mailer.last_reset().await.unwrap();

        assert!(matches!(
            h.resets.reset_password(id, &first.token, "brand-new-password").await,
            Err(IdentityError::Mismatch(_))
        ));
        h.resets
            .reset_password(id, &second.token, "brand-new-password")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wrong_token_leaves_request_redeemable() {
        let h = Harness::new();
        let id = registered(&h).await;
        h.resets.request_password_reset("a@x.com", None).await.unwrap();
        let sent = h.mailer.last_reset().await.unwrap();

        assert!(matches!(
            h.resets.reset_password(id, "not-the-token", "brand-new-password").await,
            Err(IdentityError::Mismatch(_))
        ));
        assert!(h
            .identity
            .authenticate_local("a@x.com", "password123", None)
            .await
            .is_ok());

        h.resets
            .reset_password(id, &sent.token, "brand-new-password")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_request_rejected() {
        let h = Harness::new();
        let id = registered(&h).await;

        let raw = "x".repeat(64);
        let mut request = PasswordResetRequest::new(id, hash_sensitive_data(&raw), Duration::hours(24));
        request.expires_at = Utc::now() - Duration::seconds(1);
        ResetRequestStore::insert(h.store.as_ref(), &request).await.unwrap();

        assert!(matches!(
            h.resets.reset_password(id, &raw, "brand-new-password").await,
            Err(IdentityError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn test_short_password_rejected_without_consuming() {
        let h = Harness::new();
        let id = registered(&h).await;
        h.resets.request_password_reset("a@x.com", None).await.unwrap();
        let sent = h.mailer.last_reset().await.unwrap();

        assert!(matches!(
            h.resets.reset_password(id, &sent.token, "short").await,
            Err(IdentityError::Validation(_))
        ));
        assert!(h.store.find_unconsumed_by_account(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_mail_failure_is_distinct_and_keeps_request() {
        let h = Harness::with_failing_mail();
        let id = registered(&h).await;

        assert!(matches!(
            h.resets.request_password_reset("a@x.com", None).await,
            Err(IdentityError::MailDelivery(_))
        ));
        assert!(h.store.find_unconsumed_by_account(id).await.unwrap().is_some());
    }
}
