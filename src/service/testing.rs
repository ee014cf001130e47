//! Fake collaborators shared by service and handler tests

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex as TokioMutex;
use uuid::Uuid;

use super::email_service::{MailError, Mailer};
use super::geolocation::{GeoError, GeoLocator, GeoLookup};
use super::jwt::JwtService;
use super::{AccountService, Collaborators, IdentityService, PasswordResetService};
use crate::config::{PolicyConfig, ResetConfig};
use crate::database::{
    MemoryStore, SettingsStore, StoreError, StoreResult, SubscriptionStore,
};
use crate::models::{Location, Subscriber};
use crate::utils::network::is_local_ip;

/// Public address the fake locator places in France
pub const FRANCE_IP: &str = "81.2.69.160";

pub const ALLOWED_ORIGIN: &str = "https://qa.example.com";
pub const DEFAULT_DOMAIN: &str = "https://app.example.com";

/// Resolves every public address to France
pub struct FakeLocator;

#[async_trait]
impl GeoLocator for FakeLocator {
    async fn resolve(&self, ip: IpAddr) -> Result<GeoLookup, GeoError> {
        if is_local_ip(ip) {
            return Ok(GeoLookup::Skipped);
        }
        Ok(GeoLookup::Found(Location {
            country: Some("France".into()),
            country_code: Some("FR".into()),
            city: Some("Paris".into()),
            ..Location::default()
        }))
    }
}

pub struct FailingLocator;

#[async_trait]
impl GeoLocator for FailingLocator {
    async fn resolve(&self, _ip: IpAddr) -> Result<GeoLookup, GeoError> {
        Err(GeoError::Status(503))
    }
}

pub struct FailingEnrichment;

#[async_trait]
impl SettingsStore for FailingEnrichment {
    async fn get_or_create(&self, _account_id: Uuid) -> StoreResult<JsonValue> {
        Err(StoreError::Timeout(std::time::Duration::from_secs(1)))
    }
}

#[async_trait]
impl SubscriptionStore for FailingEnrichment {
    async fn find_by_account(&self, _account_id: Uuid) -> StoreResult<Option<Subscriber>> {
        Err(StoreError::Corrupt("subscriber".into()))
    }
}

/// A reset mail as captured by [`RecordingMailer`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentReset {
    pub email: String,
    pub domain: String,
    pub account_id: Uuid,
    pub token: String,
}

/// Captures outgoing mail; reset delivery can be made to fail
#[derive(Default)]
pub struct RecordingMailer {
    confirmations: TokioMutex<Vec<String>>,
    resets: TokioMutex<Vec<SentReset>>,
    fail_resets: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail_resets: true,
            ..Self::default()
        }
    }

    pub async fn confirmations(&self) -> Vec<String> {
        self.confirmations.lock().await.clone()
    }

    pub async fn resets(&self) -> Vec<SentReset> {
        self.resets.lock().await.clone()
    }

    pub async fn last_reset(&self) -> Option<SentReset> {
        self.resets.lock().await.last().cloned()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_confirmation(&self, email: &str) -> Result<(), MailError> {
        self.confirmations.lock().await.push(email.to_string());
        Ok(())
    }

    async fn send_reset_link(
        &self,
        email: &str,
        domain: &str,
        account_id: Uuid,
        raw_token: &str,
    ) -> Result<(), MailError> {
        if self.fail_resets {
            return Err(MailError::Transport("connection refused".into()));
        }
        self.resets.lock().await.push(SentReset {
            email: email.to_string(),
            domain: domain.to_string(),
            account_id,
            token: raw_token.to_string(),
        });
        Ok(())
    }
}

pub fn reset_config() -> ResetConfig {
    ResetConfig {
        allowed_origins: vec![DEFAULT_DOMAIN.into(), ALLOWED_ORIGIN.into()],
        default_domain: DEFAULT_DOMAIN.into(),
        ttl_hours: 24,
    }
}

pub fn policy() -> PolicyConfig {
    PolicyConfig {
        bcrypt_cost: 4,
        ..PolicyConfig::default()
    }
}

/// Services wired to an in-memory store and fake collaborators
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub jwt: Arc<JwtService>,
    pub collaborators: Collaborators,
    pub identity: IdentityService,
    pub accounts: AccountService,
    pub resets: PasswordResetService,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(RecordingMailer::default(), false)
    }

    pub fn with_failing_mail() -> Self {
        Self::build(RecordingMailer::failing(), false)
    }

    pub fn with_failing_enrichment() -> Self {
        Self::build(RecordingMailer::default(), true)
    }

    fn build(mailer: RecordingMailer, failing_enrichment: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(mailer);
        let jwt = Arc::new(JwtService::new("test_session_secret".into()));

        let mut collaborators =
            Collaborators::with_store(store.clone(), Arc::new(FakeLocator), mailer.clone(), jwt.clone());
        if failing_enrichment {
            collaborators.geo = Arc::new(FailingLocator);
            collaborators.settings = Arc::new(FailingEnrichment);
            collaborators.subscriptions = Arc::new(FailingEnrichment);
        }

        Self {
            identity: IdentityService::new(&collaborators, policy()),
            accounts: AccountService::new(&collaborators),
            resets: PasswordResetService::new(&collaborators, reset_config(), policy().bcrypt_cost),
            store,
            mailer,
            jwt,
            collaborators,
        }
    }
}
