//! Service Layer
//!
//! Identity resolution, session issuance, account management, password
//! reset and identity provider integration. Every service reaches its
//! collaborators through the narrow traits bundled in [`Collaborators`].

use std::sync::Arc;

use crate::database::{AccountStore, ResetRequestStore, SettingsStore, SubscriptionStore};

pub mod accounts;
pub mod email_service;
pub mod enrichment;
pub mod error;
pub mod geolocation;
pub mod identity;
pub mod jwt;
pub mod oauth_service;
pub mod password_reset;

#[cfg(test)]
pub(crate) mod testing;

// Re-export services
pub use accounts::AccountService;
pub use email_service::{DisabledMailer, EmailService, MailError, Mailer};
pub use error::{IdentityError, IdentityResult};
pub use geolocation::{DisabledLocator, GeoError, GeoLocator, GeoLookup, IpApiLocator};
pub use identity::IdentityService;
pub use jwt::{JwtService, TokenError, TokenSigner};
pub use oauth_service::{OAuthError, OAuthService};
pub use password_reset::PasswordResetService;

/// Shared collaborators, built once at startup
#[derive(Clone)]
pub struct Collaborators {
    pub accounts: Arc<dyn AccountStore>,
    pub resets: Arc<dyn ResetRequestStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub geo: Arc<dyn GeoLocator>,
    pub mailer: Arc<dyn Mailer>,
    pub signer: Arc<dyn TokenSigner>,
}

impl Collaborators {
    /// Uses one store value for every persistence trait
    pub fn with_store<S>(
        store: Arc<S>,
        geo: Arc<dyn GeoLocator>,
        mailer: Arc<dyn Mailer>,
        signer: Arc<dyn TokenSigner>,
    ) -> Self
    where
        S: AccountStore + ResetRequestStore + SettingsStore + SubscriptionStore + 'static,
    {
        Self {
            accounts: store.clone(),
            resets: store.clone(),
            settings: store.clone(),
            subscriptions: store,
            geo,
            mailer,
            signer,
        }
    }
}
