//! Best-effort enrichment
//!
//! Location backfill and the settings/subscription data attached to account
//! responses. Nothing here fails the caller: errors are logged and replaced
//! by an empty value.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::geolocation::{GeoLocator, GeoLookup};
use super::Collaborators;
use crate::database::{AccountStore, SettingsStore, SubscriptionStore};
use crate::models::{Account, Location, SubscriberSummary};

#[derive(Clone)]
pub struct Enricher {
    accounts: Arc<dyn AccountStore>,
    settings: Arc<dyn SettingsStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    geo: Arc<dyn GeoLocator>,
}

impl Enricher {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            accounts: collaborators.accounts.clone(),
            settings: collaborators.settings.clone(),
            subscriptions: collaborators.subscriptions.clone(),
            geo: collaborators.geo.clone(),
        }
    }

    pub async fn lookup_location(&self, ip: Option<IpAddr>) -> Option<Location> {
        let ip = ip?;
        match self.geo.resolve(ip).await {
            Ok(GeoLookup::Found(location)) => Some(location),
            Ok(GeoLookup::Skipped) => {
                debug!("Skipping geolocation for local address {}", ip);
                None
            }
            Ok(GeoLookup::Unknown) => None,
            Err(e) => {
                warn!("Geolocation failed for {}: {}", ip, e);
                None
            }
        }
    }

    /// Fills in the location of an account that has no country yet and persists it
    pub async fn backfill_location(&self, account: &mut Account, ip: Option<IpAddr>) {
        if !account.needs_location() {
            return;
        }

        let Some(location) = self.lookup_location(ip).await else {
            return;
        };

        let previous = account.location.replace(location);
        account.updated_at = Utc::now();
        if let Err(e) = self.accounts.update(account).await {
            warn!("Failed to save location of account {}: {}", account.id, e);
            account.location = previous;
        }
    }

    /// Settings document of the account, `{}` when it cannot be loaded
    pub async fn settings_for(&self, account_id: Uuid) -> JsonValue {
        match self.settings.get_or_create(account_id).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings of account {}: {}", account_id, e);
                JsonValue::Object(Default::default())
            }
        }
    }

    /// Subscription summary of the account, empty when absent or unavailable
    pub async fn subscriber_for(&self, account_id: Uuid) -> SubscriberSummary {
        match self.subscriptions.find_by_account(account_id).await {
            Ok(Some(subscriber)) => subscriber.into(),
            Ok(None) => SubscriberSummary::default(),
            Err(e) => {
                warn!("Failed to load subscription of account {}: {}", account_id, e);
                SubscriberSummary::default()
            }
        }
    }
}
