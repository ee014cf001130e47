//! IP Geolocation
//!
//! Resolves a client address to a coarse location. Local and private
//! addresses are skipped without any network call.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::models::Location;
use crate::utils::network::is_local_ip;

/// Outcome of a lookup that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum GeoLookup {
    /// Address is loopback or private; no lookup attempted
    Skipped,
    Found(Location),
    /// Provider answered but knows nothing about the address
    Unknown,
}

#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Geolocation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Geolocation provider returned status {0}")]
    Status(u16),
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn resolve(&self, ip: IpAddr) -> Result<GeoLookup, GeoError>;
}

/// ip-api.com style JSON response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    timezone: Option<String>,
}

impl IpApiResponse {
    fn into_lookup(self) -> GeoLookup {
        if self.status != "success" {
            return GeoLookup::Unknown;
        }

        let location = Location {
            country: self.country,
            country_code: self.country_code,
            region: self.region_name,
            city: self.city,
            latitude: self.lat,
            longitude: self.lon,
            timezone: self.timezone,
        };

        if location.has_country() {
            GeoLookup::Found(location)
        } else {
            GeoLookup::Unknown
        }
    }
}

/// HTTP geolocation client for ip-api.com compatible endpoints
pub struct IpApiLocator {
    client: reqwest::Client,
    endpoint: String,
}

impl IpApiLocator {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn resolve(&self, ip: IpAddr) -> Result<GeoLookup, GeoError> {
        if is_local_ip(ip) {
            return Ok(GeoLookup::Skipped);
        }

        let url = format!("{}/{}", self.endpoint, ip);
        debug!("Resolving location for {}", ip);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(GeoError::Status(response.status().as_u16()));
        }

        let body: IpApiResponse = response.json().await?;
        Ok(body.into_lookup())
    }
}

/// Locator used when geolocation is turned off
pub struct DisabledLocator;

#[async_trait]
impl GeoLocator for DisabledLocator {
    async fn resolve(&self, _ip: IpAddr) -> Result<GeoLookup, GeoError> {
        Ok(GeoLookup::Skipped)
    }
}
