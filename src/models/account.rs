//! Account Model
//!
//! Core account data structures: role, geolocation, provider identity slots.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::oauth::OAuthProvider;

/// Role tag carried by every account
///
/// Patients are the dependent role: they may reference a practitioner
/// through the practitioner's linkage code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "orthophoniste", alias = "practitioner")]
    Practitioner,
    #[serde(rename = "patient")]
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Practitioner => "orthophoniste",
            Role::Patient => "patient",
        }
    }

    /// Whether this role links to a practitioner through a linkage code
    pub fn is_dependent(&self) -> bool {
        matches!(self, Role::Patient)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orthophoniste" | "practitioner" => Ok(Role::Practitioner),
            "patient" => Ok(Role::Patient),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Geolocation derived from the client's network address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
}

impl Location {
    pub fn has_country(&self) -> bool {
        self.country.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// External identity held by an account for one OAuth provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderLink {
    /// Provider-side user identifier (unique across all accounts)
    pub id: String,

    /// Last access token asserted by the provider; never sent to clients
    #[serde(skip_serializing, default)]
    pub access_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// Account representation for external API responses
///
/// Never carries the password hash; provider access tokens are skipped at
/// serialization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for the account
    pub id: Uuid,

    /// Normalized (trimmed, lower-cased) email address, unique
    pub email: String,

    /// Display name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<NaiveDate>,

    #[serde(rename = "profession")]
    pub role: Role,

    /// Practitioner linkage code (matricule)
    #[serde(rename = "matricule", skip_serializing_if = "Option::is_none")]
    pub linkage_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    pub is_first_login: bool,

    pub is_admin: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook: Option<ProviderLink>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub google: Option<ProviderLink>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub apple: Option<ProviderLink>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Builds a fresh account with no provider identities
    pub fn new(email: String, name: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            birthdate: None,
            role,
            linkage_code: None,
            locale: None,
            location: None,
            is_first_login: true,
            is_admin: false,
            facebook: None,
            google: None,
            apple: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn provider_link(&self, provider: OAuthProvider) -> Option<&ProviderLink> {
        match provider {
            OAuthProvider::Facebook => self.facebook.as_ref(),
            OAuthProvider::Google => self.google.as_ref(),
            OAuthProvider::Apple => self.apple.as_ref(),
        }
    }

    pub fn provider_link_mut(&mut self, provider: OAuthProvider) -> &mut Option<ProviderLink> {
        match provider {
            OAuthProvider::Facebook => &mut self.facebook,
            OAuthProvider::Google => &mut self.google,
            OAuthProvider::Apple => &mut self.apple,
        }
    }

    /// Whether geolocation still needs to be backfilled
    pub fn needs_location(&self) -> bool {
        !self.location.as_ref().is_some_and(Location::has_country)
    }
}

/// Internal account representation including the password hash
///
/// Used by stores and the authentication flow. Never exposed in API
/// responses; convert to [`Account`] first.
#[derive(Debug, Clone)]
pub struct AccountWithPassword {
    pub account: Account,

    /// bcrypt hash; absent for accounts created through an OAuth provider
    pub password_hash: Option<String>,
}

impl From<AccountWithPassword> for Account {
    fn from(record: AccountWithPassword) -> Self {
        record.account
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        assert_eq!(
            serde_json::to_value(Role::Practitioner).unwrap(),
            "orthophoniste"
        );
        assert_eq!(serde_json::to_value(Role::Patient).unwrap(), "patient");

        let parsed: Role = serde_json::from_str("\"practitioner\"").unwrap();
        assert_eq!(parsed, Role::Practitioner);
        assert!(serde_json::from_str::<Role>("\"doctor\"").is_err());
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("patient".parse::<Role>().unwrap(), Role::Patient);
        assert_eq!("orthophoniste".parse::<Role>().unwrap(), Role::Practitioner);
        assert!("admin".parse::<Role>().is_err());
        assert!(Role::Patient.is_dependent());
        assert!(!Role::Practitioner.is_dependent());
    }

    #[test]
    fn test_access_token_is_not_serialized() {
        let mut account = Account::new("a@x.com".into(), "A".into(), Role::Patient);
        account.google = Some(ProviderLink {
            id: "g-1".into(),
            access_token: Some("secret-token".into()),
            display_name: None,
            photo_url: None,
        });

        let json = serde_json::to_string(&account).unwrap();
        assert!(json.contains("g-1"));
        assert!(!json.contains("secret-token"));
        assert!(json.contains("\"profession\":\"patient\""));
    }

    #[test]
    fn test_needs_location() {
        let mut account = Account::new("a@x.com".into(), "A".into(), Role::Patient);
        assert!(account.needs_location());

        account.location = Some(Location::default());
        assert!(account.needs_location());

        account.location = Some(Location {
            country: Some("France".into()),
            ..Location::default()
        });
        assert!(!account.needs_location());
    }

    #[test]
    fn test_account_with_password_conversion() {
        let account = Account::new("a@x.com".into(), "A".into(), Role::Practitioner);
        let record = AccountWithPassword {
            account: account.clone(),
            password_hash: Some("hash".into()),
        };

        let public: Account = record.into();
        assert_eq!(public, account);
    }
}
