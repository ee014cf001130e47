//! OAuth Models
//!
//! Provider identifiers, normalized provider profiles and the payloads
//! exchanged with Facebook, Google and Apple.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::validation::normalize_email;

/// Supported external identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Facebook,
    Google,
    Apple,
}

impl OAuthProvider {
    pub const ALL: [OAuthProvider; 3] = [
        OAuthProvider::Facebook,
        OAuthProvider::Google,
        OAuthProvider::Apple,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Facebook => "facebook",
            OAuthProvider::Google => "google",
            OAuthProvider::Apple => "apple",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facebook" => Ok(OAuthProvider::Facebook),
            "google" => Ok(OAuthProvider::Google),
            "apple" => Ok(OAuthProvider::Apple),
            other => Err(format!("unsupported provider '{}'", other)),
        }
    }
}

/// `{ "value": ... }` wrapper used by provider profiles for emails and photos
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileValue {
    pub value: String,
}

/// Provider profile as asserted by Facebook, Google or Apple
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthProfile {
    /// Provider-side user identifier
    pub id: String,

    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,

    #[serde(default, alias = "givenName")]
    pub given_name: Option<String>,

    #[serde(default, alias = "familyName")]
    pub family_name: Option<String>,

    #[serde(default)]
    pub emails: Vec<ProfileValue>,

    #[serde(default)]
    pub photos: Vec<ProfileValue>,
}

impl OAuthProfile {
    /// All asserted email addresses, normalized, in assertion order
    pub fn email_addresses(&self) -> Vec<String> {
        let mut emails: Vec<String> = Vec::with_capacity(self.emails.len());
        for email in &self.emails {
            let normalized = normalize_email(&email.value);
            if !normalized.is_empty() && !emails.contains(&normalized) {
                emails.push(normalized);
            }
        }
        emails
    }

    /// Best display name available: explicit display name, else given + family
    pub fn full_name(&self) -> Option<String> {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Some(name.trim().to_string());
        }

        let parts: Vec<&str> = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    pub fn photo_url(&self) -> Option<String> {
        self.photos.first().map(|p| p.value.clone())
    }
}

/// Response to `GET /login/{provider}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationUrlResponse {
    /// Provider authorization URL the client should be redirected to
    pub authorization_url: String,

    /// Signed CSRF state that must come back on the callback
    pub state: String,
}

/// Provider callback query parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Claims carried by the signed CSRF state of the authorization-code flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthStateClaims {
    pub provider: OAuthProvider,
    pub nonce: String,
    pub exp: i64,
}

/// Client-driven login: the client already completed the provider dance
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyLoginRequest {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub profile: OAuthProfile,
}

/// Query of `GET /login/google/id-token`
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleIdTokenQuery {
    pub id_token: String,
}

/// Name block the Apple JS/iOS SDK sends on first authorization only
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppleName {
    #[serde(default, alias = "firstName")]
    pub given_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub family_name: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Body of `POST /login/apple`
#[derive(Debug, Clone, Deserialize)]
pub struct AppleLoginRequest {
    pub id_token: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub name: Option<AppleName>,
}

/// Claims of an Apple identity token that the service relies on
#[derive(Debug, Clone, Deserialize)]
pub struct AppleIdTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Google `tokeninfo` endpoint response for an id token
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleTokenInfo {
    pub sub: String,
    pub aud: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Google OpenID Connect userinfo response
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Facebook Graph `/me` response
#[derive(Debug, Clone, Deserialize)]
pub struct FacebookUserInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<FacebookPicture>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacebookPicture {
    pub data: FacebookPictureData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FacebookPictureData {
    pub url: String,
}

fn single_value(value: Option<String>) -> Vec<ProfileValue> {
    value
        .filter(|v| !v.is_empty())
        .map(|value| vec![ProfileValue { value }])
        .unwrap_or_default()
}

impl From<GoogleTokenInfo> for OAuthProfile {
    fn from(info: GoogleTokenInfo) -> Self {
        OAuthProfile {
            id: info.sub,
            display_name: info.name,
            given_name: info.given_name,
            family_name: info.family_name,
            emails: single_value(info.email),
            photos: single_value(info.picture),
        }
    }
}

impl From<GoogleUserInfo> for OAuthProfile {
    fn from(info: GoogleUserInfo) -> Self {
        OAuthProfile {
            id: info.sub,
            display_name: info.name,
            given_name: info.given_name,
            family_name: info.family_name,
            emails: single_value(info.email),
            photos: single_value(info.picture),
        }
    }
}

impl From<FacebookUserInfo> for OAuthProfile {
    fn from(info: FacebookUserInfo) -> Self {
        OAuthProfile {
            id: info.id,
            display_name: info.name,
            given_name: info.first_name,
            family_name: info.last_name,
            emails: single_value(info.email),
            photos: single_value(info.picture.map(|p| p.data.url)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trip_names() {
        for provider in OAuthProvider::ALL {
            assert_eq!(provider.as_str().parse::<OAuthProvider>().unwrap(), provider);
        }
        assert!("github".parse::<OAuthProvider>().is_err());
    }

    #[test]
    fn test_passport_style_profile_deserializes() {
        let profile: OAuthProfile = serde_json::from_value(serde_json::json!({
            "id": "10155",
            "displayName": "Jane Roe",
            "emails": [{ "value": "Jane@Example.com" }, { "value": "jane@example.com" }],
            "photos": [{ "value": "https://cdn.example.com/jane.png" }]
        }))
        .unwrap();

        assert_eq!(profile.email_addresses(), vec!["jane@example.com".to_string()]);
        assert_eq!(profile.full_name().as_deref(), Some("Jane Roe"));
        assert_eq!(
            profile.photo_url().as_deref(),
            Some("https://cdn.example.com/jane.png")
        );
    }

    #[test]
    fn test_full_name_falls_back_to_parts() {
        let profile = OAuthProfile {
            id: "x".into(),
            given_name: Some("Jean".into()),
            family_name: Some("Dupont".into()),
            ..OAuthProfile::default()
        };
        assert_eq!(profile.full_name().as_deref(), Some("Jean Dupont"));

        let anonymous = OAuthProfile {
            id: "y".into(),
            ..OAuthProfile::default()
        };
        assert_eq!(anonymous.full_name(), None);
    }

    #[test]
    fn test_facebook_userinfo_conversion() {
        let info: FacebookUserInfo = serde_json::from_value(serde_json::json!({
            "id": "fb-1",
            "name": "Sam",
            "email": "sam@example.com",
            "picture": { "data": { "url": "https://graph.example/p.jpg" } }
        }))
        .unwrap();

        let profile = OAuthProfile::from(info);
        assert_eq!(profile.id, "fb-1");
        assert_eq!(profile.email_addresses(), vec!["sam@example.com".to_string()]);
        assert_eq!(profile.photo_url().as_deref(), Some("https://graph.example/p.jpg"));
    }
}
