//! OAuth Service
//!
//! Provider side of external sign-in: the authorization-code flow for
//! Facebook and Google, Google id-token verification and Apple identity
//! token decoding. Every operation ends with an [`OAuthProfile`] that the
//! identity service resolves to an account.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::{debug, warn};
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthType, AuthUrl, AuthorizationCode,
    ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use reqwest::Client as HttpClient;
use thiserror::Error;

use super::error::IdentityError;
use super::jwt::JwtService;
use crate::config::{OAuthConfig, ProviderCredentials};
use crate::models::oauth::{
    AppleIdTokenClaims, AppleName, AuthorizationUrlResponse, FacebookUserInfo, GoogleTokenInfo,
    GoogleUserInfo, ProfileValue,
};
use crate::models::{OAuthProfile, OAuthProvider};
use crate::utils::error::AppError;

const FACEBOOK_AUTH_URL: &str = "https://www.facebook.com/v18.0/dialog/oauth";
const FACEBOOK_TOKEN_URL: &str = "https://graph.facebook.com/v18.0/oauth/access_token";
const FACEBOOK_PROFILE_URL: &str =
    "https://graph.facebook.com/v18.0/me?fields=id,name,first_name,last_name,email,picture";

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v4/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

const APPLE_ISSUER: &str = "https://appleid.apple.com";

/// OAuth service specific errors
#[derive(Error, Debug)]
pub enum OAuthError {
    /// Provider has no client credentials configured
    #[error("{0} login is not enabled")]
    NotConfigured(OAuthProvider),

    /// Provider does not support the requested flow
    #[error("{0} does not support this login flow")]
    Unsupported(OAuthProvider),

    #[error("OAuth configuration error: {0}")]
    Configuration(String),

    #[error("Invalid OAuth state: {0}")]
    InvalidState(String),

    /// The provider redirected back with an error instead of a code
    #[error("Authorization denied: {0}")]
    Denied(String),

    #[error("Invalid identity token: {0}")]
    InvalidIdToken(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Failed to fetch user info: {0}")]
    UserInfo(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for OAuth service operations
pub type OAuthResult<T> = Result<T, OAuthError>;

impl From<OAuthError> for IdentityError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::NotConfigured(_) | OAuthError::Unsupported(_) => {
                IdentityError::NotFound(err.to_string())
            }
            OAuthError::Configuration(msg) => IdentityError::Internal(msg),
            OAuthError::InvalidState(_) | OAuthError::Denied(_) | OAuthError::InvalidIdToken(_) => {
                IdentityError::Authentication(err.to_string())
            }
            OAuthError::TokenExchange(_) | OAuthError::UserInfo(_) | OAuthError::Http(_) => {
                IdentityError::Provider(err.to_string())
            }
        }
    }
}

impl From<OAuthError> for AppError {
    fn from(err: OAuthError) -> Self {
        IdentityError::from(err).into()
    }
}

fn build_client(
    provider: OAuthProvider,
    credentials: &ProviderCredentials,
    auth_url: &str,
    token_url: &str,
) -> OAuthResult<BasicClient> {
    let invalid = |what: &str, e: url::ParseError| {
        OAuthError::Configuration(format!("Invalid {} {}: {}", provider, what, e))
    };

    let client = BasicClient::new(
        ClientId::new(credentials.client_id.clone()),
        Some(ClientSecret::new(credentials.client_secret.clone())),
        AuthUrl::new(auth_url.to_string()).map_err(|e| invalid("auth URL", e))?,
        Some(TokenUrl::new(token_url.to_string()).map_err(|e| invalid("token URL", e))?),
    )
    .set_redirect_uri(
        RedirectUrl::new(credentials.redirect_uri.clone())
            .map_err(|e| invalid("redirect URI", e))?,
    );

    // Facebook only reads client credentials from the request body
    Ok(match provider {
        OAuthProvider::Facebook => client.set_auth_type(AuthType::RequestBody),
        _ => client,
    })
}

/// Identity provider integration
pub struct OAuthService {
    facebook: Option<BasicClient>,
    google: Option<BasicClient>,
    google_audiences: Vec<String>,
    apple_client_id: Option<String>,
    http_client: HttpClient,
    jwt_service: Arc<JwtService>,
}

impl OAuthService {
    pub fn new(config: &OAuthConfig, jwt_service: Arc<JwtService>) -> OAuthResult<Self> {
        let facebook = config
            .facebook
            .as_ref()
            .map(|c| build_client(OAuthProvider::Facebook, c, FACEBOOK_AUTH_URL, FACEBOOK_TOKEN_URL))
            .transpose()?;
        let google = config
            .google
            .as_ref()
            .map(|c| build_client(OAuthProvider::Google, c, GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL))
            .transpose()?;

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            facebook,
            google,
            google_audiences: config.google_id_token_audiences.clone(),
            apple_client_id: config.apple_client_id.clone(),
            http_client,
            jwt_service,
        })
    }

    fn client(&self, provider: OAuthProvider) -> OAuthResult<&BasicClient> {
        let client = match provider {
            OAuthProvider::Facebook => self.facebook.as_ref(),
            OAuthProvider::Google => self.google.as_ref(),
            OAuthProvider::Apple => return Err(OAuthError::Unsupported(provider)),
        };
        client.ok_or(OAuthError::NotConfigured(provider))
    }

    /// Provider authorization URL carrying a signed, short-lived state
    pub fn authorization_url(&self, provider: OAuthProvider) -> OAuthResult<AuthorizationUrlResponse> {
        let client = self.client(provider)?;
        let state = self
            .jwt_service
            .issue_state(provider)
            .map_err(|e| OAuthError::Configuration(e.to_string()))?;

        let scopes: &[&str] = match provider {
            OAuthProvider::Facebook => &["email", "public_profile"],
            _ => &["openid", "email", "profile"],
        };

        let state_for_url = state.clone();
        let (url, _) = client
            .authorize_url(move || CsrfToken::new(state_for_url))
            .add_scopes(scopes.iter().map(|s| Scope::new(s.to_string())))
            .url();

        Ok(AuthorizationUrlResponse {
            authorization_url: url.to_string(),
            state,
        })
    }

    /// Verifies the callback state, exchanges the code and fetches the profile
    ///
    /// Returns the profile and the provider access token.
    pub async fn complete_authorization(
        &self,
        provider: OAuthProvider,
        code: &str,
        state: &str,
    ) -> OAuthResult<(OAuthProfile, String)> {
        let client = self.client(provider)?;
        self.jwt_service
            .verify_state(state, provider)
            .map_err(|e| OAuthError::InvalidState(e.to_string()))?;

        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| OAuthError::TokenExchange(e.to_string()))?;
        let access_token = token.access_token().secret().clone();

        let profile = match provider {
            OAuthProvider::Facebook => self
                .fetch_profile::<FacebookUserInfo>(FACEBOOK_PROFILE_URL, &access_token)
                .await?
                .into(),
            _ => self
                .fetch_profile::<GoogleUserInfo>(GOOGLE_USERINFO_URL, &access_token)
                .await?
                .into(),
        };

        debug!("Completed {} authorization", provider);
        Ok((profile, access_token))
    }

    async fn fetch_profile<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> OAuthResult<T> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OAuthError::UserInfo(format!(
                "Provider returned status {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| OAuthError::UserInfo(e.to_string()))
    }

    /// Verifies a Google id token with the `tokeninfo` endpoint
    pub async fn verify_google_id_token(&self, id_token: &str) -> OAuthResult<OAuthProfile> {
        if self.google_audiences.is_empty() {
            return Err(OAuthError::NotConfigured(OAuthProvider::Google));
        }

        let url = url::Url::parse_with_params(GOOGLE_TOKENINFO_URL, &[("id_token", id_token)])
            .map_err(|e| OAuthError::Configuration(e.to_string()))?;
        let response = self.http_client.get(url).send().await?;

        // tokeninfo answers 400 for malformed or expired tokens
        if response.status().is_client_error() {
            return Err(OAuthError::InvalidIdToken(format!(
                "Google rejected the token ({})",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(OAuthError::UserInfo(format!(
                "Google returned status {}",
                response.status()
            )));
        }

        let info: GoogleTokenInfo = response
            .json()
            .await
            .map_err(|e| OAuthError::UserInfo(e.to_string()))?;
        self.google_profile(info)
    }

    fn google_profile(&self, info: GoogleTokenInfo) -> OAuthResult<OAuthProfile> {
        if !self.google_audiences.iter().any(|aud| aud == &info.aud) {
            warn!("Google id token issued for unexpected audience {}", info.aud);
            return Err(OAuthError::InvalidIdToken("Unexpected audience".into()));
        }
        Ok(info.into())
    }

    /// Reads the `sub` and `email` claims of an Apple identity token
    ///
    /// The signature is not checked. The audience is checked when an Apple
    /// client id is configured. A name sent by the client on first
    /// authorization is merged into the profile.
    pub fn decode_apple_id_token(
        &self,
        id_token: &str,
        name: Option<AppleName>,
    ) -> OAuthResult<OAuthProfile> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.set_issuer(&[APPLE_ISSUER]);
        match self.apple_client_id.as_deref() {
            Some(client_id) => validation.set_audience(&[client_id]),
            None => validation.validate_aud = false,
        }

        let claims = decode::<AppleIdTokenClaims>(id_token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| OAuthError::InvalidIdToken(e.to_string()))?
            .claims;

        let name = name.unwrap_or_default();
        Ok(OAuthProfile {
            id: claims.sub,
            display_name: name.nickname,
            given_name: name.given_name,
            family_name: name.family_name,
            emails: claims
                .email
                .filter(|e| !e.is_empty())
                .map(|value| vec![ProfileValue { value }])
                .unwrap_or_default(),
            photos: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn config() -> OAuthConfig {
        OAuthConfig {
            facebook: Some(ProviderCredentials {
                client_id: "fb-client".into(),
                client_secret: "fb-secret".into(),
                redirect_uri: "http://localhost:8080/login/facebook/callback".into(),
            }),
            google: None,
            google_id_token_audiences: vec!["web-client".into(), "ios-client".into()],
            apple_client_id: Some("com.example.app".into()),
            request_timeout_seconds: 5,
        }
    }

    fn service() -> (OAuthService, Arc<JwtService>) {
        let jwt = Arc::new(JwtService::new("test_state_secret".into()));
        (OAuthService::new(&config(), jwt.clone()).unwrap(), jwt)
    }

    fn apple_token(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"not-apples-key"),
        )
        .unwrap()
    }

    #[test]
    fn test_authorization_url_carries_signed_state() {
        let (service, jwt) = service();
        let response = service.authorization_url(OAuthProvider::Facebook).unwrap();

        assert!(response.authorization_url.starts_with(FACEBOOK_AUTH_URL));
        assert!(response.authorization_url.contains("client_id=fb-client"));
        assert!(response.authorization_url.contains(&response.state));
        assert!(jwt.verify_state(&response.state, OAuthProvider::Facebook).is_ok());
    }

    #[test]
    fn test_unconfigured_and_unsupported_providers() {
        let (service, _) = service();
        assert!(matches!(
            service.authorization_url(OAuthProvider::Google),
            Err(OAuthError::NotConfigured(OAuthProvider::Google))
        ));
        assert!(matches!(
            service.authorization_url(OAuthProvider::Apple),
            Err(OAuthError::Unsupported(OAuthProvider::Apple))
        ));
    }

    #[tokio::test]
    async fn test_callback_rejects_foreign_state_before_exchange() {
        let (service, jwt) = service();
        let google_state = jwt.issue_state(OAuthProvider::Google).unwrap();

        assert!(matches!(
            service
                .complete_authorization(OAuthProvider::Facebook, "code", &google_state)
                .await,
            Err(OAuthError::InvalidState(_))
        ));
        assert!(matches!(
            service
                .complete_authorization(OAuthProvider::Facebook, "code", "forged")
                .await,
            Err(OAuthError::InvalidState(_))
        ));
    }

    #[test]
    fn test_google_audience_check() {
        let (service, _) = service();
        let info = |aud: &str| GoogleTokenInfo {
            sub: "g-1".into(),
            aud: aud.into(),
            email: Some("a@x.com".into()),
            name: Some("A".into()),
            given_name: None,
            family_name: None,
            picture: None,
        };

        let profile = service.google_profile(info("ios-client")).unwrap();
        assert_eq!(profile.id, "g-1");
        assert_eq!(profile.email_addresses(), vec!["a@x.com".to_string()]);

        assert!(matches!(
            service.google_profile(info("someone-else")),
            Err(OAuthError::InvalidIdToken(_))
        ));
    }

    #[test]
    fn test_apple_token_decoding_merges_client_name() {
        let (service, _) = service();
        let token = apple_token(serde_json::json!({
            "iss": APPLE_ISSUER,
            "aud": "com.example.app",
            "sub": "apple-1",
            "email": "hidden@privaterelay.appleid.com",
            "exp": Utc::now().timestamp() + 600
        }));

        let profile = service
            .decode_apple_id_token(
                &token,
                Some(AppleName {
                    given_name: Some("Jean".into()),
                    family_name: Some("Dupont".into()),
                    nickname: None,
                }),
            )
            .unwrap();

        assert_eq!(profile.id, "apple-1");
        assert_eq!(profile.full_name().as_deref(), Some("Jean Dupont"));
        assert_eq!(
            profile.email_addresses(),
            vec!["hidden@privaterelay.appleid.com".to_string()]
        );
    }

    #[test]
    fn test_apple_token_for_other_client_rejected() {
        let (service, _) = service();
        let token = apple_token(serde_json::json!({
            "iss": APPLE_ISSUER,
            "aud": "com.other.app",
            "sub": "apple-1",
            "exp": Utc::now().timestamp() + 600
        }));

        assert!(matches!(
            service.decode_apple_id_token(&token, None),
            Err(OAuthError::InvalidIdToken(_))
        ));
        assert!(service.decode_apple_id_token("not-a-jwt", None).is_err());
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            IdentityError::from(OAuthError::NotConfigured(OAuthProvider::Google)),
            IdentityError::NotFound(_)
        ));
        assert!(matches!(
            IdentityError::from(OAuthError::InvalidState("bad".into())),
            IdentityError::Authentication(_)
        ));
        assert!(matches!(
            IdentityError::from(OAuthError::TokenExchange("boom".into())),
            IdentityError::Provider(_)
        ));
    }
}
