//! JWT Service
//!
//! Stateless HS256 session tokens and the signed CSRF state used by the
//! OAuth authorization-code flow.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::models::oauth::OAuthStateClaims;
use crate::models::{OAuthProvider, SessionClaims};
use crate::utils::security::generate_secure_token;

/// Default session lifetime in hours
pub const DEFAULT_SESSION_HOURS: i64 = 24;

/// OAuth state lifetime in minutes
const STATE_EXPIRY_MINUTES: i64 = 10;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Invalid or expired token: {0}")]
    Invalid(String),
}

/// Signs and verifies session tokens
pub trait TokenSigner: Send + Sync {
    fn issue(&self, claims: &SessionClaims) -> Result<String, TokenError>;

    fn verify(&self, token: &str) -> Result<SessionClaims, TokenError>;

    /// Lifetime given to freshly issued sessions
    fn expires_in(&self) -> Duration;
}

/// HS256 implementation of [`TokenSigner`]
#[derive(Clone)]
pub struct JwtService {
    secret: String,
    session_expires_in: Duration,
    state_expires_in: Duration,
}

impl JwtService {
    pub fn new(secret: String) -> Self {
        Self::with_expiration(secret, Duration::hours(DEFAULT_SESSION_HOURS))
    }

    pub fn with_expiration(secret: String, session_expires_in: Duration) -> Self {
        Self {
            secret,
            session_expires_in,
            state_expires_in: Duration::minutes(STATE_EXPIRY_MINUTES),
        }
    }

    /// Signs a short-lived state bound to `provider`
    pub fn issue_state(&self, provider: OAuthProvider) -> Result<String, TokenError> {
        let claims = OAuthStateClaims {
            provider,
            nonce: generate_secure_token(24),
            exp: (Utc::now() + self.state_expires_in).timestamp(),
        };
        self.encode_claims(&claims)
    }

    /// Checks signature, expiry and that the state was minted for `provider`
    pub fn verify_state(&self, state: &str, provider: OAuthProvider) -> Result<(), TokenError> {
        let claims: OAuthStateClaims = self.decode_claims(state)?;
        if claims.provider != provider {
            return Err(TokenError::Invalid(
                "State was issued for another provider".into(),
            ));
        }
        Ok(())
    }

    fn encode_claims<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        let header = Header::new(Algorithm::HS256);
        let encoding_key = EncodingKey::from_secret(self.secret.as_ref());

        encode(&header, claims, &encoding_key).map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn decode_claims<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;

        let decoding_key = DecodingKey::from_secret(self.secret.as_ref());

        decode::<T>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }
}

impl TokenSigner for JwtService {
    fn issue(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        self.encode_claims(claims)
    }

    fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.decode_claims(token)
    }

    fn expires_in(&self) -> Duration {
        self.session_expires_in
    }
}
