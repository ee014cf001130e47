//! OAuth HTTP Request Handlers
//!
//! Sign-in through Facebook, Google and Apple. Every flow ends in
//! `IdentityService::resolve_oauth_identity`, which returns the session.

use axum::extract::State;

use super::handlers::{ok, ApiResult, AppState};
use super::middleware::{ApiJson, ApiPath, ApiQuery, ClientIp};
use crate::models::oauth::{
    AppleLoginRequest, AuthorizationUrlResponse, GoogleIdTokenQuery, OAuthCallbackQuery,
    ProxyLoginRequest,
};
use crate::models::{OAuthProvider, SessionResponse};
use crate::service::{OAuthError, OAuthService};
use crate::utils::error::{AppError, AppResult};

fn parse_provider(raw: &str) -> AppResult<OAuthProvider> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("Unknown identity provider '{}'", raw)))
}

fn oauth_service(state: &AppState) -> AppResult<&OAuthService> {
    state
        .oauth
        .as_deref()
        .ok_or_else(|| AppError::NotFound("OAuth login is not enabled".to_string()))
}

fn require(provider: OAuthProvider, expected: OAuthProvider) -> AppResult<()> {
    if provider != expected {
        return Err(OAuthError::Unsupported(provider).into());
    }
    Ok(())
}

/// Start the authorization-code flow
///
/// **Endpoint:** `GET /login/{provider}`
pub async fn authorize(
    State(state): State<AppState>,
    ApiPath(provider): ApiPath<String>,
) -> ApiResult<AuthorizationUrlResponse> {
    let provider = parse_provider(&provider)?;
    ok(oauth_service(&state)?.authorization_url(provider)?)
}

/// Provider redirect target of the authorization-code flow
///
/// **Endpoint:** `GET /login/{provider}/callback?code=..&state=..`
pub async fn oauth_callback(
    State(state): State<AppState>,
    ApiPath(provider): ApiPath<String>,
    ClientIp(ip): ClientIp,
    ApiQuery(query): ApiQuery<OAuthCallbackQuery>,
) -> ApiResult<SessionResponse> {
    let provider = parse_provider(&provider)?;

    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_else(|| error.clone());
        return Err(OAuthError::Denied(format!("{} - {}", error, description)).into());
    }
    let code = query
        .code
        .ok_or_else(|| AppError::Validation("Missing authorization code".to_string()))?;
    let csrf_state = query
        .state
        .ok_or_else(|| AppError::Validation("Missing state".to_string()))?;

    let (profile, access_token) = oauth_service(&state)?
        .complete_authorization(provider, &code, &csrf_state)
        .await?;

    let session = state
        .identity
        .resolve_oauth_identity(provider, profile, Some(access_token), ip)
        .await?;
    ok(session)
}

/// Client-driven login with a profile the client obtained itself
///
/// **Endpoint:** `POST /login/{provider}/proxy`
pub async fn proxy_login(
    State(state): State<AppState>,
    ApiPath(provider): ApiPath<String>,
    ClientIp(ip): ClientIp,
    ApiJson(request): ApiJson<ProxyLoginRequest>,
) -> ApiResult<SessionResponse> {
    let provider = parse_provider(&provider)?;

    let session = state
        .identity
        .resolve_oauth_identity(provider, request.profile, Some(request.access_token), ip)
        .await?;
    ok(session)
}

/// Login with a Google id token
///
/// **Endpoint:** `GET /login/google/id-token?id_token=..`
pub async fn google_id_token_login(
    State(state): State<AppState>,
    ApiPath(provider): ApiPath<String>,
    ClientIp(ip): ClientIp,
    ApiQuery(query): ApiQuery<GoogleIdTokenQuery>,
) -> ApiResult<SessionResponse> {
    let provider = parse_provider(&provider)?;
    require(provider, OAuthProvider::Google)?;

    let profile = oauth_service(&state)?
        .verify_google_id_token(&query.id_token)
        .await?;

    let session = state
        .identity
        .resolve_oauth_identity(provider, profile, Some(query.id_token), ip)
        .await?;
    ok(session)
}

/// Login with an Apple identity token
///
/// **Endpoint:** `POST /login/apple`
pub async fn id_token_login(
    State(state): State<AppState>,
    ApiPath(provider): ApiPath<String>,
    ClientIp(ip): ClientIp,
    ApiJson(request): ApiJson<AppleLoginRequest>,
) -> ApiResult<SessionResponse> {
    let provider = parse_provider(&provider)?;
    require(provider, OAuthProvider::Apple)?;

    let profile = oauth_service(&state)?.decode_apple_id_token(&request.id_token, request.name)?;

    let session = state
        .identity
        .resolve_oauth_identity(provider, profile, request.access_token, ip)
        .await?;
    ok(session)
}
