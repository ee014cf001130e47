//! HTTP Request Handlers
//!
//! Axum handlers for health, registration, local sign-in, account
//! management and password reset.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::ORIGIN, HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use super::middleware::{ApiJson, ApiPath, ApiQuery, AuthUser, ClientIp};
use crate::{
    database::AccountStore,
    models::{requests::*, Account},
    service::{AccountService, IdentityService, OAuthService, PasswordResetService},
    utils::error::{AppError, AppResult},
    utils::validation::describe_validation_errors,
    VERSION,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityService>,
    pub accounts: Arc<AccountService>,
    pub resets: Arc<PasswordResetService>,
    /// Absent when no provider client could be built
    pub oauth: Option<Arc<OAuthService>>,
    /// Used by the health check
    pub store: Arc<dyn AccountStore>,
}

/// Standard success response wrapper
#[derive(serde::Serialize)]
pub struct SuccessResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

pub type ApiResult<T> = AppResult<Json<SuccessResponse<T>>>;

pub(crate) fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(SuccessResponse::new(data)))
}

/// Handle validation errors from request parsing
pub fn handle_validation_error(err: validator::ValidationErrors) -> AppError {
    AppError::Validation(describe_validation_errors(&err))
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> ApiResult<HealthCheckResponse> {
    state.store.ping().await.map_err(|e| {
        AppError::Internal(format!("Store health check failed: {}", e))
    })?;

    ok(HealthCheckResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: VERSION.to_string(),
    })
}

/// Register a local account
pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<SuccessResponse<RegisterResponse>>)> {
    let account = state.identity.register_local(request, ip).await?;

    let response = RegisterResponse {
        id: account.id,
        email: account.email,
        message: "Account created.".to_string(),
    };
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(response))))
}

/// Sign in with email and password
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<SessionResponse> {
    request.validate().map_err(handle_validation_error)?;

    let session = state
        .identity
        .authenticate_local(&request.email, &request.password, ip)
        .await?;
    ok(session)
}

/// Sessions are stateless; the client discards its token
pub async fn logout() -> ApiResult<MessageResponse> {
    ok(MessageResponse::new("Logged out."))
}

/// Account of the bearer token
pub async fn current_account(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> ApiResult<AccountResponse> {
    ok(state.identity.current_account(&session).await?)
}

/// Paginated account listing (administrators)
pub async fn list_accounts(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    ApiQuery(query): ApiQuery<ListAccountsQuery>,
) -> ApiResult<Page<Account>> {
    ok(state.accounts.list_accounts(&session, query).await?)
}

/// Get account by ID
pub async fn get_account(
    State(state): State<AppState>,
    AuthUser(_session): AuthUser,
    ApiPath(account_id): ApiPath<Uuid>,
) -> ApiResult<AccountResponse> {
    ok(state.accounts.get_account(account_id).await?)
}

/// Update account fields
pub async fn update_account(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    ClientIp(ip): ClientIp,
    ApiPath(account_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateAccountRequest>,
) -> ApiResult<Account> {
    let account = state
        .accounts
        .update_account(&session, account_id, request, ip)
        .await?;
    ok(account)
}

/// Remove an account (administrators)
pub async fn remove_account(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    ApiPath(account_id): ApiPath<Uuid>,
) -> ApiResult<MessageResponse> {
    state.accounts.remove_account(&session, account_id).await?;
    ok(MessageResponse::new("Account removed."))
}

/// Patients linked to a practitioner's matricule
pub async fn patients_by_linkage_code(
    State(state): State<AppState>,
    AuthUser(_session): AuthUser,
    ApiQuery(query): ApiQuery<LinkageQuery>,
) -> ApiResult<Vec<Account>> {
    ok(state
        .accounts
        .patients_by_linkage_code(query.matricule.as_deref())
        .await?)
}

/// Practitioners owning a matricule
pub async fn practitioners_by_linkage_code(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LinkageQuery>,
) -> ApiResult<Vec<Account>> {
    ok(state
        .accounts
        .practitioners_by_linkage_code(query.matricule.as_deref())
        .await?)
}

/// Mail a password reset link
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<ForgotPasswordRequest>,
) -> ApiResult<ResetRequestedResponse> {
    request.validate().map_err(handle_validation_error)?;

    let origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok());
    let handle = state
        .resets
        .request_password_reset(&request.email, origin)
        .await?;

    ok(ResetRequestedResponse {
        account_id: handle.account_id,
        expires_at: handle.expires_at,
        message: "A password reset link has been sent.".to_string(),
    })
}

/// Redeem a reset token
pub async fn store_password(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<StorePasswordRequest>,
) -> ApiResult<MessageResponse> {
    state
        .resets
        .reset_password(request.account_id, &request.token, &request.password)
        .await?;
    ok(MessageResponse::new("Your password has been updated."))
}

/// Application state wired to a test harness
#[cfg(test)]
pub(crate) fn state_for(h: &crate::service::testing::Harness) -> AppState {
    use crate::config::{OAuthConfig, ProviderCredentials};

    let oauth_config = OAuthConfig {
        facebook: Some(ProviderCredentials {
            client_id: "fb-client".into(),
            client_secret: "fb-secret".into(),
            redirect_uri: "http://localhost:8080/login/facebook/callback".into(),
        }),
        google: None,
        google_id_token_audiences: Vec::new(),
        apple_client_id: None,
        request_timeout_seconds: 5,
    };

    AppState {
        identity: Arc::new(h.identity.clone()),
        accounts: Arc::new(h.accounts.clone()),
        resets: Arc::new(h.resets.clone()),
        oauth: Some(Arc::new(
            OAuthService::new(&oauth_config, h.jwt.clone()).unwrap(),
        )),
        store: h.store.clone(),
    }
}
