//! API Route Definitions
//!
//! Routes are grouped by feature and assembled by [`RouterBuilder`], so a
//! deployment can expose only the groups it needs.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use super::handlers::*;
use super::middleware::session_middleware;
use super::oauth_handlers::*;

/// Builder for creating API routes with configurable feature groups
#[derive(Default)]
pub struct RouterBuilder {
    /// GET /health
    health_check: bool,
    /// POST /user, POST /user/login, POST /user/logout
    local_auth: bool,
    /// /user/me, /user, /user/{id}, linkage-code lookups
    accounts: bool,
    /// POST /user/forgot, POST /user/store-password
    password_reset: bool,
    /// /login/{provider}/...
    oauth: bool,
}

impl RouterBuilder {
    /// Creates a new router builder with all groups disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router builder with every group enabled
    pub fn with_all_routes() -> Self {
        Self {
            health_check: true,
            local_auth: true,
            accounts: true,
            password_reset: true,
            oauth: true,
        }
    }

    /// Creates a router with only the health check, for monitoring
    pub fn with_minimal_routes() -> Self {
        Self {
            health_check: true,
            ..Self::default()
        }
    }

    pub fn health_check(mut self, enabled: bool) -> Self {
        self.health_check = enabled;
        self
    }

    /// Registration and email/password sign-in
    pub fn local_auth(mut self, enabled: bool) -> Self {
        self.local_auth = enabled;
        self
    }

    /// Account reads, updates, removal and linkage-code lookups
    pub fn accounts(mut self, enabled: bool) -> Self {
        self.accounts = enabled;
        self
    }

    pub fn password_reset(mut self, enabled: bool) -> Self {
        self.password_reset = enabled;
        self
    }

    /// Facebook, Google and Apple sign-in
    pub fn oauth(mut self, enabled: bool) -> Self {
        self.oauth = enabled;
        self
    }

    /// Builds the router with the enabled groups and the session middleware
    pub fn build(self, state: AppState) -> Router {
        let mut router = Router::new();

        if self.health_check {
            router = router.route("/health", get(health_check));
        }

        // GET /user (listing) shares its path with POST /user (registration)
        let user_root = match (self.local_auth, self.accounts) {
            (true, true) => Some(post(register).get(list_accounts)),
            (true, false) => Some(post(register)),
            (false, true) => Some(get(list_accounts)),
            (false, false) => None,
        };
        if let Some(method_router) = user_root {
            router = router.route("/user", method_router);
        }

        if self.local_auth {
            router = router
                .route("/user/login", post(login))
                .route("/user/logout", post(logout));
        }

        if self.accounts {
            router = router
                .route("/user/me", get(current_account))
                .route("/user/patients", get(patients_by_linkage_code))
                .route("/user/practitioners", get(practitioners_by_linkage_code))
                .route(
                    "/user/{id}",
                    get(get_account).put(update_account).delete(remove_account),
                );
        }

        if self.password_reset {
            router = router
                .route("/user/forgot", post(forgot_password))
                .route("/user/store-password", post(store_password));
        }

        if self.oauth {
            router = router
                .route("/login/{provider}", get(authorize).post(id_token_login))
                .route("/login/{provider}/callback", get(oauth_callback))
                .route("/login/{provider}/proxy", post(proxy_login))
                .route("/login/{provider}/id-token", get(google_id_token_login));
        }

        router
            .layer(from_fn_with_state(state.clone(), session_middleware))
            .with_state(state)
    }
}

/// Creates a router with every route enabled
pub fn create_routes(state: AppState) -> Router {
    RouterBuilder::with_all_routes().build(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use crate::database::AccountStore;
    use crate::service::testing::{Harness, ALLOWED_ORIGIN};

    fn app(h: &Harness) -> Router {
        create_routes(state_for(h))
    }

    fn json_request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        builder.body(body).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(h: &Harness, email: &str, role: &str, code: Option<&str>) -> Value {
        let response = app(h)
            .oneshot(json_request(
                Method::POST,
                "/user",
                None,
                Some(json!({
                    "email": email,
                    "password": "password123",
                    "name": "Test",
                    "profession": role,
                    "matricule": code
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    async fn login(h: &Harness, email: &str) -> String {
        let response = app(h)
            .oneshot(json_request(
                Method::POST,
                "/user/login",
                None,
                Some(json!({ "email": email, "password": "password123" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        body["data"]["auth_token"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_router_builder_presets() {
        let builder = RouterBuilder::new();
        assert!(!builder.health_check);
        assert!(!builder.accounts);

        let builder = RouterBuilder::with_all_routes();
        assert!(builder.health_check && builder.local_auth && builder.accounts);
        assert!(builder.password_reset && builder.oauth);

        let builder = RouterBuilder::with_minimal_routes().oauth(true);
        assert!(builder.health_check && builder.oauth);
        assert!(!builder.local_auth);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let h = Harness::new();
        let response = app(&h)
            .oneshot(json_request(Method::GET, "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_disabled_groups_are_not_routed() {
        let h = Harness::new();
        let router = RouterBuilder::with_minimal_routes().build(state_for(&h));

        let response = router
            .oneshot(json_request(
                Method::POST,
                "/user/login",
                None,
                Some(json!({ "email": "a@x.com", "password": "password123" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_register_login_and_me() {
        let h = Harness::new();
        let created = register(&h, "A@x.com", "patient", None).await;
        assert_eq!(created["data"]["email"], "a@x.com");

        let token = login(&h, "a@x.com").await;
        let response = app(&h)
            .oneshot(json_request(Method::GET, "/user/me", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["data"]["email"], "a@x.com");
        assert_eq!(body["data"]["profession"], "patient");
        assert!(body["data"].get("password_hash").is_none());

        let response = app(&h)
            .oneshot(json_request(Method::GET, "/user/me", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_error_payload_shape() {
        let h = Harness::new();
        register(&h, "a@x.com", "patient", None).await;

        let response = app(&h)
            .oneshot(json_request(
                Method::POST,
                "/user/login",
                None,
                Some(json!({ "email": "a@x.com", "password": "wrong-password" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body["error"], "AUTHENTICATION_ERROR");
        assert_eq!(body["message"], "Wrong email or password.");
        assert_eq!(body.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_input_uses_error_payload() {
        let h = Harness::new();
        register(&h, "a@x.com", "patient", None).await;
        let token = login(&h, "a@x.com").await;

        let malformed_body = Request::builder()
            .method(Method::POST)
            .uri("/user/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"email\": "))
            .unwrap();
        let missing_field =
            json_request(Method::POST, "/user", None, Some(json!({ "email": "b@x.com" })));
        let bad_id = json_request(Method::GET, "/user/not-a-uuid", Some(&token), None);
        let missing_query = json_request(Method::GET, "/login/google/id-token", None, None);

        for request in [malformed_body, missing_field, bad_id, missing_query] {
            let uri = request.uri().to_string();
            let response = app(&h).oneshot(request).await.unwrap();
            assert!(response.status().is_client_error(), "{}", uri);

            let body = body_json(response).await;
            assert_eq!(body["error"], "VALIDATION_ERROR", "{}", uri);
            assert!(body["message"].is_string(), "{}", uri);
            assert_eq!(body.as_object().unwrap().len(), 2, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let h = Harness::new();
        register(&h, "a@x.com", "patient", None).await;

        let response = app(&h)
            .oneshot(json_request(
                Method::POST,
                "/user",
                None,
                Some(json!({
                    "email": "a@x.com",
                    "password": "password123",
                    "profession": "patient"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_linkage_code_routes() {
        let h = Harness::new();
        register(&h, "o@x.com", "orthophoniste", Some("M1")).await;
        register(&h, "p@x.com", "patient", Some("M1")).await;

        let response = app(&h)
            .oneshot(json_request(
                Method::GET,
                "/user/practitioners?matricule=M1",
                None,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"][0]["email"], "o@x.com");

        let token = login(&h, "o@x.com").await;
        let response = app(&h)
            .oneshot(json_request(
                Method::GET,
                "/user/patients?matricule=M1",
                Some(&token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["email"], "p@x.com");

        let response = app(&h)
            .oneshot(json_request(Method::GET, "/user/patients", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_and_remove_routes() {
        let h = Harness::new();
        let a = register(&h, "a@x.com", "patient", None).await;
        let b = register(&h, "b@x.com", "patient", None).await;
        let a_id = a["data"]["id"].as_str().unwrap().to_string();
        let b_id = b["data"]["id"].as_str().unwrap().to_string();
        let token = login(&h, "a@x.com").await;

        let response = app(&h)
            .oneshot(json_request(
                Method::PUT,
                &format!("/user/{}", a_id),
                Some(&token),
                Some(json!({ "name": "Renamed", "isFirstLogin": false })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["name"], "Renamed");
        assert_eq!(body["data"]["is_first_login"], false);

        let response = app(&h)
            .oneshot(json_request(
                Method::DELETE,
                &format!("/user/{}", b_id),
                Some(&token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(h.store.account_count().await, 2);
    }

    #[tokio::test]
    async fn test_password_reset_routes() {
        let h = Harness::new();
        let created = register(&h, "a@x.com", "patient", None).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/user/forgot")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ORIGIN, ALLOWED_ORIGIN)
            .body(Body::from(json!({ "email": "a@x.com" }).to_string()))
            .unwrap();
        let response = app(&h).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let sent = h.mailer.last_reset().await.unwrap();
        assert_eq!(sent.domain, ALLOWED_ORIGIN);

        let store = |token: &str| {
            json_request(
                Method::POST,
                "/user/store-password",
                None,
                Some(json!({ "userid": id, "token": token, "password": "a-new-password" })),
            )
        };

        let response = app(&h).oneshot(store("wrong")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "TOKEN_MISMATCH");

        let response = app(&h).oneshot(store(&sent.token)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(&h).oneshot(store(&sent.token)).await.unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_mail_failure_is_reported_without_details() {
        let h = Harness::with_failing_mail();
        register(&h, "a@x.com", "patient", None).await;

        let response = app(&h)
            .oneshot(json_request(
                Method::POST,
                "/user/forgot",
                None,
                Some(json!({ "email": "a@x.com" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["error"], "EXTERNAL_SERVICE_ERROR");
        assert!(!body["message"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_proxy_login_creates_account_once() {
        let h = Harness::new();
        let payload = json!({
            "access_token": "fb-token",
            "profile": {
                "id": "fb-1",
                "displayName": "Jane Roe",
                "emails": [{ "value": "jane@example.com" }]
            }
        });

        for _ in 0..2 {
            let response = app(&h)
                .oneshot(json_request(
                    Method::POST,
                    "/login/facebook/proxy",
                    None,
                    Some(payload.clone()),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = body_json(response).await;
            assert_eq!(body["data"]["email"], "jane@example.com");
            assert!(body.to_string().find("fb-token").is_none());
        }
        assert_eq!(h.store.account_count().await, 1);
        assert!(h
            .store
            .find_by_provider_id(crate::models::OAuthProvider::Facebook, "fb-1")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_oauth_routes() {
        let h = Harness::new();

        let response = app(&h)
            .oneshot(json_request(Method::GET, "/login/facebook", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["data"]["authorization_url"]
            .as_str()
            .unwrap()
            .starts_with("https://www.facebook.com/"));

        for uri in ["/login/google", "/login/github"] {
            let response = app(&h)
                .oneshot(json_request(Method::GET, uri, None, None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }

        let response = app(&h)
            .oneshot(json_request(
                Method::GET,
                "/login/facebook/callback?code=abc&state=forged",
                None,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(&h)
            .oneshot(json_request(
                Method::GET,
                "/login/facebook/callback?error=access_denied",
                None,
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
