//! Account Service Library
//!
//! Identity and account management for a speech-therapy platform:
//! practitioners and their patients sign up with email and password or
//! through Facebook, Google or Apple, and receive a signed session token.
//!
//! # Features
//!
//! - **Local accounts**: registration and sign-in with bcrypt password hashes
//! - **Identity providers**: authorization-code, client-proxied and id-token
//!   logins that converge on a single account per person
//! - **Practitioner linkage**: patients reference a practitioner through the
//!   practitioner's matricule
//! - **Password reset**: single-use, expiring, hashed reset tokens mailed
//!   to the account owner
//! - **Enrichment**: best-effort geolocation, derived settings and
//!   subscription summaries attached to sessions
//! - **Flexible Router**: route groups toggled through [`RouterBuilder`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use account_service::{
//!     api::{AppState, RouterBuilder},
//!     config::AppConfig,
//!     database::PgStore,
//!     service::{
//!         AccountService, Collaborators, DisabledLocator, DisabledMailer, IdentityService,
//!         JwtService, PasswordResetService,
//!     },
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let pool = config.database.create_pool().await?;
//!     let store = Arc::new(PgStore::new(pool, config.database.query_timeout));
//!     let jwt = Arc::new(JwtService::new(config.jwt.secret.clone()));
//!
//!     let collaborators = Collaborators::with_store(
//!         store.clone(),
//!         Arc::new(DisabledLocator),
//!         Arc::new(DisabledMailer),
//!         jwt,
//!     );
//!
//!     let state = AppState {
//!         identity: Arc::new(IdentityService::new(&collaborators, config.policy.clone())),
//!         accounts: Arc::new(AccountService::new(&collaborators)),
//!         resets: Arc::new(PasswordResetService::new(
//!             &collaborators,
//!             config.reset.clone(),
//!             config.policy.bcrypt_cost,
//!         )),
//!         oauth: None,
//!         store,
//!     };
//!
//!     // Registration and sign-in only
//!     let app = RouterBuilder::new()
//!         .health_check(true)
//!         .local_auth(true)
//!         .build(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **API Layer**: HTTP handlers, session middleware and route groups
//! - **Service Layer**: identity resolution, account management, reset flow
//! - **Models**: accounts, provider profiles, claims and payloads
//! - **Database**: narrow store traits with PostgreSQL and in-memory backends
//! - **Utils**: hashing, normalization, validation and error mapping

/// HTTP API layer with handlers and configurable routing
pub mod api;

/// Configuration management for all service settings
pub mod config;

/// Store traits and their implementations
pub mod database;

/// Data models and request/response structures
pub mod models;

/// Identity, account and password reset services
pub mod service;

/// Shared utilities for security, validation, and error handling
pub mod utils;

// Re-export commonly used types for convenient access
pub use api::{create_routes, AppState, RouterBuilder};
pub use models::{
    Account, AccountResponse, OAuthProfile, OAuthProvider, RegisterRequest, Role,
    SessionResponse, UpdateAccountRequest,
};
pub use service::{
    AccountService, Collaborators, IdentityError, IdentityService, JwtService, OAuthService,
    PasswordResetService,
};
pub use utils::error::{AppError, AppResult, ErrorResponse};

// Re-export database utilities for configuration
pub use database::{DatabaseConfig, DatabasePool, MemoryStore, PgStore};

// Re-export configuration system
pub use config::{env, AppConfig, EmailConfig, JwtConfig, OAuthConfig, ServerConfig};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
