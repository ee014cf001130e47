//! Account Service Server
//!
//! Runs the HTTP API with every route group enabled. Collaborators that are
//! not configured (SMTP, geolocation, identity providers) are replaced by
//! disabled implementations so the rest of the service keeps working.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use dotenv::dotenv;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use account_service::{
    api::{AppState, RouterBuilder},
    config::{AppConfig, ServerConfig},
    database::PgStore,
    service::{
        AccountService, Collaborators, DisabledLocator, DisabledMailer, EmailService, GeoLocator,
        IdentityService, IpApiLocator, JwtService, Mailer, OAuthService, PasswordResetService,
    },
};

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if server.cors_origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv().ok();
    env_logger::init();

    log::info!("Starting account service v{}", account_service::VERSION);

    let config = AppConfig::from_env()?;
    config.validate()?;
    log::info!("Configuration loaded and validated");

    let pool = config.database.create_pool().await?;
    log::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    let store = Arc::new(PgStore::new(pool, config.database.query_timeout));

    let geo: Arc<dyn GeoLocator> = if config.geo.enabled {
        Arc::new(IpApiLocator::new(
            config.geo.endpoint.clone(),
            std::time::Duration::from_secs(config.geo.timeout_seconds),
        )?)
    } else {
        log::warn!("Geolocation disabled");
        Arc::new(DisabledLocator)
    };

    let mailer: Arc<dyn Mailer> = match config.email.clone() {
        Some(email_config) => Arc::new(EmailService::new(email_config, config.reset.ttl_hours)?),
        None => {
            log::warn!("SMTP not configured; password reset mail is unavailable");
            Arc::new(DisabledMailer)
        }
    };

    let jwt = Arc::new(JwtService::with_expiration(
        config.jwt.secret.clone(),
        chrono::Duration::hours(config.jwt.session_expires_hours),
    ));

    let collaborators = Collaborators::with_store(store.clone(), geo, mailer, jwt.clone());

    let oauth = match OAuthService::new(&config.oauth, jwt) {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            log::warn!("Identity provider login disabled: {}", e);
            None
        }
    };

    let state = AppState {
        identity: Arc::new(IdentityService::new(&collaborators, config.policy.clone())),
        accounts: Arc::new(AccountService::new(&collaborators)),
        resets: Arc::new(PasswordResetService::new(
            &collaborators,
            config.reset.clone(),
            config.policy.bcrypt_cost,
        )),
        oauth,
        store,
    };

    let app = RouterBuilder::with_all_routes().build(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.server))
            .into_inner(),
    );

    let bind_addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("Listening on {}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
