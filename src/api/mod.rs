//! API Layer
//!
//! HTTP endpoints for the account service.

pub mod handlers;
pub mod middleware;
pub mod oauth_handlers;
pub mod routes;

// Re-export commonly used types
pub use handlers::{AppState, SuccessResponse};
pub use middleware::{
    bearer_token, session_middleware, ApiJson, ApiPath, ApiQuery, AuthUser, ClientIp,
};
pub use routes::{create_routes, RouterBuilder};
