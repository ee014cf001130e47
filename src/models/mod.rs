//! Data Models Module
//!
//! Account entities, provider identities, session claims, reset requests
//! and request/response payloads.

pub mod account;
pub mod auth;
pub mod oauth;
pub mod password_reset;
pub mod requests;
pub mod subscription;

// Re-export commonly used types
pub use account::*;
pub use auth::*;
pub use oauth::{OAuthProfile, OAuthProvider};
pub use password_reset::*;
pub use requests::*;
pub use subscription::*;
