//! Utilities Module
//!
//! Shared utilities for error handling, security, validation and client
//! network addresses used throughout the account service.

pub mod error;
pub mod network;
pub mod security;
pub mod validation;

// Re-export commonly used utilities
pub use error::{AppError, AppResult, ErrorResponse};
pub use network::is_local_ip;
pub use security::*;
pub use validation::*;
