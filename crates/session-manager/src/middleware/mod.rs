//! Middleware for the session manager HTTP surface.

pub mod auth;
pub mod http_metrics;

pub use auth::{require_user_role, AuthState};
pub use http_metrics::http_metrics_middleware;
