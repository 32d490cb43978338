//! HTTP request handlers for the session manager.

pub mod health;
pub mod messages;
pub mod metrics;
pub mod sessions;

pub use health::{health_check, readiness_check};
pub use messages::{send_text_message, signal_message};
pub use metrics::metrics_handler;
pub use sessions::{create_session, join_session};
