//! Observability for the session manager.

pub mod metrics;
