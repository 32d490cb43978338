//! Repository layer for the session manager.
//!
//! Provides database access following the Handler -> Service -> Repository
//! architecture over a shared `sqlx::PgPool`.

pub mod sessions;

pub use sessions::SessionRepository;
