//! Session manager library.
//!
//! Mediates establishment of real-time peer-to-peer communication:
//! binds sessions to the least-loaded relay server, admits participants,
//! issues relay credentials and ICE candidates, and fans signaling
//! messages out between the participants of each active session.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
