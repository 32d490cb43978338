//! HTTP routes for the session manager.
//!
//! Defines the Axum router and application state.

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::handlers;
use crate::hub::SignalingHub;
use crate::middleware::{http_metrics_middleware, require_user_role, AuthState};
use crate::services::SessionService;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,

    /// Service configuration.
    pub config: Config,

    /// Session orchestration service.
    pub session_service: Arc<SessionService>,

    /// Signaling hub owning all live channels.
    pub hub: Arc<SignalingHub>,

    /// Verifier for inbound bearer tokens.
    pub verifier: Arc<TokenVerifier>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe (simple "OK") - public
/// - `/ready` - Readiness probe (checks DB) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `POST /v1/sessions` - Create session (client credentials checked in handler)
/// - `GET /v1/sessions/{id}` - Join session, upgrades to websocket
/// - `POST /v1/sessions/{id}/messages/text` - Text fan-out (bearer, USER role)
/// - `POST /v1/sessions/{id}/messages/signal` - Reserved (bearer, USER role)
/// - TraceLayer for request logging
/// - HTTP metrics middleware (outermost)
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        verifier: state.verifier.clone(),
    });

    // Session endpoints authenticate via client credential headers inside
    // the handlers, not via bearer middleware.
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/v1/sessions", post(handlers::create_session))
        .route("/v1/sessions/:session_id", get(handlers::join_session))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Message endpoints require a bearer token with the USER role
    let protected_routes = Router::new()
        .route(
            "/v1/sessions/:session_id/messages/text",
            post(handlers::send_text_message),
        )
        .route(
            "/v1/sessions/:session_id/messages/signal",
            post(handlers::signal_message),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_user_role))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
