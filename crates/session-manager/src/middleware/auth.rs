//! Authentication middleware for bearer-protected routes.
//!
//! Extracts the Bearer token from the Authorization header, validates it
//! and requires the USER role before the handler runs. Validated claims
//! are injected into request extensions for downstream handlers.

use crate::auth::{TokenVerifier, ROLE_USER};
use crate::errors::SmError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<TokenVerifier>,
}

/// Extract the Bearer token from the Authorization header.
fn extract_bearer_token(req: &Request) -> Result<&str, SmError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "sm.middleware.auth", "Missing Authorization header");
            SmError::Unauthorized("Missing Authorization header".to_string())
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "sm.middleware.auth", "Invalid Authorization header format");
        SmError::Unauthorized("Invalid Authorization header format".to_string())
    })
}

/// Authentication middleware requiring the USER role.
///
/// # Response
///
/// - 401 Unauthorized if the token is missing or invalid
/// - 403 Forbidden if the token lacks the USER role
/// - Continues to the handler with `Claims` in extensions otherwise
#[instrument(skip_all, name = "sm.middleware.auth")]
pub async fn require_user_role(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, SmError> {
    let token = extract_bearer_token(&req)?;

    let claims = state.verifier.verify(token)?;

    if !claims.has_role(ROLE_USER) {
        tracing::debug!(target: "sm.middleware.auth", roles = ?claims.roles, "Token lacks required role");
        return Err(SmError::Forbidden(format!(
            "role {} is required",
            ROLE_USER
        )));
    }

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
