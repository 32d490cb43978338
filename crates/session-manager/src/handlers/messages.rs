//! Message handlers.
//!
//! Implements the message endpoints, protected by bearer tokens with the
//! USER role:
//!
//! - `POST /v1/sessions/{id}/messages/text` - Fan a text message out to
//!   the session's channel
//! - `POST /v1/sessions/{id}/messages/signal` - Reserved

use crate::auth::Claims;
use crate::errors::SmError;
use crate::models::{Message, MESSAGE_TYPE_TEXT};
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

/// Request body for text messages. The body is forwarded opaquely.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Handler for POST /v1/sessions/{id}/messages/text
///
/// Sends a text message to every other participant connected to the
/// session's channel. The sender is taken from the bearer token subject
/// and does not receive its own message.
///
/// # Response
///
/// - 200 OK: Message fanned out
/// - 401 Unauthorized / 403 Forbidden: Token missing, invalid or lacks USER
/// - 428 Precondition Required: No live channel for the session
#[instrument(
    skip_all,
    name = "sm.handler.send_text_message",
    fields(method = "POST", endpoint = "/v1/sessions/{id}/messages/text", session_id = %session_id)
)]
pub async fn send_text_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<SendMessageRequest>,
) -> Result<StatusCode, SmError> {
    let message = Message {
        message_type: MESSAGE_TYPE_TEXT.to_string(),
        sender_id: claims.sub,
        session_id,
        body: request.body,
    };

    state.hub.send(&message).await?;

    Ok(StatusCode::OK)
}

/// Handler for POST /v1/sessions/{id}/messages/signal
///
/// Reserved signaling passthrough.
#[instrument(
    skip_all,
    name = "sm.handler.signal_message",
    fields(method = "POST", endpoint = "/v1/sessions/{id}/messages/signal")
)]
pub async fn signal_message() -> Result<StatusCode, SmError> {
    Err(SmError::NotImplemented)
}
