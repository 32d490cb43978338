//! Session handlers.
//!
//! Implements the session endpoints:
//!
//! - `POST /v1/sessions` - Create a session (client credentials)
//! - `GET /v1/sessions/{id}` - Join a session; upgrades to a websocket
//!   and delivers the OFFER frame over the new channel
//!
//! # Security
//!
//! Both endpoints require client credentials. Join accepts them as
//! headers or as query parameters because browsers cannot set custom
//! headers on websocket upgrade requests. The credentials gate admission
//! only; they are not bound to an identity.

use crate::errors::SmError;
use crate::models::{Credentials, Message, Reference, MESSAGE_TYPE_OFFER};
use crate::routes::AppState;
use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Header carrying the client id.
pub const CLIENT_ID_HEADER: &str = "X-Client-ID";

/// Header carrying the client secret.
pub const CLIENT_SECRET_HEADER: &str = "X-Client-Secret";

/// Query parameter fallbacks for websocket upgrades.
const CLIENT_ID_QUERY: &str = "client-id";
const CLIENT_SECRET_QUERY: &str = "client-secret";

/// Handler for POST /v1/sessions
///
/// Creates a session bound to the least-loaded healthy relay.
///
/// # Response
///
/// - 200 OK: `{id, system}` reference to the created session
/// - 401 Unauthorized: Missing client credentials
/// - 500 Internal Server Error: No relay candidates
/// - 502 Bad Gateway: Registry unavailable
#[instrument(
    skip_all,
    name = "sm.handler.create_session",
    fields(method = "POST", endpoint = "/v1/sessions")
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Reference>, SmError> {
    let creds = extract_credentials(&headers, &HashMap::new())?;

    let reference = state.session_service.create(&creds).await?;

    Ok(Json(reference))
}

/// Handler for GET /v1/sessions/{id}
///
/// Joins a session: registers the participant with the session's relay,
/// persists the membership, upgrades the connection to a websocket bound
/// to the session's channel, and delivers the session offer as the first
/// TEXT frame. A duplicate (session, user) connection is closed right
/// after the upgrade; the original client stays connected.
///
/// # Response
///
/// - 101 Switching Protocols, then an OFFER frame
/// - 401 Unauthorized: Missing client credentials
/// - 428 Precondition Required: The session does not exist
/// - 502 Bad Gateway: Registry or relay unavailable
#[instrument(
    skip_all,
    name = "sm.handler.join_session",
    fields(method = "GET", endpoint = "/v1/sessions/{id}", session_id = %session_id)
)]
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, SmError> {
    let creds = extract_credentials(&headers, &query)?;

    let (offer, participant) = state.session_service.join(&session_id, &creds).await?;

    let offer_message = Message {
        message_type: MESSAGE_TYPE_OFFER.to_string(),
        sender_id: String::new(),
        session_id,
        body: serde_json::to_value(&offer)
            .map_err(|e| SmError::Internal(format!("failed to serialize offer: {}", e)))?,
    };

    let hub = Arc::clone(&state.hub);
    Ok(ws.on_upgrade(move |socket| async move {
        // The channel join happens on the upgraded transport; a Conflict
        // closes the socket inside connect.
        if hub
            .connect(socket, &participant.session_id, &participant.user_id)
            .await
            .is_err()
        {
            return;
        }

        // An empty sender reaches every client in the channel, including
        // the one that just joined; its writer task drains the queue.
        if let Err(e) = hub.send(&offer_message).await {
            tracing::warn!(
                target: "sm.handlers.sessions",
                error = %e,
                "Failed to deliver session offer"
            );
        }
    }))
}

/// Extract client credentials from headers, falling back to query
/// parameters for browser websocket upgrades.
pub fn extract_credentials(
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<Credentials, SmError> {
    let client_id = header_value(headers, CLIENT_ID_HEADER)
        .or_else(|| query.get(CLIENT_ID_QUERY).cloned())
        .unwrap_or_default();
    let client_secret = header_value(headers, CLIENT_SECRET_HEADER)
        .or_else(|| query.get(CLIENT_SECRET_QUERY).cloned())
        .unwrap_or_default();

    if client_id.is_empty() || client_secret.is_empty() {
        return Err(SmError::Unauthorized(
            "clientId or clientSecret is missing".to_string(),
        ));
    }

    Ok(Credentials {
        client_id,
        client_secret,
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::try_from(*name).unwrap(),
                value.parse().unwrap(),
            );
        }
        headers
    }

    #[test]
    fn test_extract_credentials_from_headers() {
        let headers = headers(&[
            (CLIENT_ID_HEADER, "client-1"),
            (CLIENT_SECRET_HEADER, "secret-1"),
        ]);

        let creds = extract_credentials(&headers, &HashMap::new()).unwrap();
        assert_eq!(creds.client_id, "client-1");
        assert_eq!(creds.client_secret, "secret-1");
    }

    #[test]
    fn test_extract_credentials_from_query() {
        let query = HashMap::from([
            ("client-id".to_string(), "client-1".to_string()),
            ("client-secret".to_string(), "secret-1".to_string()),
        ]);

        let creds = extract_credentials(&HeaderMap::new(), &query).unwrap();
        assert_eq!(creds.client_id, "client-1");
        assert_eq!(creds.client_secret, "secret-1");
    }

    #[test]
    fn test_extract_credentials_headers_win_over_query() {
        let headers = headers(&[
            (CLIENT_ID_HEADER, "header-client"),
            (CLIENT_SECRET_HEADER, "header-secret"),
        ]);
        let query = HashMap::from([
            ("client-id".to_string(), "query-client".to_string()),
            ("client-secret".to_string(), "query-secret".to_string()),
        ]);

        let creds = extract_credentials(&headers, &query).unwrap();
        assert_eq!(creds.client_id, "header-client");
    }

    #[test]
    fn test_extract_credentials_missing_is_unauthorized() {
        let result = extract_credentials(&HeaderMap::new(), &HashMap::new());
        assert!(matches!(result, Err(SmError::Unauthorized(_))));
    }

    #[test]
    fn test_extract_credentials_empty_value_is_unauthorized() {
        let headers = headers(&[(CLIENT_ID_HEADER, "client-1"), (CLIENT_SECRET_HEADER, "")]);

        let result = extract_credentials(&headers, &HashMap::new());
        assert!(matches!(result, Err(SmError::Unauthorized(_))));
    }

    #[test]
    fn test_extract_credentials_partial_query_is_unauthorized() {
        let query = HashMap::from([("client-id".to_string(), "client-1".to_string())]);

        let result = extract_credentials(&HeaderMap::new(), &query);
        assert!(matches!(result, Err(SmError::Unauthorized(_))));
    }
}
