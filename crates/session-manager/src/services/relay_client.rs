//! Relay server HTTP client.
//!
//! Probes a relay's live session statistics and registers participants.
//! Relays are addressed by base URL since each call targets a different
//! fleet member. Requests carry a short-lived SYSTEM bearer token.

use crate::auth::TokenIssuer;
use crate::errors::SmError;
use crate::models::{RelaySession, RelayStatistics};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Timeout for relay requests.
const RELAY_REQUEST_TIMEOUT_SECS: u64 = 1;

/// Capability abstraction over relay servers.
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Probe a relay's live session statistics.
    async fn get_statistics(&self, base_url: &str) -> Result<RelayStatistics, SmError>;

    /// Ensure the relay expects the given participant on the given session.
    async fn register(&self, base_url: &str, session: &RelaySession) -> Result<(), SmError>;
}

/// HTTP implementation of [`RelayClient`].
#[derive(Clone)]
pub struct HttpRelayClient {
    client: Client,
    issuer: TokenIssuer,
}

impl HttpRelayClient {
    /// Create a new relay client.
    ///
    /// # Errors
    ///
    /// Returns `SmError::Internal` if the HTTP client cannot be built.
    pub fn new(issuer: TokenIssuer) -> Result<Self, SmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(RELAY_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "sm.services.relay_client", error = %e, "Failed to build HTTP client");
                SmError::Internal("failed to build relay HTTP client".to_string())
            })?;

        Ok(Self { client, issuer })
    }
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    #[instrument(skip(self), name = "sm.relay.get_statistics")]
    async fn get_statistics(&self, base_url: &str) -> Result<RelayStatistics, SmError> {
        let url = format!("{}/v1/sessions/statistics", base_url);
        let token = self.issuer.issue_system_token()?;

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| {
                warn!(target: "sm.services.relay_client", url = %url, error = %e, "Statistics probe failed");
                SmError::BadGateway("relay server is unavailable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target: "sm.services.relay_client", url = %url, status = %status, "Relay returned error");
            return Err(SmError::BadGateway(format!(
                "relay server returned status {}",
                status
            )));
        }

        response.json().await.map_err(|e| {
            error!(target: "sm.services.relay_client", error = %e, "Failed to parse relay statistics");
            SmError::BadGateway("invalid response from relay server".to_string())
        })
    }

    #[instrument(skip(self, session), name = "sm.relay.register", fields(session_key = %session.key))]
    async fn register(&self, base_url: &str, session: &RelaySession) -> Result<(), SmError> {
        let url = format!("{}/v1/sessions", base_url);
        let token = self.issuer.issue_system_token()?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .json(session)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "sm.services.relay_client", url = %url, error = %e, "Registration failed");
                SmError::BadGateway("relay server is unavailable".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(target: "sm.services.relay_client", url = %url, status = %status, "Relay rejected registration");
            return Err(SmError::BadGateway(format!(
                "relay server returned status {}",
                status
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client() -> HttpRelayClient {
        let issuer = TokenIssuer::new("session-manager-test".to_string(), "very-secret-secret");
        HttpRelayClient::new(issuer).unwrap()
    }

    #[tokio::test]
    async fn test_get_statistics_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/sessions/statistics"))
            .and(header_exists("Authorization"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"started": 150, "ended": 50})),
            )
            .mount(&mock_server)
            .await;

        let stats = test_client().get_statistics(&mock_server.uri()).await.unwrap();

        assert_eq!(stats.started, 150);
        assert_eq!(stats.ended, 50);
        assert_eq!(stats.in_progress(), 100);
    }

    #[tokio::test]
    async fn test_get_statistics_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/sessions/statistics"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let result = test_client().get_statistics(&mock_server.uri()).await;

        assert!(matches!(result, Err(SmError::BadGateway(_))));
    }

    #[tokio::test]
    async fn test_get_statistics_unreachable() {
        let result = test_client().get_statistics("http://127.0.0.1:1").await;
        assert!(matches!(result, Err(SmError::BadGateway(_))));
    }

    #[tokio::test]
    async fn test_register_success() {
        let mock_server = MockServer::start().await;

        let session = RelaySession {
            user_id: "user-1".to_string(),
            key: "session-1".to_string(),
        };

        Mock::given(method("POST"))
            .and(path("/v1/sessions"))
            .and(body_json(
                serde_json::json!({"userId": "user-1", "key": "session-1"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "OK"})))
            .mount(&mock_server)
            .await;

        let result = test_client().register(&mock_server.uri(), &session).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_register_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/sessions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let session = RelaySession {
            user_id: "user-1".to_string(),
            key: "session-1".to_string(),
        };

        let result = test_client().register(&mock_server.uri(), &session).await;
        assert!(matches!(result, Err(SmError::BadGateway(_))));
    }
}
