//! Service registry HTTP client.
//!
//! Discovers relay servers by application tag and resolves single relay
//! entries by id. Requests carry a short-lived SYSTEM bearer token.
//!
//! Transport failures and 5xx responses surface as `BadGateway`; a 404 on
//! a single-entry lookup surfaces as `NotFound`.

use crate::auth::TokenIssuer;
use crate::errors::SmError;
use crate::models::Relay;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Timeout for registry requests.
const REGISTRY_REQUEST_TIMEOUT_SECS: u64 = 2;

/// Capability abstraction over the external service registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// List all relays registered under an application tag. When
    /// `only_healthy` is set the registry filters server-side.
    async fn find_by_application(
        &self,
        application: &str,
        only_healthy: bool,
    ) -> Result<Vec<Relay>, SmError>;

    /// Look up a single relay by id.
    async fn find(&self, id: &str) -> Result<Relay, SmError>;
}

/// HTTP implementation of [`RegistryClient`].
#[derive(Clone)]
pub struct HttpRegistryClient {
    client: Client,
    base_url: String,
    issuer: TokenIssuer,
}

impl HttpRegistryClient {
    /// Create a new registry client.
    ///
    /// # Errors
    ///
    /// Returns `SmError::Internal` if the HTTP client cannot be built.
    pub fn new(base_url: String, issuer: TokenIssuer) -> Result<Self, SmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REGISTRY_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "sm.services.registry_client", error = %e, "Failed to build HTTP client");
                SmError::Internal("failed to build registry HTTP client".to_string())
            })?;

        Ok(Self {
            client,
            base_url,
            issuer,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SmError> {
        let token = self.issuer.issue_system_token()?;

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|e| {
                warn!(target: "sm.services.registry_client", url = %url, error = %e, "Registry request failed");
                SmError::BadGateway("service registry is unavailable".to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| {
                error!(target: "sm.services.registry_client", error = %e, "Failed to parse registry response");
                SmError::BadGateway("invalid response from service registry".to_string())
            });
        }

        if status.as_u16() == 404 {
            return Err(SmError::NotFound("no such service".to_string()));
        }

        warn!(target: "sm.services.registry_client", url = %url, status = %status, "Registry returned error");
        Err(SmError::BadGateway(format!(
            "service registry returned status {}",
            status
        )))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    #[instrument(skip(self), name = "sm.registry.find_by_application")]
    async fn find_by_application(
        &self,
        application: &str,
        only_healthy: bool,
    ) -> Result<Vec<Relay>, SmError> {
        let url = format!(
            "{}/v1/services?application={}&only-healthy={}",
            self.base_url, application, only_healthy
        );

        self.get_json(&url).await
    }

    #[instrument(skip(self), name = "sm.registry.find")]
    async fn find(&self, id: &str) -> Result<Relay, SmError> {
        let url = format!("{}/v1/services/{}", self.base_url, id);

        self.get_json(&url).await
    }
}
