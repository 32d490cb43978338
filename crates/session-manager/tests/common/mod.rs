//! Test harness for spawning session-manager server instances in tests.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use session_manager::auth::{TokenIssuer, TokenVerifier};
use session_manager::config::Config;
use session_manager::hub::SignalingHub;
use session_manager::observability::metrics::init_metrics_recorder;
use session_manager::routes::{self, AppState};
use session_manager::services::{HttpRegistryClient, HttpRelayClient, SessionService};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::OnceLock;
use tokio::task::JoinHandle;

pub const TEST_JWT_ISSUER: &str = "session-manager-test";
pub const TEST_JWT_SECRET: &str = "very-secret-secret";

/// Global metrics handle for test servers: the Prometheus recorder can
/// only be installed once per process.
static TEST_METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> =
    OnceLock::new();

fn get_test_metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder().unwrap_or_else(|_| {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .build_recorder()
                    .handle()
            })
        })
        .clone()
}

/// Test configuration pointing the registry client at a mock server.
pub fn test_config(registry_url: &str) -> Config {
    let vars = HashMap::from([
        ("DB_HOST".to_string(), "localhost".to_string()),
        ("DB_PORT".to_string(), "5432".to_string()),
        ("DB_DATABASE".to_string(), "sessionmanager_test".to_string()),
        ("DB_USERNAME".to_string(), "test".to_string()),
        ("DB_PASSWORD".to_string(), "test".to_string()),
        ("JWT_ISSUER".to_string(), TEST_JWT_ISSUER.to_string()),
        ("JWT_SECRET".to_string(), TEST_JWT_SECRET.to_string()),
        ("SESSIONREGISTRY_URL".to_string(), registry_url.to_string()),
        ("SESSION_SECRET".to_string(), "test-session-secret".to_string()),
    ]);

    Config::from_vars(&vars).expect("test config should load")
}

/// Issuer matching the test server's verifier.
pub fn test_issuer() -> TokenIssuer {
    TokenIssuer::new(TEST_JWT_ISSUER.to_string(), TEST_JWT_SECRET)
}

/// Verifier matching the test server's issuer.
pub fn test_verifier() -> TokenVerifier {
    TokenVerifier::new(TEST_JWT_ISSUER, TEST_JWT_SECRET)
}

/// A session-manager instance listening on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: Arc<SignalingHub>,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Spawn a server over the given pool, with the registry client
    /// pointed at `registry_url` (typically a wiremock server).
    pub async fn spawn(pool: PgPool, registry_url: &str) -> Self {
        let config = test_config(registry_url);

        let issuer = test_issuer();
        let verifier = Arc::new(test_verifier());

        let registry_client = Arc::new(
            HttpRegistryClient::new(config.registry_url.clone(), issuer.clone())
                .expect("registry client should build"),
        );
        let relay_client =
            Arc::new(HttpRelayClient::new(issuer.clone()).expect("relay client should build"));

        let session_service = Arc::new(SessionService::new(
            pool.clone(),
            registry_client,
            relay_client,
            issuer,
            config.turn_udp_port,
            config.turn_rpc_protocol.clone(),
        ));

        let hub = Arc::new(SignalingHub::new());

        let state = Arc::new(AppState {
            pool,
            config,
            session_service,
            hub: hub.clone(),
            verifier,
        });

        let app = routes::build_routes(state, get_test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind ephemeral port");
        let addr = listener.local_addr().expect("listener should have an addr");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("server should run");
        });

        Self {
            addr,
            hub,
            _handle: handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self, session_id: &str) -> String {
        format!(
            "ws://{}/v1/sessions/{}?client-id=test-client&client-secret=test-secret",
            self.addr, session_id
        )
    }
}
