//! Session manager.
//!
//! Entry point: loads configuration, connects to the database, applies
//! migrations, installs the metrics recorder and serves the HTTP API
//! until a shutdown signal arrives.

use session_manager::auth::{TokenIssuer, TokenVerifier};
use session_manager::config::Config;
use session_manager::hub::SignalingHub;
use session_manager::observability::metrics::init_metrics_recorder;
use session_manager::routes::{self, AppState};
use session_manager::services::{HttpRegistryClient, HttpRelayClient, SessionService};
use sqlx::migrate::Migrator;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_manager=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting session-manager");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        service_port = config.service_port,
        registry_url = %config.registry_url,
        turn_udp_port = config.turn_udp_port,
        turn_rpc_protocol = %config.turn_rpc_protocol,
        "Configuration loaded successfully"
    );

    // Initialize database connection pool
    info!("Connecting to database...");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.db.connection_url())
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    info!("Database connection established");

    // Apply migrations
    let migrator = Migrator::new(Path::new(&config.migrations_path)).await?;
    migrator.run(&pool).await.map_err(|e| {
        error!("Failed to apply database migrations: {}", e);
        e
    })?;

    // Install Prometheus metrics recorder
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to install metrics recorder: {}", e);
        e
    })?;

    // Wire up clients and services
    let issuer = TokenIssuer::new(config.jwt_issuer.clone(), &config.jwt_secret);
    let verifier = Arc::new(TokenVerifier::new(&config.jwt_issuer, &config.jwt_secret));

    let registry_client = Arc::new(HttpRegistryClient::new(
        config.registry_url.clone(),
        issuer.clone(),
    )?);
    let relay_client = Arc::new(HttpRelayClient::new(issuer.clone())?);

    let session_service = Arc::new(SessionService::new(
        pool.clone(),
        registry_client,
        relay_client,
        issuer,
        config.turn_udp_port,
        config.turn_rpc_protocol.clone(),
    ));

    let state = Arc::new(AppState {
        pool,
        config: config.clone(),
        session_service,
        hub: Arc::new(SignalingHub::new()),
        verifier,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.service_port));
    info!("Session manager listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Session manager shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
