use anyhow::{Context, Result};
use esr::api::{create_router, ApiState};
use esr::broker::{connect_broker, Broker};
use esr::config::EsrConfig;
use esr::datastore::{open_datastore, DataStore};
use esr::service::EntityService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "esr=info".into()),
        )
        .init();

    info!("ESR service starting...");

    let config = EsrConfig::load().context("Failed to load configuration")?;
    info!(
        datastore_type = %config.datastore.datastore_type,
        database = %config.datastore.name,
        broker_type = %config.broker.broker_type,
        http_port = config.http.port,
        "Configuration loaded"
    );

    // Initialize datastore
    let datastore = open_datastore(&config.datastore).context("Failed to open datastore")?;
    datastore.init().context("Failed to initialize datastore")?;

    // Initialize broker
    let broker = connect_broker(&config.broker)
        .await
        .context("Failed to connect broker")?;

    let entity_service = Arc::new(EntityService::new(
        Arc::clone(&datastore),
        Arc::clone(&broker),
    ));

    let router = create_router(ApiState { entity_service }).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http.port))
        .await
        .context("Failed to bind HTTP port")?;
    info!(port = config.http.port, "HTTP API listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for ctrl_c signal");
            }
            info!("Shutdown signal received");
        })
        .await;

    if let Err(e) = &served {
        error!(error = %e, "HTTP server error");
    }

    // Graceful shutdown
    broker.close().await;
    if let Err(e) = datastore.close() {
        error!(error = %e, "Failed to close datastore");
    }
    info!("ESR service stopped");

    served.context("HTTP server failed")
}
