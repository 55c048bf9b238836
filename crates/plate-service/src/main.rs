use anyhow::Result;
use plate_service::{api, transport::HttpTransport, PlateServiceConfig, PlateServiceState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Held for the process lifetime so buffered file logs are flushed
    let _log_guard = telemetry::init_with_service("plate-service");

    info!("Starting plate service...");

    let config = PlateServiceConfig::from_env()?;
    info!(
        "Plate service configuration: bind={}, node_id={}, site_id={}, send_mode={:?}",
        config.bind_addr, config.node_id, config.site_id, config.send_mode
    );

    let state = match &config.transport_url {
        Some(url) => {
            info!("Sending detections to: {}", url);
            let transport = Arc::new(HttpTransport::new(url.clone())?);
            PlateServiceState::with_transport(&config, transport)
        }
        None => {
            info!("No TRANSPORT_URL configured, detections are not forwarded");
            PlateServiceState::new(&config)
        }
    };

    let app = api::router(state.clone());

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Plate service listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

async fn shutdown_signal(state: PlateServiceState) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
    if let Err(e) = state.shutdown().await {
        tracing::error!("Error during shutdown: {}", e);
    }
}
