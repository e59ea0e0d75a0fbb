//! Firmware Release Server - Main entry point

use anyhow::Result;
use fwr_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use fwr_server::{
    api::{self, AppState},
    aws::load_sdk_config,
    config::AppConfig,
    pipeline::{DeletionReconciler, UploadProcessor},
    records::dynamo::DynamoRecordStore,
    storage::Storage,
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("fwr-server".to_string())
        .filter_directives("fwr_server=debug,tower_http=debug,aws_config=info".to_string())
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting firmware release server");

    let config = AppConfig::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let sdk_config = load_sdk_config(&config.aws).await;
    let objects = Arc::new(Storage::new(&sdk_config, &config.storage));
    let records = Arc::new(DynamoRecordStore::new(&sdk_config, &config.records));

    let state = AppState {
        uploads: Arc::new(UploadProcessor::new(
            objects,
            records.clone(),
            &config.pipeline,
        )),
        deletions: Arc::new(DeletionReconciler::new(
            records.clone(),
            records,
            &config.pipeline,
        )),
    };

    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }

    info!("Waiting up to {} seconds for in-flight events to finish", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
