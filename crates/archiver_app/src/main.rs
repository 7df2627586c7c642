mod logging;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use archiver_core::ExportConfig;
use archiver_engine::ExportService;
use archiver_logging::{archiver_info, archiver_warn, parse_level};
use logging::LogDestination;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let level = parse_level(&std::env::var("LOG_LEVEL").unwrap_or_default());
    let log_file = std::env::var("LOG_FILE").ok();
    logging::initialize(level, LogDestination::from_setting(log_file.as_deref()));

    let config = ExportConfig::from_env().context("invalid configuration")?;
    archiver_info!(
        "Loaded configuration exports_dir={} batch_size={} batch_delay_ms={} max_batches={:?}",
        config.exports_dir.display(),
        config.batch_size,
        config.batch_delay.as_millis(),
        config.max_batches
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid HOST/PORT {}:{}", config.host, config.port))?;
    let service = Arc::new(ExportService::new(config).context("could not build HTTP client")?);
    let app = server::router(AppState::new(Arc::clone(&service)));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("could not bind {addr}"))?;
    archiver_info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let running = service.active_tasks();
    if running > 0 {
        archiver_info!("Waiting for {} running export(s) to finish", running);
    }
    service.shutdown().await;
    archiver_info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            archiver_warn!("Could not listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                archiver_warn!("Could not listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => archiver_info!("Received Ctrl-C, shutting down"),
        () = terminate => archiver_info!("Received SIGTERM, shutting down"),
    }
}
