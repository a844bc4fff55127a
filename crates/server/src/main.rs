use std::sync::Arc;

use anyhow::Context;
use pricelens_core::AppConfig;
use pricelens_ocr::{AmountPipeline, StandardPreprocessor};
use pricelens_server::{engine_manager, router, telemetry, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init("pricelens");

    let config = AppConfig::load().context("Failed to load configuration")?;

    // The engine itself starts lazily, on the first OCR request.
    let engine = Arc::new(engine_manager(&config.ocr));
    let pipeline = AmountPipeline::new(
        StandardPreprocessor::new(config.ocr.max_image_width),
        Arc::clone(&engine),
    );
    let state = AppState::new(pipeline, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    let params = engine.params();
    info!(
        addr = %config.server.bind,
        language = %params.language,
        whitelist = %params.whitelist,
        tessdata = ?params.data_path,
        "Listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped; releasing recognition engine");
    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
