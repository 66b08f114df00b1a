//! `stratus daemon` - periodic sync plus health and metrics endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};
use prometheus_client::registry::Registry;
use serde_json::json;
use stratus_runtime::SyncDriver;
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::app::App;

const OPENMETRICS: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

pub async fn run(app: App) -> anyhow::Result<()> {
    let mut registry = Registry::default();
    app.metrics.register(&mut registry);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let driver = SyncDriver::from_config(Arc::clone(&app.reconciler), &app.config.sync);
    let driver = tokio::spawn(driver.run(cancel_rx));

    let addr = app.config.observability.metrics_bind.as_str();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("stratus daemon listening on {}", addr);

    axum::serve(listener, router(Arc::new(registry)))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutdown requested, stopping sync driver");
            let _ = cancel_tx.send(true);
        })
        .await?;

    driver.await?;
    info!("stratus daemon stopped");
    Ok(())
}

pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(registry)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "service": "stratus" }))
}

async fn metrics(State(registry): State<Arc<Registry>>) -> Response {
    let mut buf = String::new();
    if let Err(e) = prometheus_client::encoding::text::encode(&mut buf, &registry) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    (StatusCode::OK, [(header::CONTENT_TYPE, OPENMETRICS)], buf).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
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
