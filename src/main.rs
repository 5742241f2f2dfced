use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router as AxumRouter;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use status_gateway::config::Config;
use status_gateway::{health, metrics, middleware, realtime, right_verifier::RightVerifier, router::Router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("starting device-status gateway");

    let metrics_recorder = metrics::MetricsRecorder::new();
    let metrics_handle = metrics_recorder.handle().clone();
    tracing::info!("metrics initialized");

    let right_verifier = RightVerifier::new(config.rf_url.clone(), config.rf_skip_tls);
    let router = Arc::new(Router::new(
        right_verifier,
        config.dsn_host_port.clone(),
        config.auth_field_name.clone(),
    ));

    let metrics_router = if config.enable_metrics {
        AxumRouter::new()
            .route("/metrics", get(metrics::metrics_handler))
            .with_state(metrics_handle)
    } else {
        AxumRouter::new()
    };

    let app = AxumRouter::new()
        .route("/ws/devices/status", get(realtime::ws_handler))
        .with_state(router.clone())
        .merge(
            AxumRouter::new()
                .route("/ping", get(health::liveness))
                .route("/health/live", get(health::liveness))
                .route("/health/ready", get(health::readiness))
                .with_state(router.clone()),
        )
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(middleware::logging::log_request_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.websocket_port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_router = router.clone();
    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, draining upstream workers");
            shutdown_router.stop();
        }
    }

    Ok(())
}
