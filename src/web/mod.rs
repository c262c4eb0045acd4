pub mod error;
pub mod extractors;
pub mod handlers;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config,
    errors::{ForensicsError, Result},
    normalizer::Normalizer,
    pipeline::ForensicsPipeline,
    predictor::Predictor,
};

/// Everything a request handler needs, built once at start-up.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ForensicsPipeline>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, predictor: Arc<Predictor>) -> Self {
        let normalizer = Normalizer::new(config.image_size, config.max_upload_bytes);
        Self {
            pipeline: Arc::new(ForensicsPipeline::new(predictor, normalizer)),
            config: Arc::new(config),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/api/classify", post(handlers::classify))
        .route("/api/segment", post(handlers::segment))
        .route("/api/analyze", post(handlers::analyze))
        .layer(DefaultBodyLimit::max(config.body_limit()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: Config, predictor: Arc<Predictor>) -> Result<()> {
    let addr = config.bind;
    let app = create_app(AppState::new(config, predictor));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ForensicsError::Configuration {
            message: format!("failed to bind to {}: {}", addr, e),
        })?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("  GET  /             - API description");
    tracing::info!("  GET  /health       - Health check");
    tracing::info!("  POST /api/classify - Manipulation type");
    tracing::info!("  POST /api/segment  - Manipulation mask");
    tracing::info!("  POST /api/analyze  - Classification + mask");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ForensicsError::Configuration {
            message: format!("server error: {}", e),
        })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
