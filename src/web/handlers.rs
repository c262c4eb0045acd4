use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use super::{extractors::ImagePayload, AppState};
use crate::{
    encoder::{AnalysisResponse, ClassificationResponse, SegmentationResponse},
    errors::{ForensicsError, Result},
    normalizer::ImageInput,
    pipeline::ForensicsPipeline,
    predictor::ManipulationClass,
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub device: String,
    pub models_loaded: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiDescription {
    pub name: &'static str,
    pub version: &'static str,
    pub endpoints: serde_json::Value,
    pub supported_classes: Vec<&'static str>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let predictor = state.pipeline.predictor();
    Json(HealthResponse {
        status: "healthy",
        device: predictor.device().to_string(),
        models_loaded: predictor.is_loaded(),
    })
}

/// GET /
pub async fn index() -> Json<ApiDescription> {
    Json(ApiDescription {
        name: "Image Manipulation Detection API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: serde_json::json!({
            "POST /api/classify": "Classify image manipulation type",
            "POST /api/segment": "Generate segmentation mask",
            "POST /api/analyze": "Complete analysis (classification + segmentation)",
            "GET /health": "Health check",
        }),
        supported_classes: ManipulationClass::ALL.iter().map(|c| c.label()).collect(),
    })
}

/// POST /api/classify
pub async fn classify(
    State(state): State<AppState>,
    ImagePayload(input): ImagePayload,
) -> Result<Json<ClassificationResponse>> {
    let response = run_blocking(state, input, |pipeline, input| pipeline.classify(input)).await?;
    tracing::info!(
        "Classification: {} ({:.3})",
        response.class,
        response.confidence
    );
    Ok(Json(response))
}

/// POST /api/segment
pub async fn segment(
    State(state): State<AppState>,
    ImagePayload(input): ImagePayload,
) -> Result<Json<SegmentationResponse>> {
    let response = run_blocking(state, input, |pipeline, input| pipeline.segment(input)).await?;
    tracing::info!(
        "Segmentation: {}x{} mask, confidence {:.3}",
        response.size[0],
        response.size[1],
        response.confidence
    );
    Ok(Json(response))
}

/// POST /api/analyze
pub async fn analyze(
    State(state): State<AppState>,
    ImagePayload(input): ImagePayload,
) -> Result<Json<AnalysisResponse>> {
    let response = run_blocking(state, input, |pipeline, input| pipeline.analyze(input)).await?;
    tracing::info!(
        "Analysis: {} ({:.3}), mask confidence {:.3}",
        response.classification.class,
        response.classification.confidence,
        response.segmentation.confidence
    );
    Ok(Json(response))
}

/// Runs a pipeline stage on tokio's blocking pool so inference does not stall
/// the reactor, bounded by the configured request timeout.
///
/// A stage that outlives the timeout keeps running on its blocking thread; only
/// the response is abandoned.
async fn run_blocking<T, F>(state: AppState, input: ImageInput, stage: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&ForensicsPipeline, &ImageInput) -> Result<T> + Send + 'static,
{
    let timeout = state.config.request_timeout();
    let pipeline = Arc::clone(&state.pipeline);
    let task = tokio::task::spawn_blocking(move || stage(&pipeline, &input));

    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => {
            joined.map_err(|e| ForensicsError::inference("blocking inference task", e))?
        }
        Err(_) => Err(ForensicsError::Timeout {
            seconds: timeout.as_secs(),
        }),
    }
}
