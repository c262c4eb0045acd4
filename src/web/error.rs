use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::errors::ForensicsError;

pub fn status_code(error: &ForensicsError) -> StatusCode {
    match error {
        ForensicsError::Decode { .. } | ForensicsError::MissingInput => StatusCode::BAD_REQUEST,
        ForensicsError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
        ForensicsError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ForensicsError::Configuration { .. }
        | ForensicsError::Model { .. }
        | ForensicsError::Inference { .. }
        | ForensicsError::Encode { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ForensicsError {
    fn into_response(self) -> Response {
        let status = status_code(&self);
        if status.is_server_error() {
            tracing::error!("Request failed: {} ({})", self, status);
        } else {
            tracing::warn!("Request rejected: {} ({})", self, status);
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.error_code(),
        });
        (status, Json(body)).into_response()
    }
}
