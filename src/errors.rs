use thiserror::Error;

/// Boxed error source carried by the structured variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the manipulation detection service.
///
/// Every core function returns these explicitly; the web layer decides how each
/// variant maps onto an HTTP status (see `web::error`).
#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Failed to decode image: {reason}")]
    Decode { reason: String },

    #[error("No image provided")]
    MissingInput,

    #[error("Models are not loaded yet")]
    ModelNotLoaded,

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Model error: {operation} failed: {source}")]
    Model {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Inference error: {operation} failed: {source}")]
    Inference {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Encoding error: {operation} failed: {source}")]
    Encode {
        operation: String,
        #[source]
        source: BoxError,
    },
}

pub type Result<T> = std::result::Result<T, ForensicsError>;

impl ForensicsError {
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    pub fn inference(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Inference {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn model(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Model {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Stable machine-readable code, included in error responses.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Decode { .. } => "DECODE_ERROR",
            Self::MissingInput => "MISSING_INPUT",
            Self::ModelNotLoaded => "MODEL_NOT_LOADED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Model { .. } => "MODEL_ERROR",
            Self::Inference { .. } => "INFERENCE_ERROR",
            Self::Encode { .. } => "ENCODE_ERROR",
        }
    }
}

/// Image crate errors reach this conversion only while decoding input.
/// Mask encoding builds `Encode` explicitly.
impl From<image::ImageError> for ForensicsError {
    fn from(err: image::ImageError) -> Self {
        Self::decode(err.to_string())
    }
}

impl From<base64::DecodeError> for ForensicsError {
    fn from(err: base64::DecodeError) -> Self {
        Self::decode(format!("invalid base64 payload: {err}"))
    }
}

/// ONNX Runtime errors raised while running a session. Failures while building
/// a session are mapped to `Model` at the call site.
impl From<ort::Error> for ForensicsError {
    fn from(err: ort::Error) -> Self {
        Self::inference("onnx runtime", err)
    }
}

/// Shape errors come out of tensor conversions around `Session::run`, so they
/// are reported as inference failures.
impl From<ndarray::ShapeError> for ForensicsError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::inference("tensor shape conversion", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inference_error_keeps_original_diagnostic() {
        let err = ForensicsError::inference("classifier", "expected [1, 4], got [1, 3]");
        assert_eq!(
            err.to_string(),
            "Inference error: classifier failed: expected [1, 4], got [1, 3]"
        );
        assert_eq!(err.error_code(), "INFERENCE_ERROR");
    }

    #[test]
    fn base64_errors_become_decode_errors() {
        use base64::Engine;

        let err: ForensicsError = base64::engine::general_purpose::STANDARD
            .decode("not base64!!")
            .unwrap_err()
            .into();
        assert!(matches!(err, ForensicsError::Decode { .. }));
    }

    #[test]
    fn image_errors_become_decode_errors() {
        let err: ForensicsError = image::load_from_memory(b"definitely not an image")
            .unwrap_err()
            .into();
        assert!(matches!(err, ForensicsError::Decode { .. }));
        assert_eq!(err.error_code(), "DECODE_ERROR");
    }
}
