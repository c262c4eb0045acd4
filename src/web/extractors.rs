use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Json,
};
use serde::Deserialize;

use crate::{
    errors::ForensicsError,
    normalizer::ImageInput,
};

/// Multipart field carrying the uploaded file.
pub const IMAGE_FIELD: &str = "image";
/// JSON / multipart text field carrying base64 image data.
pub const BASE64_FIELD: &str = "image_base64";

#[derive(Debug, Deserialize)]
struct Base64Body {
    #[serde(default)]
    image_base64: Option<String>,
}

/// Resolves either a multipart upload or a JSON body into one [`ImageInput`].
///
/// Requests that are neither multipart nor JSON, or that lack both fields,
/// are rejected with `MissingInput`.
#[derive(Debug)]
pub struct ImagePayload(pub ImageInput);

#[async_trait]
impl<S> FromRequest<S> for ImagePayload
where
    S: Send + Sync,
{
    type Rejection = ForensicsError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ForensicsError::decode(format!("invalid multipart body: {}", e)))?;
            from_multipart(multipart).await.map(Self)
        } else if content_type.starts_with("application/json") {
            let Json(body) = Json::<Base64Body>::from_request(req, state)
                .await
                .map_err(|e| ForensicsError::decode(format!("invalid JSON body: {}", e)))?;
            match body.image_base64 {
                Some(text) if !text.trim().is_empty() => Ok(Self(ImageInput::Base64(text))),
                _ => Err(ForensicsError::MissingInput),
            }
        } else {
            Err(ForensicsError::MissingInput)
        }
    }
}

async fn from_multipart(mut multipart: Multipart) -> Result<ImageInput, ForensicsError> {
    let mut base64_text = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ForensicsError::decode(format!("failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            IMAGE_FIELD => {
                if let Some(content_type) = field.content_type() {
                    if !content_type.starts_with("image/")
                        && content_type != "application/octet-stream"
                    {
                        return Err(ForensicsError::decode(format!(
                            "unsupported upload content type: {}",
                            content_type
                        )));
                    }
                }
                let data = field.bytes().await.map_err(|e| {
                    ForensicsError::decode(format!("failed to read file data: {}", e))
                })?;
                tracing::debug!("Received upload: {} bytes", data.len());
                return Ok(ImageInput::Bytes(data.to_vec()));
            }
            BASE64_FIELD => {
                let text = field.text().await.map_err(|e| {
                    ForensicsError::decode(format!("failed to read base64 field: {}", e))
                })?;
                if !text.trim().is_empty() {
                    base64_text = Some(text);
                }
            }
            _ => tracing::debug!("Ignoring multipart field: {}", name),
        }
    }

    base64_text
        .map(ImageInput::Base64)
        .ok_or(ForensicsError::MissingInput)
}
