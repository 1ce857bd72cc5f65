//! Request handlers: health, keep-alive ping, and the predict proxy
//! lifecycle (authenticate, check the backend handle, validate the upload
//! pair, spill to scratch files, forward, clean up).

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::path::Path;

use super::server::ProxyState;
use crate::auth;
use crate::error::ProxyError;
use crate::scratch::{
    validate_content_type, ScratchFile, ALLOWED_AUDIO_TYPES, ALLOWED_IMAGE_TYPES,
};

/// One parsed multipart file field.
struct Upload {
    filename: String,
    content_type: String,
    bytes: axum::body::Bytes,
}

/// Health check endpoint; degraded when the backend handle is absent.
pub async fn health(State(state): State<ProxyState>) -> impl IntoResponse {
    if state.connection.is_live().await {
        (
            StatusCode::OK,
            Json(json!({
                "status": "Proxy server is running and connected to the remote inference service."
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "Proxy server is running but not connected to the remote inference service."
            })),
        )
    }
}

/// Keep-alive probe for external pingers.
pub async fn ping() -> &'static str {
    "pong"
}

/// Proxy one prediction request.
pub async fn predict(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ProxyError> {
    // Auth runs before anything touches the body or the disk
    if state.config.auth.enabled {
        let secret = state
            .config
            .auth
            .secret
            .as_deref()
            .ok_or_else(|| ProxyError::Config("JWT_SECRET is not set".to_string()))?;

        let auth_header = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let claims = auth::verify_bearer(auth_header, secret)?;
        tracing::info!(
            username = claims.username.as_deref().unwrap_or("<unknown>"),
            "Token verified"
        );
    }

    let backend = state.connection.ensure().await?;

    let (image, audio) = read_upload_pair(multipart).await?;

    tracing::info!(
        image = %image.filename,
        image_size = image.bytes.len(),
        audio = %audio.filename,
        audio_size = audio.bytes.len(),
        "Received upload pair"
    );

    // Scratch files are removed on drop, whichever way this function exits
    let dir = Path::new(&state.config.uploads.dir);
    let image_file = ScratchFile::write(dir, &image.filename, &image.bytes)
        .map_err(|e| ProxyError::internal(format!("Failed to store image upload: {}", e)))?;
    let audio_file = ScratchFile::write(dir, &audio.filename, &audio.bytes)
        .map_err(|e| ProxyError::internal(format!("Failed to store audio upload: {}", e)))?;

    let prediction = backend
        .predict(image_file.path(), audio_file.path())
        .await?;

    Ok(Json(json!({ "prediction": prediction })))
}

/// Parse the multipart form into the required image+audio pair, validating
/// declared content types before anything is written to disk.
async fn read_upload_pair(mut multipart: Multipart) -> Result<(Upload, Upload), ProxyError> {
    let mut image: Option<Upload> = None;
    let mut audio: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProxyError::Validation(format!("Failed to parse multipart form: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "image" | "audio" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ProxyError::Validation(format!("Failed to read \"{}\" field: {}", name, e))
                })?;

                let upload = Upload {
                    filename,
                    content_type,
                    bytes,
                };

                if name == "image" {
                    image = Some(upload);
                } else {
                    audio = Some(upload);
                }
            }
            other => {
                tracing::trace!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let image = image.ok_or_else(|| {
        ProxyError::Validation("Missing required file field \"image\"".to_string())
    })?;
    let audio = audio.ok_or_else(|| {
        ProxyError::Validation("Missing required file field \"audio\"".to_string())
    })?;

    validate_content_type("image", &image.filename, &image.content_type, ALLOWED_IMAGE_TYPES)?;
    validate_content_type("audio", &audio.filename, &audio.content_type, ALLOWED_AUDIO_TYPES)?;

    Ok((image, audio))
}
