//! HTTP adapter for the remote predict endpoint.
//!
//! The multipart field names the remote service expects come from config;
//! signature drift on the remote side is a config change here, not a code
//! change.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use super::InferenceBackend;
use crate::config::BackendConfig;
use crate::error::ProxyError;

pub struct HttpBackend {
    config: BackendConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: BackendConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    async fn file_part(path: &Path) -> Result<Part, ProxyError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ProxyError::internal(format!("Failed to read scratch file {}: {}", path.display(), e))
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Part::bytes(bytes).file_name(file_name))
    }
}

#[async_trait]
impl InferenceBackend for HttpBackend {
    async fn predict(&self, image_path: &Path, audio_path: &Path) -> Result<String, ProxyError> {
        let form = Form::new()
            .part(
                self.config.image_param.clone(),
                Self::file_part(image_path).await?,
            )
            .part(
                self.config.audio_param.clone(),
                Self::file_part(audio_path).await?,
            );

        let url = self.config.predict_url();
        tracing::debug!(
            url = %url,
            image_param = %self.config.image_param,
            audio_param = %self.config.audio_param,
            "Forwarding prediction request"
        );

        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let prediction = extract_prediction(&body).ok_or_else(|| {
            ProxyError::internal(format!(
                "Malformed response from remote service: {}",
                preview(&body)
            ))
        })?;

        if prediction.is_empty() {
            return Err(ProxyError::internal(
                "Empty prediction from remote service",
            ));
        }

        Ok(prediction)
    }

    async fn probe(&self) -> Result<(), ProxyError> {
        let url = self.config.probe_url();
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProxyError::Upstream {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

/// Pull the prediction value out of the remote JSON body.
///
/// Known shapes: `{"prediction": ...}` (proxy-style), `{"data": [..]}`
/// (demo-app style), or a bare JSON string. Anything else is malformed.
fn extract_prediction(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;

    if let Some(value) = json.get("prediction") {
        return Some(value_to_string(value));
    }

    if let Some(first) = json.get("data").and_then(|d| d.as_array()).and_then(|a| a.first()) {
        return Some(value_to_string(first));
    }

    if let serde_json::Value::String(s) = json {
        return Some(s);
    }

    None
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}
