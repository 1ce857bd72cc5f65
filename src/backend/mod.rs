//! Remote inference service client and connection lifecycle.

mod http;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::BackendConfig;
use crate::error::ProxyError;

pub use http::HttpBackend;

/// The remote model that answers the image+audio question; opaque beyond
/// this seam.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run one prediction over the two uploaded files.
    async fn predict(&self, image_path: &Path, audio_path: &Path) -> Result<String, ProxyError>;

    /// Cheap reachability check used to establish/verify the handle.
    async fn probe(&self) -> Result<(), ProxyError>;
}

impl std::fmt::Debug for dyn InferenceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn InferenceBackend")
    }
}

/// Process-scoped handle to the remote inference service.
///
/// At most one live handle exists at a time. Replacing it is idempotent, so
/// no locking discipline beyond the RwLock is needed; readers tolerate a
/// momentarily stale handle.
pub struct Connection {
    config: BackendConfig,
    client: reqwest::Client,
    handle: RwLock<Option<Arc<dyn InferenceBackend>>>,
}

impl Connection {
    pub fn new(config: BackendConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            handle: RwLock::new(None),
        }
    }

    /// Pre-install a handle without probing. Used by tests and by callers
    /// that already verified reachability.
    pub fn with_backend(
        config: BackendConfig,
        client: reqwest::Client,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        Self {
            config,
            client,
            handle: RwLock::new(Some(backend)),
        }
    }

    /// Probe the remote service and install a fresh handle on success.
    pub async fn connect(&self) -> Result<Arc<dyn InferenceBackend>, ProxyError> {
        let backend: Arc<dyn InferenceBackend> =
            Arc::new(HttpBackend::new(self.config.clone(), self.client.clone()));
        backend.probe().await?;

        *self.handle.write().await = Some(backend.clone());
        tracing::info!(url = %self.config.base_url(), "Connected to remote inference service");
        Ok(backend)
    }

    /// Return the live handle, attempting at most one lazy reconnect if it
    /// is absent. Fails fast with a "not connected" signal otherwise.
    pub async fn ensure(&self) -> Result<Arc<dyn InferenceBackend>, ProxyError> {
        if let Some(backend) = self.handle.read().await.clone() {
            return Ok(backend);
        }

        tracing::info!("No live backend handle; attempting reconnect");
        self.connect().await.map_err(|e| {
            ProxyError::unavailable(format!(
                "Not connected to the remote inference service: {}",
                e
            ))
        })
    }

    pub async fn is_live(&self) -> bool {
        self.handle.read().await.is_some()
    }
}
