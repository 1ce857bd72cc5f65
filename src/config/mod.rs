mod loader;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use loader::{apply_env_overrides, load_config};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
}

/// Proxy server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Remote inference service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Full backend URL (e.g., "https://example.hf.space")
    pub url: String,
    /// Path of the predict endpoint on the backend
    #[serde(default = "default_predict_path")]
    pub predict_path: String,
    /// Path probed to establish/verify the connection handle
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
    /// Request timeout in seconds; 0 means unbounded
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Multipart field name the backend expects for the image file.
    /// The remote contract has drifted between "image" and "image_input",
    /// so the mapping lives in config rather than code.
    #[serde(default = "default_image_param")]
    pub image_param: String,
    /// Multipart field name the backend expects for the audio file
    #[serde(default = "default_audio_param")]
    pub audio_param: String,
}

fn default_predict_path() -> String {
    "/predict".to_string()
}

fn default_probe_path() -> String {
    "/".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_image_param() -> String {
    "image".to_string()
}

fn default_audio_param() -> String {
    "audio".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7860".to_string(),
            predict_path: default_predict_path(),
            probe_path: default_probe_path(),
            timeout_seconds: default_timeout(),
            image_param: default_image_param(),
            audio_param: default_audio_param(),
        }
    }
}

impl BackendConfig {
    /// Returns the base URL with trailing slash stripped
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Returns true if the URL uses HTTPS
    pub fn is_tls(&self) -> bool {
        self.url.to_lowercase().starts_with("https://")
    }

    pub fn predict_url(&self) -> String {
        format!("{}{}", self.base_url(), self.predict_path)
    }

    pub fn probe_url(&self) -> String {
        format!("{}{}", self.base_url(), self.probe_path)
    }
}

/// Bearer-token authentication configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    /// HS256 signing secret. The JWT_SECRET environment variable always wins
    /// over a file-provided value.
    #[serde(default)]
    pub secret: Option<String>,
}

/// CORS allow-list configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    /// Allowed origins; a single "*" entry allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Scratch space for per-request upload files
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadsConfig {
    #[serde(default = "default_uploads_dir")]
    pub dir: String,
}

fn default_uploads_dir() -> String {
    "./uploads".to_string()
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file (no environment overrides)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Load configuration from a YAML file and apply PORT / JWT_SECRET
    /// environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = load_config(path)?;
        apply_env_overrides(&mut config);
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}
