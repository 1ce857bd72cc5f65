//! vqa-proxy: HTTP proxy for a remote image+audio VQA inference service
//!
//! Features:
//! - Multipart upload relay (image + audio) to a remote predict endpoint
//! - Optional JWT bearer-token verification (HS256)
//! - Guaranteed scratch-file cleanup on every request exit path
//! - Process-scoped backend handle with lazy reconnect

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod proxy;
pub mod scratch;

pub use config::AppConfig;
pub use error::ProxyError;
pub use proxy::{build_router, run_server, ProxyState};
