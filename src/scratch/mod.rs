//! Per-request scratch files for uploads.
//!
//! The remote client integration takes file paths, not in-memory bytes, so
//! each upload is spilled to a uniquely named file in the working directory.
//! Files are owned by the request that created them and removed on drop,
//! whatever exit path the handler takes. Removal failures are logged and
//! swallowed so they never mask the primary result.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::ProxyError;

pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png"];
pub const ALLOWED_AUDIO_TYPES: &[&str] = &["audio/mpeg", "audio/wav"];

/// Check a declared content type against an allow list, naming the offending
/// field on failure.
pub fn validate_content_type(
    field: &str,
    filename: &str,
    declared: &str,
    allowed: &[&str],
) -> Result<(), ProxyError> {
    if allowed.contains(&declared) {
        Ok(())
    } else {
        Err(ProxyError::Validation(format!(
            "Unsupported content type \"{}\" for {} file \"{}\"; expected one of: {}",
            declared,
            field,
            filename,
            allowed.join(", ")
        )))
    }
}

/// A scratch file removed when the handle is dropped.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Write `bytes` to `<dir>/<uuid4>_<sanitized filename>`.
    pub fn write(dir: &Path, original_name: &str, bytes: &[u8]) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;

        let name = format!("{}_{}", Uuid::new_v4(), sanitize_filename(original_name));
        let path = dir.join(name);
        std::fs::write(&path, bytes)?;

        tracing::debug!(path = %path.display(), size = bytes.len(), "Wrote scratch file");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed scratch file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove scratch file"
                );
            }
        }
    }
}

/// Strip any path components from a client-supplied filename.
fn sanitize_filename(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .to_string();

    if base.is_empty() {
        "upload".to_string()
    } else {
        base
    }
}
