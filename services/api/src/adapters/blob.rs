//! services/api/src/adapters/blob.rs
//!
//! A `BlobStorageService` backed by the local filesystem. Objects are written
//! under a root directory; the returned URL is either a public base URL joined
//! with the object path or a `file://` URL.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tax_analysis_core::ports::{BlobStorageService, PortError, PortResult};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct LocalBlobAdapter {
    root: PathBuf,
    public_url: Option<String>,
}

impl LocalBlobAdapter {
    pub fn new(root: PathBuf, public_url: Option<String>) -> Self {
        Self { root, public_url }
    }

    /// Resolves `path` under the root, refusing anything that would escape it.
    fn resolve(&self, path: &str) -> PortResult<PathBuf> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !safe {
            return Err(PortError::Validation(format!(
                "invalid storage path '{}'",
                path
            )));
        }
        Ok(self.root.join(relative))
    }

    fn url_for(&self, path: &str, full: &Path) -> String {
        match &self.public_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), path),
            None => format!("file://{}", full.display()),
        }
    }
}

#[async_trait]
impl BlobStorageService for LocalBlobAdapter {
    async fn put_object(&self, path: &str, bytes: Bytes) -> PortResult<String> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(format!("Failed to create directory: {}", e)))?;
        }
        tokio::fs::write(&full, &bytes)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to write object: {}", e)))?;

        debug!(path, size = bytes.len(), "Stored object");
        Ok(self.url_for(path, &full))
    }

    async fn delete_object(&self, path: &str) -> PortResult<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => {
                debug!(path, "Removed object");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unexpected(format!("Failed to remove object: {}", e))),
        }
    }
}

/// The storage path for an upload: `{user}/{session}/{unix millis}_{file name}`.
///
/// Path separators and other unsafe characters in the file name are replaced.
pub fn upload_path(user_id: &uuid::Uuid, session_id: &str, file_name: &str, millis: i64) -> String {
    let clean: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let clean = clean.trim_start_matches('.');
    let clean = if clean.is_empty() { "file" } else { clean };
    format!("{}/{}/{}_{}", user_id, session_id, millis, clean)
}
