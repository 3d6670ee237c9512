//! Per-request workspace
//!
//! Every request writes its images into its own directory under the
//! workspace root, so concurrent batches never see each other's files.
//! Callers remove the directory with [`RequestWorkspace::remove`]; a
//! workspace dropped without it is removed on the blocking pool.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{GatewayError, Result};

/// Scratch directory owned by one request
#[derive(Debug)]
pub struct RequestWorkspace {
    id: Uuid,
    path: PathBuf,
    removed: bool,
}

impl RequestWorkspace {
    /// Create a fresh directory under `root`
    pub async fn create(root: &Path) -> Result<Self> {
        let id = Uuid::new_v4();
        let path = root.join(id.to_string());
        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            GatewayError::InternalError(format!(
                "Failed to create workspace {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(workspace = %id, path = %path.display(), "Workspace created");
        Ok(Self {
            id,
            path,
            removed: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write image `i` as `<i>.jpg`
    ///
    /// Stops at the first image that is empty or fails to write.
    pub async fn write_images(&self, images: &[Vec<u8>]) -> Result<()> {
        for (index, bytes) in images.iter().enumerate() {
            if bytes.is_empty() {
                tracing::warn!(workspace = %self.id, index, "Empty image payload");
                return Err(GatewayError::ImageTransferError(index));
            }

            let target = self.path.join(format!("{}.jpg", index));
            if let Err(e) = tokio::fs::write(&target, bytes).await {
                tracing::warn!(workspace = %self.id, index, error = %e, "Failed to write image");
                return Err(GatewayError::ImageTransferError(index));
            }
        }
        Ok(())
    }

    /// Delete the directory and everything in it
    pub async fn remove(mut self) {
        let result = tokio::fs::remove_dir_all(&self.path).await;
        self.removed = true;
        log_removal(self.id, result);
    }
}

impl Drop for RequestWorkspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        let (id, path) = (self.id, std::mem::take(&mut self.path));
        let remove = move || log_removal(id, std::fs::remove_dir_all(&path));
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(remove);
            }
            Err(_) => remove(),
        }
    }
}

fn log_removal(id: Uuid, result: std::io::Result<()>) {
    match result {
        Ok(()) => tracing::debug!(workspace = %id, "Workspace removed"),
        Err(e) => tracing::warn!(workspace = %id, error = %e, "Failed to remove workspace"),
    }
}
