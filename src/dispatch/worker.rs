//! Worker client
//!
//! Hands a prepared workspace to a loaded worker and collects its raw output.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;

use super::types::Level;
use crate::error::{GatewayError, Result};
use crate::pool::WorkerKey;

/// Output file holding the `name -> text` mapping
pub const OUTPUT_FILE: &str = "out.json";
/// Optional output file holding the `name -> meta` mapping
pub const META_FILE: &str = "meta.json";
/// Request parameters for the worker, written when non-empty
pub const PARAMS_FILE: &str = "params.json";

/// Work handed to a worker
#[derive(Debug, Clone)]
pub struct WorkerJob {
    pub key: WorkerKey,
    pub level: Level,
    /// Directory holding `0.jpg .. n-1.jpg`
    pub workspace: PathBuf,
    pub image_count: usize,
    pub params: Map<String, Value>,
}

/// Raw worker output, before ordering
#[derive(Debug, Clone, Default)]
pub struct WorkerOutput {
    /// Mapping of image file name to text
    pub text: Value,
    /// Mapping of image file name to metadata, when the worker produced any
    pub meta: Option<Value>,
}

/// Runs inference on a loaded worker
#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn infer(&self, job: WorkerJob) -> Result<WorkerOutput>;
}

/// Worker client invoking an inference script against the workspace
#[derive(Debug, Clone)]
pub struct ScriptWorkerClient {
    script: PathBuf,
}

impl ScriptWorkerClient {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl WorkerClient for ScriptWorkerClient {
    async fn infer(&self, job: WorkerJob) -> Result<WorkerOutput> {
        if !job.params.is_empty() {
            let params = serde_json::to_vec(&job.params)
                .map_err(|e| GatewayError::InternalError(format!("Failed to encode params: {}", e)))?;
            tokio::fs::write(job.workspace.join(PARAMS_FILE), params)
                .await
                .map_err(|e| GatewayError::InternalError(format!("Failed to write params: {}", e)))?;
        }

        tracing::debug!(
            key = %job.key,
            level = %job.level,
            images = job.image_count,
            "Running inference script"
        );

        let output = Command::new(&self.script)
            .arg(job.key.modality.as_str())
            .arg(job.key.language.code())
            .arg(&job.key.version)
            .arg(&job.workspace)
            .arg(job.level.as_str())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                GatewayError::InternalError(format!(
                    "Failed to run {}: {}",
                    self.script.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GatewayError::InternalError(format!(
                "Inference for {} failed ({}): {}",
                job.key,
                output.status,
                stderr.trim()
            )));
        }

        read_output(&job.workspace).await
    }
}

/// Read `out.json` and the optional `meta.json` from a workspace
pub async fn read_output(workspace: &Path) -> Result<WorkerOutput> {
    let raw = tokio::fs::read(workspace.join(OUTPUT_FILE))
        .await
        .map_err(|e| GatewayError::OutputParseError(format!("Failed to read {}: {}", OUTPUT_FILE, e)))?;
    let text = serde_json::from_slice(&raw)
        .map_err(|e| GatewayError::OutputParseError(format!("Invalid {}: {}", OUTPUT_FILE, e)))?;

    let meta = match tokio::fs::read(workspace.join(META_FILE)).await {
        Ok(raw) => Some(
            serde_json::from_slice(&raw)
                .map_err(|e| GatewayError::OutputParseError(format!("Invalid {}: {}", META_FILE, e)))?,
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(GatewayError::OutputParseError(format!(
                "Failed to read {}: {}",
                META_FILE, e
            )))
        }
    };

    Ok(WorkerOutput { text, meta })
}
