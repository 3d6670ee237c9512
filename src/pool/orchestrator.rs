//! Process orchestrator interface
//!
//! The pool never knows how a worker is run. It only needs to start one,
//! stop one, and ask what is currently alive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use super::types::WorkerKey;

/// Resolves once a started worker is ready to take work
pub type ReadySignal = BoxFuture<'static, Result<(), OrchestratorError>>;

/// Result of a successful start command
pub struct StartedWorker {
    /// Orchestrator-specific reference to the running worker
    pub runtime_ref: String,
    /// Readiness of the worker; the pool bounds it with a timeout
    pub ready: ReadySignal,
}

impl std::fmt::Debug for StartedWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartedWorker")
            .field("runtime_ref", &self.runtime_ref)
            .finish_non_exhaustive()
    }
}

/// One entry of the orchestrator's live listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub key: WorkerKey,
    pub healthy: bool,
    pub runtime_ref: String,
    pub started_at: Option<DateTime<Utc>>,
}

/// Orchestrator error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Worker {0} exited before becoming ready")]
    ExitedBeforeReady(WorkerKey),
}

/// Ground truth for which workers are alive
#[async_trait]
pub trait ProcessOrchestrator: Send + Sync {
    /// Get the orchestrator name
    fn name(&self) -> &'static str;

    /// Start a worker for the key
    async fn start(&self, key: &WorkerKey) -> Result<StartedWorker, OrchestratorError>;

    /// Stop the worker for the key
    async fn stop(&self, key: &WorkerKey) -> Result<(), OrchestratorError>;

    /// List live workers as observed right now
    ///
    /// A freshly started worker may take a moment to show up here.
    async fn list(&self) -> Result<Vec<WorkerStatus>, OrchestratorError>;
}
