//! Worker Pool Module
//!
//! Keeps at most N OCR workers alive and starts them on demand.
//!
//! - `WorkerPool`: bounded cache with load deduplication and FIFO eviction
//! - `ProcessOrchestrator`: how workers are started, stopped and listed
//! - `DockerOrchestrator`: containers driven through the docker CLI

mod cache;
mod docker;
mod orchestrator;
mod types;

pub use cache::WorkerPool;
pub use docker::{parse_container_name, parse_listing, DockerOrchestrator, DockerSettings};
pub use orchestrator::{
    OrchestratorError, ProcessOrchestrator, ReadySignal, StartedWorker, WorkerStatus,
};
pub use types::{PoolConfig, PoolStats, Readiness, WorkerHandle, WorkerKey};

#[cfg(test)]
pub(crate) use orchestrator::mock;
