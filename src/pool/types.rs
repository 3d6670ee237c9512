//! Worker pool types

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::{Language, Modality};

/// Identifies one backend configuration
///
/// Ordering is used to break eviction ties deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerKey {
    pub modality: Modality,
    pub language: Language,
    pub version: String,
}

impl WorkerKey {
    pub fn new(modality: Modality, language: Language, version: impl Into<String>) -> Self {
        Self {
            modality,
            language,
            version: version.into(),
        }
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.modality, self.language, self.version)
    }
}

/// How a handle came to be in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    /// Started by the pool and confirmed ready
    Ready,
    /// Found live and healthy in the orchestrator listing
    Adopted,
}

/// A running worker owned by the pool
#[derive(Debug, Clone, Serialize)]
pub struct WorkerHandle {
    pub key: WorkerKey,
    /// Eviction order is oldest `started_at` first
    pub started_at: DateTime<Utc>,
    pub readiness: Readiness,
    /// Orchestrator-specific reference (container name, pid, ...)
    pub runtime_ref: String,
    /// Monotonic instant the pool learned about this worker
    #[serde(skip)]
    pub(crate) registered_at: Instant,
}

impl WorkerHandle {
    pub(crate) fn ready(key: WorkerKey, runtime_ref: String) -> Self {
        Self {
            key,
            started_at: Utc::now(),
            readiness: Readiness::Ready,
            runtime_ref,
            registered_at: Instant::now(),
        }
    }

    pub(crate) fn adopted(
        key: WorkerKey,
        runtime_ref: String,
        started_at: Option<DateTime<Utc>>,
        observed_at: Instant,
    ) -> Self {
        Self {
            key,
            started_at: started_at.unwrap_or_else(Utc::now),
            readiness: Readiness::Adopted,
            runtime_ref,
            registered_at: observed_at,
        }
    }
}

/// Pool sizing and timing
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of live workers
    pub capacity: usize,
    /// Upper bound on waiting for a started worker to become ready
    pub load_timeout: Duration,
    /// How long a freshly started worker may be missing from listings
    pub reconcile_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            load_timeout: Duration::from_secs(120),
            reconcile_grace: Duration::from_secs(10),
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Workers currently held by the pool
    pub loaded: usize,
    /// Maximum pool size
    pub capacity: usize,
    /// Loads in flight
    pub loading: usize,
    /// Stops in flight
    pub evicting: usize,
}
