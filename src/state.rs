//! Application state management

use std::sync::Arc;

use crate::capability::CapabilityRegistry;
use crate::config::Config;
use crate::dispatch::{Dispatcher, WorkerClient};
use crate::pool::WorkerPool;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    registry: CapabilityRegistry,
    pool: WorkerPool,
    dispatcher: Dispatcher,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        config: &Config,
        registry: CapabilityRegistry,
        pool: WorkerPool,
        worker: Arc<dyn WorkerClient>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            registry.clone(),
            pool.clone(),
            worker,
            config.workers.workspace_root.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                registry,
                pool,
                dispatcher,
            }),
        }
    }

    /// Get the capability registry
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.inner.registry
    }

    /// Get the worker pool
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Get the request dispatcher
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }
}
