//! Worker pool cache
//!
//! Bounded set of live workers, keyed by (modality, language, version).
//!
//! ```text
//!  ensure_loaded(key)
//!        │
//!        ▼
//!   list() ──► reconcile ──► handle present? ──yes──► Arc<WorkerHandle>
//!                                 │ no
//!                                 ▼
//!                       load in flight? ──yes──► join shared load
//!                                 │ no
//!                                 ▼
//!                spawn load: reserve slot ──► start ──► ready
//!                               │
//!              stop of this key pending? wait for it
//!                   full? stop oldest first
//! ```
//!
//! Loads run on their own task; a caller giving up does not cancel one.
//! Concurrent callers for one key share a single load. One deadline bounds
//! the whole load, from slot wait to readiness.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::orchestrator::{OrchestratorError, ProcessOrchestrator, WorkerStatus};
use super::types::{PoolConfig, PoolStats, Readiness, WorkerHandle, WorkerKey};
use crate::error::GatewayError;

type LoadOutcome = Result<Arc<WorkerHandle>, GatewayError>;
type SharedLoad = Shared<BoxFuture<'static, LoadOutcome>>;

#[derive(Default)]
struct PoolState {
    handles: HashMap<WorkerKey, Arc<WorkerHandle>>,
    loading: HashMap<WorkerKey, SharedLoad>,
    /// Stops in flight per key
    evicting: HashMap<WorkerKey, usize>,
    /// When the pool last stopped each key; older listings may still show it
    stopped_at: HashMap<WorkerKey, Instant>,
    /// Slots claimed by loads that have not finished yet
    reserved: usize,
}

impl PoolState {
    fn occupied(&self) -> usize {
        self.handles.len() + self.reserved
    }

    /// Eviction victim: oldest start time, ties broken by key
    fn oldest(&self) -> Option<WorkerKey> {
        self.handles
            .values()
            .min_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.key.cmp(&b.key)))
            .map(|handle| handle.key.clone())
    }

    /// Remove a handle and mark its stop as pending
    fn detach(&mut self, key: &WorkerKey) -> bool {
        let removed = self.handles.remove(key).is_some();
        if removed {
            self.begin_stop(key);
        }
        removed
    }

    fn begin_stop(&mut self, key: &WorkerKey) {
        *self.evicting.entry(key.clone()).or_insert(0) += 1;
    }

    fn end_stop(&mut self, key: &WorkerKey) {
        if let Entry::Occupied(mut pending) = self.evicting.entry(key.clone()) {
            *pending.get_mut() -= 1;
            if *pending.get() == 0 {
                pending.remove();
            }
        }
    }
}

/// One orchestrator listing, stamped with when it was requested
struct Observation {
    observed_at: Instant,
    statuses: HashMap<WorkerKey, WorkerStatus>,
}

impl Observation {
    fn new(observed_at: Instant, listing: Vec<WorkerStatus>) -> Self {
        let mut statuses: HashMap<WorkerKey, WorkerStatus> = HashMap::new();
        for status in listing {
            match statuses.entry(status.key.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(status);
                }
                Entry::Occupied(mut entry) => {
                    if status.healthy && !entry.get().healthy {
                        entry.insert(status);
                    }
                }
            }
        }
        Self {
            observed_at,
            statuses,
        }
    }

    fn is_healthy(&self, key: &WorkerKey) -> bool {
        self.statuses.get(key).map_or(false, |s| s.healthy)
    }

    fn is_listed_unhealthy(&self, key: &WorkerKey) -> bool {
        self.statuses.get(key).map_or(false, |s| !s.healthy)
    }
}

enum Lookup {
    Loaded(Arc<WorkerHandle>),
    Pending(SharedLoad),
}

enum Reservation {
    Free,
    Evicted(WorkerKey),
    Full,
    /// A stop for the same key has not finished yet
    StopPending,
}

/// Bounded cache of live OCR workers
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    orchestrator: Arc<dyn ProcessOrchestrator>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    /// Signalled whenever a slot or a stop completes
    slot_freed: Notify,
}

impl WorkerPool {
    /// Create a pool over an orchestrator
    pub fn new(orchestrator: Arc<dyn ProcessOrchestrator>, config: PoolConfig) -> Self {
        let config = PoolConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        tracing::info!(
            orchestrator = orchestrator.name(),
            capacity = config.capacity,
            load_timeout_secs = config.load_timeout.as_secs(),
            "Worker pool initialized"
        );

        Self {
            inner: Arc::new(PoolInner {
                orchestrator,
                config,
                state: Mutex::new(PoolState::default()),
                slot_freed: Notify::new(),
            }),
        }
    }

    /// Maximum number of live workers
    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    /// Return a ready worker for the key, loading it if needed
    ///
    /// At most one load per key is in flight; every concurrent caller
    /// receives the same handle or the same error.
    pub async fn ensure_loaded(&self, key: &WorkerKey) -> Result<Arc<WorkerHandle>, GatewayError> {
        let observation = self.observe().await.map_err(|e| GatewayError::LoadFailed {
            key: key.clone(),
            reason: format!("Failed to list workers: {}", e),
        })?;
        let restart = observation.is_listed_unhealthy(key);

        let lookup = {
            let mut state = self.inner.state.lock();
            self.reconcile(&mut state, &observation);

            if let Some(handle) = state.handles.get(key) {
                Lookup::Loaded(handle.clone())
            } else if let Some(load) = state.loading.get(key) {
                tracing::debug!(key = %key, "Joining in-flight load");
                Lookup::Pending(load.clone())
            } else {
                let load = self.spawn_load(key.clone(), restart);
                state.loading.insert(key.clone(), load.clone());
                Lookup::Pending(load)
            }
        };

        match lookup {
            Lookup::Loaded(handle) => {
                tracing::debug!(key = %key, "Worker already loaded");
                Ok(handle)
            }
            Lookup::Pending(load) => load.await,
        }
    }

    /// Stop a worker and drop its handle
    ///
    /// The stop is issued even when the pool holds no handle for the key.
    /// A load in flight for the key finishes first, so the stop never races
    /// a start. Returns whether a handle was removed.
    pub async fn evict(&self, key: &WorkerKey) -> bool {
        let removed = loop {
            let pending = {
                let mut state = self.inner.state.lock();
                match state.loading.get(key) {
                    Some(load) => load.clone(),
                    None => {
                        let removed = state.handles.remove(key).is_some();
                        state.begin_stop(key);
                        break removed;
                    }
                }
            };
            tracing::debug!(key = %key, "Waiting for in-flight load before evicting");
            let _ = pending.await;
        };
        if removed {
            self.inner.slot_freed.notify_waiters();
        }
        tracing::info!(key = %key, held = removed, "Evicting worker");

        let pool = self.clone();
        let victim = key.clone();
        let stop = tokio::spawn(async move { pool.stop_detached(victim).await });
        if let Err(e) = stop.await {
            tracing::error!(key = %key, error = %e, "Eviction task failed");
        }
        removed
    }

    /// Keys of workers that are live, after reconciling with the orchestrator
    pub async fn list_loaded(&self) -> Result<BTreeSet<WorkerKey>, GatewayError> {
        let observation = self
            .observe()
            .await
            .map_err(|e| GatewayError::InternalError(format!("Failed to list workers: {}", e)))?;

        let mut state = self.inner.state.lock();
        self.reconcile(&mut state, &observation);
        Ok(state.handles.keys().cloned().collect())
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            loaded: state.handles.len(),
            capacity: self.inner.config.capacity,
            loading: state.loading.len(),
            evicting: state.evicting.len(),
        }
    }

    async fn observe(&self) -> Result<Observation, OrchestratorError> {
        let observed_at = Instant::now();
        let listing = self.inner.orchestrator.list().await?;
        Ok(Observation::new(observed_at, listing))
    }

    /// Bring pool state in line with an orchestrator listing
    fn reconcile(&self, state: &mut PoolState, observation: &Observation) {
        let observed_at = observation.observed_at;

        // Listings requested after a stop finished reflect it
        state.stopped_at.retain(|_, stopped| *stopped > observed_at);

        let stale: Vec<WorkerKey> = state
            .handles
            .values()
            .filter(|handle| {
                !observation.is_healthy(&handle.key) && self.confirmed_gone(handle, observed_at)
            })
            .map(|handle| handle.key.clone())
            .collect();
        for key in &stale {
            state.handles.remove(key);
            tracing::warn!(key = %key, "Worker no longer live, dropping handle");
        }

        for status in observation.statuses.values() {
            let key = &status.key;
            if !status.healthy
                || state.handles.contains_key(key)
                || state.loading.contains_key(key)
                || state.evicting.contains_key(key)
                || state.stopped_at.contains_key(key)
            {
                continue;
            }
            tracing::info!(key = %key, runtime_ref = %status.runtime_ref, "Adopting live worker");
            let handle = WorkerHandle::adopted(
                key.clone(),
                status.runtime_ref.clone(),
                status.started_at,
                observed_at,
            );
            state.handles.insert(key.clone(), Arc::new(handle));
        }

        let mut surplus = Vec::new();
        while state.occupied() > self.inner.config.capacity {
            match state.oldest() {
                Some(victim) => {
                    state.detach(&victim);
                    surplus.push(victim);
                }
                None => break,
            }
        }

        if !stale.is_empty() {
            self.inner.slot_freed.notify_waiters();
        }
        for victim in surplus {
            tracing::warn!(key = %victim, "Pool over capacity, evicting adopted surplus");
            let pool = self.clone();
            tokio::spawn(async move { pool.stop_detached(victim).await });
        }
    }

    /// Whether a handle missing from a listing is really gone
    ///
    /// Workers the pool started get a grace period, since a listing can
    /// lag behind a start.
    fn confirmed_gone(&self, handle: &WorkerHandle, observed_at: Instant) -> bool {
        let age = match observed_at.checked_duration_since(handle.registered_at) {
            Some(age) => age,
            None => return false,
        };
        match handle.readiness {
            Readiness::Ready => age >= self.inner.config.reconcile_grace,
            Readiness::Adopted => age > Duration::ZERO,
        }
    }

    fn spawn_load(&self, key: WorkerKey, restart: bool) -> SharedLoad {
        let pool = self.clone();
        let task = tokio::spawn(async move { pool.run_load(key, restart).await });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(GatewayError::InternalError(format!("Worker load task failed: {}", e)))
            })
        }
        .boxed()
        .shared()
    }

    async fn run_load(self, key: WorkerKey, restart: bool) -> LoadOutcome {
        let began = Instant::now();
        let deadline = tokio::time::Instant::now() + self.inner.config.load_timeout;
        tracing::info!(key = %key, "Loading worker");

        if let Err(e) = self.reserve_slot(&key, deadline).await {
            self.inner.state.lock().loading.remove(&key);
            tracing::warn!(key = %key, error = %e, "No pool slot became free");
            return Err(e);
        }

        if restart {
            tracing::info!(key = %key, "Stopping unhealthy worker before restart");
            if let Err(e) = self.inner.orchestrator.stop(&key).await {
                tracing::warn!(key = %key, error = %e, "Failed to stop unhealthy worker");
            }
        }

        let started = self.start_worker(&key, deadline).await;

        let outcome = {
            let mut state = self.inner.state.lock();
            state.loading.remove(&key);
            state.reserved = state.reserved.saturating_sub(1);
            started.map(|runtime_ref| {
                let handle = Arc::new(WorkerHandle::ready(key.clone(), runtime_ref));
                state.handles.insert(key.clone(), handle.clone());
                handle
            })
        };
        self.inner.slot_freed.notify_waiters();

        match &outcome {
            Ok(handle) => tracing::info!(
                key = %key,
                runtime_ref = %handle.runtime_ref,
                elapsed_ms = began.elapsed().as_millis() as u64,
                "Worker loaded"
            ),
            Err(e) => tracing::warn!(key = %key, error = %e, "Worker load failed"),
        }
        outcome
    }

    /// Claim a slot, stopping the oldest worker when the pool is full
    ///
    /// A stop still running for the same key is waited out first, or it
    /// would kill the worker about to start. When every slot belongs to an
    /// in-flight load there is nothing to evict, so wait for one to finish.
    async fn reserve_slot(
        &self,
        key: &WorkerKey,
        deadline: tokio::time::Instant,
    ) -> Result<(), GatewayError> {
        loop {
            let notified = self.inner.slot_freed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let reservation = {
                let mut state = self.inner.state.lock();
                if state.evicting.contains_key(key) {
                    Reservation::StopPending
                } else if state.occupied() < self.inner.config.capacity {
                    state.reserved += 1;
                    Reservation::Free
                } else if let Some(victim) = state.oldest() {
                    state.detach(&victim);
                    state.reserved += 1;
                    Reservation::Evicted(victim)
                } else {
                    Reservation::Full
                }
            };

            match reservation {
                Reservation::Free => return Ok(()),
                Reservation::Evicted(victim) => {
                    tracing::info!(key = %key, victim = %victim, "Pool full, evicting oldest worker");
                    self.stop_detached(victim).await;
                    return Ok(());
                }
                Reservation::Full => {
                    tracing::debug!(key = %key, "All slots are loading, waiting");
                }
                Reservation::StopPending => {
                    tracing::debug!(key = %key, "Stop of this worker still running, waiting");
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(self.timeout_error(key));
            }
        }
    }

    fn timeout_error(&self, key: &WorkerKey) -> GatewayError {
        GatewayError::LoadTimeout {
            key: key.clone(),
            secs: self.inner.config.load_timeout.as_secs(),
        }
    }

    /// Start a worker and wait for it to become ready, both before `deadline`
    async fn start_worker(
        &self,
        key: &WorkerKey,
        deadline: tokio::time::Instant,
    ) -> Result<String, GatewayError> {
        let start = self.inner.orchestrator.start(key);
        let started = match tokio::time::timeout_at(deadline, start).await {
            Ok(Ok(started)) => started,
            Ok(Err(e)) => {
                return Err(GatewayError::LoadFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                self.discard(key).await;
                return Err(self.timeout_error(key));
            }
        };

        match tokio::time::timeout_at(deadline, started.ready).await {
            Ok(Ok(())) => Ok(started.runtime_ref),
            Ok(Err(e)) => {
                self.discard(key).await;
                Err(GatewayError::LoadFailed {
                    key: key.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                self.discard(key).await;
                Err(self.timeout_error(key))
            }
        }
    }

    /// Best-effort stop of a worker that never became ready
    async fn discard(&self, key: &WorkerKey) {
        if let Err(e) = self.inner.orchestrator.stop(key).await {
            tracing::warn!(key = %key, error = %e, "Failed to stop worker that never became ready");
        }
        self.inner.state.lock().stopped_at.insert(key.clone(), Instant::now());
    }

    /// Stop a detached worker; its slot is released whatever the outcome
    async fn stop_detached(&self, key: WorkerKey) {
        match self.inner.orchestrator.stop(&key).await {
            Ok(()) => tracing::info!(key = %key, "Worker stopped"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to stop worker, releasing slot anyway"),
        }

        {
            let mut state = self.inner.state.lock();
            state.end_stop(&key);
            state.stopped_at.insert(key, Instant::now());
        }
        self.inner.slot_freed.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Language, Modality};
    use crate::pool::orchestrator::mock::{Call, MockOrchestrator};
    use chrono::Utc;

    fn key(version: &str) -> WorkerKey {
        WorkerKey::new(Modality::Printed, Language::Hi, version)
    }

    fn pool(mock: &Arc<MockOrchestrator>, config: PoolConfig) -> WorkerPool {
        WorkerPool::new(mock.clone(), config)
    }

    fn capacity(capacity: usize) -> PoolConfig {
        PoolConfig {
            capacity,
            ..PoolConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_load() {
        let mock = Arc::new(MockOrchestrator::new().with_start_delay(Duration::from_millis(50)));
        let pool = pool(&mock, capacity(2));
        let k = key("v4.1");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let k = k.clone();
                tokio::spawn(async move { pool.ensure_loaded(&k).await })
            })
            .collect();

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(mock.starts(), vec![k.clone()]);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
        assert_eq!(handles[0].readiness, Readiness::Ready);
        assert_eq!(pool.stats().loaded, 1);
        assert_eq!(pool.stats().loading, 0);
    }

    #[tokio::test]
    async fn test_full_pool_stops_oldest_before_starting() {
        let mock = Arc::new(MockOrchestrator::new());
        let pool = pool(&mock, capacity(2));
        let (a, b, c) = (key("v4.1"), key("v4.2"), key("v4.3u"));

        pool.ensure_loaded(&a).await.unwrap();
        pool.ensure_loaded(&b).await.unwrap();
        pool.ensure_loaded(&c).await.unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                Call::Start(a.clone()),
                Call::Start(b.clone()),
                Call::Stop(a.clone()),
                Call::Start(c.clone()),
            ]
        );
        let loaded = pool.list_loaded().await.unwrap();
        assert_eq!(loaded, BTreeSet::from([b.clone(), c.clone()]));

        // Already loaded: no orchestrator work
        pool.ensure_loaded(&b).await.unwrap();
        assert_eq!(mock.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_adopts_live_worker_without_starting() {
        let mock = Arc::new(MockOrchestrator::new());
        let k = key("v4.1");
        mock.set_live(&k, true, None);
        let pool = pool(&mock, PoolConfig::default());

        let handle = pool.ensure_loaded(&k).await.unwrap();

        assert_eq!(handle.readiness, Readiness::Adopted);
        assert!(mock.starts().is_empty());
    }

    #[tokio::test]
    async fn test_adoption_over_capacity_evicts_oldest() {
        let mock = Arc::new(MockOrchestrator::new());
        let (a, b) = (key("v4.1"), key("v4.2"));
        mock.set_live(&a, true, Some(Utc::now() - chrono::Duration::minutes(10)));
        mock.set_live(&b, true, Some(Utc::now() - chrono::Duration::minutes(1)));
        let pool = pool(&mock, capacity(1));

        let loaded = pool.list_loaded().await.unwrap();
        assert_eq!(loaded, BTreeSet::from([b.clone()]));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mock.stops(), vec![a]);
        assert_eq!(pool.stats().evicting, 0);
    }

    #[tokio::test]
    async fn test_reloads_after_external_crash() {
        let mock = Arc::new(MockOrchestrator::new());
        let pool = pool(
            &mock,
            PoolConfig {
                reconcile_grace: Duration::ZERO,
                ..PoolConfig::default()
            },
        );
        let k = key("v4.1");

        let first = pool.ensure_loaded(&k).await.unwrap();
        mock.crash(&k);
        let second = pool.ensure_loaded(&k).await.unwrap();

        assert_eq!(mock.starts(), vec![k.clone(), k.clone()]);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_unlisted_worker_kept_within_grace() {
        let mock = Arc::new(MockOrchestrator::new());
        let pool = pool(&mock, PoolConfig::default());
        let k = key("v4.1");

        pool.ensure_loaded(&k).await.unwrap();
        mock.crash(&k);
        pool.ensure_loaded(&k).await.unwrap();

        assert_eq!(mock.starts().len(), 1);
    }

    #[tokio::test]
    async fn test_unhealthy_worker_is_restarted() {
        let mock = Arc::new(MockOrchestrator::new());
        let k = key("v4.1");
        mock.set_live(&k, false, None);
        let pool = pool(&mock, PoolConfig::default());

        pool.ensure_loaded(&k).await.unwrap();

        assert_eq!(mock.calls(), vec![Call::Stop(k.clone()), Call::Start(k)]);
    }

    #[tokio::test]
    async fn test_load_timeout_releases_slot() {
        let mock = Arc::new(MockOrchestrator::new());
        let (stuck, other) = (key("v4.1"), key("v4.2"));
        mock.never_ready(&stuck);
        let pool = pool(
            &mock,
            PoolConfig {
                capacity: 1,
                load_timeout: Duration::from_millis(50),
                ..PoolConfig::default()
            },
        );

        let result = pool.ensure_loaded(&stuck).await;
        assert!(matches!(result, Err(GatewayError::LoadTimeout { ref key, .. }) if key == &stuck));
        assert_eq!(mock.stops(), vec![stuck.clone()]);
        assert_eq!(pool.stats().loaded, 0);
        assert_eq!(pool.stats().loading, 0);

        pool.ensure_loaded(&other).await.unwrap();
        assert_eq!(mock.stops(), vec![stuck]);
    }

    #[tokio::test]
    async fn test_start_failure_is_reported_and_retried() {
        let mock = Arc::new(MockOrchestrator::new());
        let k = key("v4.1");
        mock.fail_start(&k);
        let pool = pool(&mock, PoolConfig::default());

        let first = pool.ensure_loaded(&k).await;
        assert!(matches!(first, Err(GatewayError::LoadFailed { .. })));
        let second = pool.ensure_loaded(&k).await;
        assert!(matches!(second, Err(GatewayError::LoadFailed { .. })));

        assert_eq!(mock.starts().len(), 2);
        assert_eq!(pool.stats().loaded, 0);
    }

    #[tokio::test]
    async fn test_failed_stop_still_frees_slot() {
        let mock = Arc::new(MockOrchestrator::new());
        let (a, b) = (key("v4.1"), key("v4.2"));
        mock.fail_stop(&a);
        let pool = pool(&mock, capacity(1));

        pool.ensure_loaded(&a).await.unwrap();
        pool.ensure_loaded(&b).await.unwrap();

        assert_eq!(mock.stops(), vec![a]);
        let stats = pool.stats();
        assert_eq!(stats.loaded, 1);
        assert_eq!(stats.evicting, 0);
    }

    #[tokio::test]
    async fn test_cancelled_caller_does_not_abort_load() {
        let mock = Arc::new(MockOrchestrator::new().with_start_delay(Duration::from_millis(100)));
        let pool = pool(&mock, PoolConfig::default());
        let k = key("v4.1");

        let gave_up = tokio::time::timeout(Duration::from_millis(10), pool.ensure_loaded(&k)).await;
        assert!(gave_up.is_err());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(pool.stats().loaded, 1);
        assert_eq!(pool.stats().loading, 0);

        pool.ensure_loaded(&k).await.unwrap();
        assert_eq!(mock.starts().len(), 1);
    }

    #[tokio::test]
    async fn test_load_waits_for_in_flight_slot() {
        let mock = Arc::new(MockOrchestrator::new().with_start_delay(Duration::from_millis(50)));
        let pool = pool(&mock, capacity(1));
        let (a, b) = (key("v4.1"), key("v4.2"));

        let first = {
            let pool = pool.clone();
            let a = a.clone();
            tokio::spawn(async move { pool.ensure_loaded(&a).await })
        };
        let second = {
            let pool = pool.clone();
            let b = b.clone();
            tokio::spawn(async move { pool.ensure_loaded(&b).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(mock.starts().len(), 2);
        assert_eq!(mock.stops().len(), 1);
        assert_eq!(pool.list_loaded().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_evict() {
        let mock = Arc::new(MockOrchestrator::new());
        let pool = pool(&mock, PoolConfig::default());
        let k = key("v4.1");

        pool.ensure_loaded(&k).await.unwrap();
        assert!(pool.evict(&k).await);
        assert!(pool.list_loaded().await.unwrap().is_empty());

        // Not held, but the stop is still issued
        assert!(!pool.evict(&k).await);
        assert_eq!(mock.stops(), vec![k.clone(), k]);
    }

    #[tokio::test]
    async fn test_reload_waits_for_pending_stop() {
        let mock = Arc::new(MockOrchestrator::new());
        let pool = pool(&mock, PoolConfig::default());
        let k = key("v4.1");
        mock.slow_stop(&k, Duration::from_millis(100));

        pool.ensure_loaded(&k).await.unwrap();
        let eviction = {
            let pool = pool.clone();
            let k = k.clone();
            tokio::spawn(async move { pool.evict(&k).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let handle = pool.ensure_loaded(&k).await.unwrap();
        assert!(eviction.await.unwrap());

        assert_eq!(handle.readiness, Readiness::Ready);
        assert_eq!(
            mock.calls(),
            vec![Call::Start(k.clone()), Call::Stop(k.clone()), Call::Start(k.clone())]
        );
        assert!(mock.is_live(&k));
        assert_eq!(pool.list_loaded().await.unwrap(), BTreeSet::from([k]));
    }

    #[tokio::test]
    async fn test_reload_waits_for_surplus_stop() {
        let mock = Arc::new(MockOrchestrator::new());
        let (a, b) = (key("v4.1"), key("v4.2"));
        mock.set_live(&a, true, Some(Utc::now() - chrono::Duration::minutes(10)));
        mock.set_live(&b, true, Some(Utc::now() - chrono::Duration::minutes(1)));
        mock.slow_stop(&a, Duration::from_millis(100));
        let pool = pool(&mock, capacity(1));

        // Adopting both overflows the pool; a is stopped in the background
        pool.list_loaded().await.unwrap();
        let handle = pool.ensure_loaded(&a).await.unwrap();

        assert_eq!(handle.readiness, Readiness::Ready);
        assert_eq!(
            mock.calls(),
            vec![Call::Stop(a.clone()), Call::Stop(b.clone()), Call::Start(a.clone())]
        );
        assert!(mock.is_live(&a));
        assert_eq!(pool.list_loaded().await.unwrap(), BTreeSet::from([a]));
    }

    #[tokio::test]
    async fn test_unload_during_load_waits_for_it() {
        let mock = Arc::new(MockOrchestrator::new().with_start_delay(Duration::from_millis(50)));
        let pool = pool(&mock, PoolConfig::default());
        let k = key("v4.1");

        let load = {
            let pool = pool.clone();
            let k = k.clone();
            tokio::spawn(async move { pool.ensure_loaded(&k).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(pool.evict(&k).await);
        load.await.unwrap().unwrap();

        assert_eq!(mock.calls(), vec![Call::Start(k.clone()), Call::Stop(k.clone())]);
        assert!(!mock.is_live(&k));
        assert!(pool.list_loaded().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_deadline_covers_eviction_and_readiness() {
        let mock = Arc::new(MockOrchestrator::new());
        let (old, stuck) = (key("v4.1"), key("v4.2"));
        mock.slow_stop(&old, Duration::from_millis(150));
        mock.never_ready(&stuck);
        let pool = pool(
            &mock,
            PoolConfig {
                capacity: 1,
                load_timeout: Duration::from_millis(200),
                ..PoolConfig::default()
            },
        );
        pool.ensure_loaded(&old).await.unwrap();

        let began = Instant::now();
        let result = pool.ensure_loaded(&stuck).await;
        let elapsed = began.elapsed();

        assert!(matches!(result, Err(GatewayError::LoadTimeout { ref key, .. }) if key == &stuck));
        assert!(elapsed < Duration::from_millis(300), "load took {:?}", elapsed);
        assert_eq!(mock.stops(), vec![old, stuck]);
    }
}
