//! Request dispatcher
//!
//! ```text
//!  OcrRequest ──► validate ──► ensure_loaded ──► workspace + images
//!                                                      │
//!      Vec<OcrResult> ◄── assemble ◄── worker.infer ◄──┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::output::assemble_results;
use super::types::{OcrRequest, OcrResult};
use super::worker::{WorkerClient, WorkerJob};
use super::workspace::RequestWorkspace;
use crate::capability::CapabilityRegistry;
use crate::error::Result;
use crate::pool::WorkerPool;

/// Routes OCR batches to pooled workers
#[derive(Clone)]
pub struct Dispatcher {
    registry: CapabilityRegistry,
    pool: WorkerPool,
    worker: Arc<dyn WorkerClient>,
    workspace_root: PathBuf,
}

impl Dispatcher {
    pub fn new(
        registry: CapabilityRegistry,
        pool: WorkerPool,
        worker: Arc<dyn WorkerClient>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            pool,
            worker,
            workspace_root: workspace_root.into(),
        }
    }

    /// Run one OCR batch, returning one result per image in input order
    pub async fn dispatch(&self, request: OcrRequest) -> Result<Vec<OcrResult>> {
        let began = Instant::now();
        self.registry
            .validate(request.modality, request.language, &request.version)?;

        let key = request.key();
        if request.images.is_empty() {
            tracing::debug!(key = %key, "Empty batch, nothing to dispatch");
            return Ok(Vec::new());
        }

        if request.preloaded {
            tracing::debug!(key = %key, "Caller reports worker preloaded, skipping load");
        } else {
            self.pool.ensure_loaded(&key).await?;
        }

        let workspace = RequestWorkspace::create(&self.workspace_root).await?;
        let image_count = request.images.len();
        let outcome = self.run_in(&workspace, request).await;
        let workspace_id = workspace.id();
        workspace.remove().await;
        let results = outcome?;

        tracing::info!(
            key = %key,
            workspace = %workspace_id,
            images = image_count,
            elapsed_ms = began.elapsed().as_millis() as u64,
            "OCR batch complete"
        );
        Ok(results)
    }

    /// Write the batch into the workspace, run the worker and order its output
    async fn run_in(
        &self,
        workspace: &RequestWorkspace,
        request: OcrRequest,
    ) -> Result<Vec<OcrResult>> {
        workspace.write_images(&request.images).await?;

        let image_count = request.images.len();
        let job = WorkerJob {
            key: request.key(),
            level: request.level,
            workspace: workspace.path().to_path_buf(),
            image_count,
            params: request.params,
        };
        let output = self.worker.infer(job).await?;
        assemble_results(output, image_count, request.omit_meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Language, Modality};
    use crate::dispatch::worker::WorkerOutput;
    use crate::error::GatewayError;
    use crate::pool::mock::MockOrchestrator;
    use crate::pool::PoolConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tempfile::TempDir;

    /// Returns a fixed output and records what it saw
    struct MockWorker {
        output: WorkerOutput,
        jobs: Mutex<Vec<WorkerJob>>,
        images_seen: Mutex<Vec<usize>>,
    }

    impl MockWorker {
        fn new(text: serde_json::Value, meta: Option<serde_json::Value>) -> Self {
            Self {
                output: WorkerOutput { text, meta },
                jobs: Mutex::new(Vec::new()),
                images_seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.jobs.lock().len()
        }
    }

    #[async_trait]
    impl WorkerClient for MockWorker {
        async fn infer(&self, job: WorkerJob) -> Result<WorkerOutput> {
            let images = std::fs::read_dir(&job.workspace)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .filter(|e| e.path().extension().map_or(false, |ext| ext == "jpg"))
                        .count()
                })
                .unwrap_or(0);
            self.images_seen.lock().push(images);
            self.jobs.lock().push(job);
            Ok(self.output.clone())
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        orchestrator: Arc<MockOrchestrator>,
        worker: Arc<MockWorker>,
        root: TempDir,
    }

    fn fixture(worker: MockWorker) -> Fixture {
        let root = TempDir::new().unwrap();
        let orchestrator = Arc::new(MockOrchestrator::new());
        let worker = Arc::new(worker);
        let pool = WorkerPool::new(orchestrator.clone(), PoolConfig::default());
        let dispatcher = Dispatcher::new(
            CapabilityRegistry::default(),
            pool,
            worker.clone(),
            root.path(),
        );
        Fixture {
            dispatcher,
            orchestrator,
            worker,
            root,
        }
    }

    fn request(images: usize) -> OcrRequest {
        let images = (0..images).map(|i| format!("image-{}", i).into_bytes()).collect();
        OcrRequest::new(images, Modality::Printed, Language::Hi, "v4.1")
    }

    fn workspace_entries(root: &TempDir) -> usize {
        std::fs::read_dir(root.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_dispatch_orders_results() {
        let f = fixture(MockWorker::new(
            json!({"2.jpg": "b", "0.jpg": "a", "1.jpg": "c"}),
            None,
        ));

        let results = f.dispatcher.dispatch(request(3)).await.unwrap();

        let texts: Vec<_> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "c", "b"]);
        assert_eq!(f.orchestrator.starts().len(), 1);
        assert_eq!(*f.worker.images_seen.lock(), vec![3]);
        assert_eq!(workspace_entries(&f.root), 0);
    }

    #[tokio::test]
    async fn test_meta_returned_unless_omitted() {
        let f = fixture(MockWorker::new(
            json!({"0.jpg": "a"}),
            Some(json!({"0.jpg": {"conf": 0.8}})),
        ));

        let mut with_meta = request(1);
        with_meta.omit_meta = false;
        let results = f.dispatcher.dispatch(with_meta).await.unwrap();
        assert_eq!(results[0].meta.get("conf"), Some(&json!(0.8)));

        let results = f.dispatcher.dispatch(request(1)).await.unwrap();
        assert!(results[0].meta.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_request_touches_nothing() {
        let f = fixture(MockWorker::new(json!({}), None));

        let mut unknown = request(1);
        unknown.version = "v9".into();
        let result = f.dispatcher.dispatch(unknown).await;
        assert!(matches!(result, Err(GatewayError::UnknownVersion(_))));

        let mut unsupported = request(1);
        unsupported.language = Language::Sa;
        let result = f.dispatcher.dispatch(unsupported).await;
        assert!(matches!(result, Err(GatewayError::NoModelForCombination { .. })));

        assert!(f.orchestrator.calls().is_empty());
        assert_eq!(f.worker.calls(), 0);
    }

    #[tokio::test]
    async fn test_image_transfer_fails_fast() {
        let f = fixture(MockWorker::new(json!({}), None));
        let mut batch = request(5);
        batch.images[3].clear();

        let result = f.dispatcher.dispatch(batch).await;

        assert!(matches!(result, Err(GatewayError::ImageTransferError(3))));
        assert_eq!(f.worker.calls(), 0);
        assert_eq!(workspace_entries(&f.root), 0);
    }

    #[tokio::test]
    async fn test_preloaded_skips_load() {
        let f = fixture(MockWorker::new(json!({"0.jpg": "a"}), None));
        let mut batch = request(1);
        batch.preloaded = true;

        f.dispatcher.dispatch(batch).await.unwrap();

        assert!(f.orchestrator.starts().is_empty());
        assert_eq!(f.worker.calls(), 1);
    }

    #[tokio::test]
    async fn test_params_and_level_forwarded() {
        let f = fixture(MockWorker::new(json!({"0.jpg": "a"}), None));
        let mut batch = request(1);
        batch.level = crate::dispatch::Level::Line;
        batch.params.insert("beam".into(), json!(5));

        f.dispatcher.dispatch(batch).await.unwrap();

        let jobs = f.worker.jobs.lock();
        assert_eq!(jobs[0].level, crate::dispatch::Level::Line);
        assert_eq!(jobs[0].params.get("beam"), Some(&json!(5)));
        assert_eq!(jobs[0].key.to_string(), "printed-hi-v4.1");
    }

    #[tokio::test]
    async fn test_bad_worker_output_is_parse_error() {
        let f = fixture(MockWorker::new(json!({"0.jpg": "a"}), None));

        let result = f.dispatcher.dispatch(request(2)).await;

        assert!(matches!(result, Err(GatewayError::OutputParseError(_))));
        assert_eq!(workspace_entries(&f.root), 0);
    }
}
