//! Docker-backed orchestrator
//!
//! Workers run as containers named `<prefix>-<modality>-<language>-<version>`.
//! A load script starts the container, `docker stop` removes it, and
//! `docker container ls` is the live listing. Readiness polls also list
//! exited containers so a worker that dies during startup fails fast.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::process::Command;

use super::orchestrator::{OrchestratorError, ProcessOrchestrator, StartedWorker, WorkerStatus};
use super::types::WorkerKey;

/// Format string handed to `docker container ls`
const LIST_FORMAT: &str = "{{.Names}}\t{{.Status}}\t{{.CreatedAt}}";

/// Docker orchestrator settings
#[derive(Debug, Clone)]
pub struct DockerSettings {
    /// Docker CLI binary
    pub docker_bin: String,
    /// Container name prefix identifying OCR workers
    pub name_prefix: String,
    /// Script invoked as `<script> <modality> <language> <version> <workspace_root>`
    pub load_script: PathBuf,
    /// Directory mounted into workers for request images
    pub workspace_root: PathBuf,
    /// Interval between readiness polls
    pub poll_interval: Duration,
    /// How long a started container may be missing from the listing
    pub start_grace: Duration,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            name_prefix: "infer".to_string(),
            load_script: PathBuf::from("./load.sh"),
            workspace_root: PathBuf::from("./images"),
            poll_interval: Duration::from_millis(500),
            start_grace: Duration::from_secs(5),
        }
    }
}

impl DockerSettings {
    /// Container name for a worker key
    pub fn container_name(&self, key: &WorkerKey) -> String {
        format!("{}-{}", self.name_prefix, key)
    }
}

/// Orchestrator driving workers through the docker CLI
#[derive(Clone)]
pub struct DockerOrchestrator {
    settings: Arc<DockerSettings>,
}

impl DockerOrchestrator {
    pub fn new(settings: DockerSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

#[async_trait]
impl ProcessOrchestrator for DockerOrchestrator {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn start(&self, key: &WorkerKey) -> Result<StartedWorker, OrchestratorError> {
        let settings = &self.settings;
        tracing::debug!(key = %key, script = %settings.load_script.display(), "Running load script");

        let mut command = Command::new(&settings.load_script);
        command
            .arg(key.modality.as_str())
            .arg(key.language.code())
            .arg(&key.version)
            .arg(&settings.workspace_root);
        run(command).await?;

        let ready_settings = self.settings.clone();
        let ready_key = key.clone();
        let ready = async move { wait_until_healthy(&ready_settings, &ready_key).await }.boxed();

        Ok(StartedWorker {
            runtime_ref: settings.container_name(key),
            ready,
        })
    }

    async fn stop(&self, key: &WorkerKey) -> Result<(), OrchestratorError> {
        let mut command = Command::new(&self.settings.docker_bin);
        command.arg("stop").arg(self.settings.container_name(key));
        run(command).await.map(|_| ())
    }

    async fn list(&self) -> Result<Vec<WorkerStatus>, OrchestratorError> {
        list_containers(&self.settings).await
    }
}

/// What one readiness poll saw of a starting container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Startup {
    Ready,
    Starting,
    Exited,
    Missing,
}

/// Poll the listing until the key shows up healthy, or is gone
async fn wait_until_healthy(
    settings: &DockerSettings,
    key: &WorkerKey,
) -> Result<(), OrchestratorError> {
    let name = settings.container_name(key);
    let began = Instant::now();
    loop {
        let mut command = Command::new(&settings.docker_bin);
        command.args(["container", "ls", "--all", "--format", LIST_FORMAT]);
        let output = run(command).await?;

        let startup = startup_state(&output, &name);
        if let Some(outcome) = poll_outcome(startup, began.elapsed(), settings.start_grace, key) {
            return outcome;
        }
        tokio::time::sleep(settings.poll_interval).await;
    }
}

/// State of the named container in a `docker container ls --all` listing
fn startup_state(output: &str, name: &str) -> Startup {
    let status = output.lines().find_map(|line| {
        let mut fields = line.trim().split('\t');
        (fields.next()?.trim() == name).then(|| fields.next().unwrap_or("").trim())
    });

    match status {
        None => Startup::Missing,
        Some(status) if status.starts_with("Exited") || status.starts_with("Dead") => Startup::Exited,
        Some(status) if is_healthy(status) => Startup::Ready,
        Some(_) => Startup::Starting,
    }
}

/// Decide a readiness poll; `None` means poll again
///
/// An exited container fails at once. A missing one is given `grace` to
/// appear, since the load script may return before docker lists it.
fn poll_outcome(
    startup: Startup,
    waited: Duration,
    grace: Duration,
    key: &WorkerKey,
) -> Option<Result<(), OrchestratorError>> {
    match startup {
        Startup::Ready => Some(Ok(())),
        Startup::Starting => None,
        Startup::Missing if waited < grace => None,
        Startup::Exited | Startup::Missing => {
            tracing::warn!(key = %key, state = ?startup, "Worker container gone during startup");
            Some(Err(OrchestratorError::ExitedBeforeReady(key.clone())))
        }
    }
}

async fn list_containers(settings: &DockerSettings) -> Result<Vec<WorkerStatus>, OrchestratorError> {
    let mut command = Command::new(&settings.docker_bin);
    command.args(["container", "ls", "--format", LIST_FORMAT]);
    let stdout = run(command).await?;
    Ok(parse_listing(&stdout, &settings.name_prefix))
}

/// Run a command to completion, returning its stdout
async fn run(mut command: Command) -> Result<String, OrchestratorError> {
    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| OrchestratorError::CommandFailed(format!("Failed to spawn: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(OrchestratorError::CommandFailed(format!(
            "{}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `docker container ls` output into worker statuses
///
/// Lines for other containers, or with names that do not decode into a
/// worker key, are skipped.
pub fn parse_listing(output: &str, prefix: &str) -> Vec<WorkerStatus> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.trim().split('\t');
            let name = fields.next()?.trim();
            let status = fields.next().unwrap_or("").trim();
            let created = fields.next().unwrap_or("").trim();

            let key = match parse_container_name(name, prefix) {
                Some(key) => key,
                None => {
                    if !name.is_empty() {
                        tracing::trace!(name = name, "Skipping non-worker container");
                    }
                    return None;
                }
            };

            Some(WorkerStatus {
                key,
                healthy: is_healthy(status),
                runtime_ref: name.to_string(),
                started_at: parse_created_at(created),
            })
        })
        .collect()
}

/// Decode `<prefix>-<modality>-<language>-<version>`
pub fn parse_container_name(name: &str, prefix: &str) -> Option<WorkerKey> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;
    let mut parts = rest.splitn(3, '-');
    let modality = parts.next()?.parse().ok()?;
    let language = parts.next()?.parse().ok()?;
    let version = parts.next().filter(|v| !v.is_empty())?;
    Some(WorkerKey::new(modality, language, version))
}

fn is_healthy(status: &str) -> bool {
    status.starts_with("Up") && !status.contains("unhealthy") && !status.contains("health: starting")
}

/// Docker prints `2024-05-01 10:22:33 +0000 UTC`; the trailing zone name is dropped
fn parse_created_at(created: &str) -> Option<DateTime<Utc>> {
    let (timestamp, _zone) = created.rsplit_once(' ')?;
    DateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Language, Modality};

    #[test]
    fn test_container_name_round_trip() {
        let settings = DockerSettings::default();
        let key = WorkerKey::new(Modality::Printed, Language::Mni, "v4.1_robust");
        let name = settings.container_name(&key);
        assert_eq!(name, "infer-printed-mni-v4.1_robust");
        assert_eq!(parse_container_name(&name, "infer"), Some(key));
    }

    #[test]
    fn test_parse_container_name_rejects_foreign_names() {
        assert_eq!(parse_container_name("postgres", "infer"), None);
        assert_eq!(parse_container_name("inference-printed-en-v2", "infer"), None);
        assert_eq!(parse_container_name("infer-printed-xx-v2", "infer"), None);
        assert_eq!(parse_container_name("infer-printed-en-", "infer"), None);
        assert_eq!(parse_container_name("infer-printed-en", "infer"), None);
    }

    #[test]
    fn test_parse_listing() {
        let output = "\
infer-printed-hi-v4.1\tUp 3 minutes\t2024-05-01 10:22:33 +0000 UTC
redis\tUp 2 days\t2024-04-29 08:00:00 +0000 UTC
infer-handwritten-ta-v4_hw\tUp 10 seconds (health: starting)\t2024-05-01 10:25:00 +0000 UTC
infer-printed-ur-v5_urdu1\tUp 1 hour (unhealthy)\tgarbage
";
        let statuses = parse_listing(output, "infer");
        assert_eq!(statuses.len(), 3);

        assert_eq!(statuses[0].key, WorkerKey::new(Modality::Printed, Language::Hi, "v4.1"));
        assert!(statuses[0].healthy);
        assert_eq!(statuses[0].runtime_ref, "infer-printed-hi-v4.1");
        assert_eq!(
            statuses[0].started_at.unwrap().to_rfc3339(),
            "2024-05-01T10:22:33+00:00"
        );

        assert!(!statuses[1].healthy);
        assert!(!statuses[2].healthy);
        assert!(statuses[2].started_at.is_none());
    }

    #[test]
    fn test_parse_created_at_converts_offsets() {
        let parsed = parse_created_at("2024-05-01 15:52:33 +0530 IST").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-05-01T10:22:33+00:00");
    }

    #[test]
    fn test_startup_state() {
        let output = "\
infer-printed-hi-v4.1\tUp 3 seconds (health: starting)\t2024-05-01 10:22:33 +0000 UTC
infer-printed-hi-v4.2\tUp 2 minutes\t2024-05-01 10:20:00 +0000 UTC
infer-printed-hi-v4.3u\tExited (1) 3 seconds ago\t2024-05-01 10:22:30 +0000 UTC
infer-printed-hi-v4.4l\tCreated\t2024-05-01 10:22:35 +0000 UTC
infer-printed-hi-v4.5u\tDead\t2024-05-01 10:00:00 +0000 UTC
";
        assert_eq!(startup_state(output, "infer-printed-hi-v4.1"), Startup::Starting);
        assert_eq!(startup_state(output, "infer-printed-hi-v4.2"), Startup::Ready);
        assert_eq!(startup_state(output, "infer-printed-hi-v4.3u"), Startup::Exited);
        assert_eq!(startup_state(output, "infer-printed-hi-v4.4l"), Startup::Starting);
        assert_eq!(startup_state(output, "infer-printed-hi-v4.5u"), Startup::Exited);
        assert_eq!(startup_state(output, "infer-printed-hi-v4.1_robust"), Startup::Missing);
        assert_eq!(startup_state("", "infer-printed-hi-v4.1"), Startup::Missing);
    }

    #[test]
    fn test_poll_outcome_fails_fast_on_exit() {
        let key = WorkerKey::new(Modality::Printed, Language::Hi, "v4.3u");
        let grace = Duration::from_secs(5);
        let early = Duration::from_millis(100);
        let late = Duration::from_secs(6);

        assert!(matches!(poll_outcome(Startup::Ready, early, grace, &key), Some(Ok(()))));
        assert!(poll_outcome(Startup::Starting, late, grace, &key).is_none());
        assert!(poll_outcome(Startup::Missing, early, grace, &key).is_none());
        assert!(matches!(
            poll_outcome(Startup::Missing, late, grace, &key),
            Some(Err(OrchestratorError::ExitedBeforeReady(ref k))) if k == &key
        ));
        assert!(matches!(
            poll_outcome(Startup::Exited, early, grace, &key),
            Some(Err(OrchestratorError::ExitedBeforeReady(ref k))) if k == &key
        ));
    }

    #[tokio::test]
    async fn test_start_reports_script_failure() {
        let orchestrator = DockerOrchestrator::new(DockerSettings {
            load_script: PathBuf::from("/nonexistent/load.sh"),
            ..DockerSettings::default()
        });
        let key = WorkerKey::new(Modality::Printed, Language::En, "v2");
        let result = orchestrator.start(&key).await;
        assert!(matches!(result, Err(OrchestratorError::CommandFailed(_))));
    }
}
