//! Configuration management for the OCR gateway

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::pool::{DockerSettings, PoolConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub pool: PoolSettings,
    pub workers: WorkerSettings,
    /// JSON rule table replacing the built-in capabilities
    pub capability_rules_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub capacity: usize,
    pub load_timeout_secs: u64,
    pub ready_poll_interval_ms: u64,
    pub reconcile_grace_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub docker_bin: String,
    pub name_prefix: String,
    pub load_script: PathBuf,
    pub infer_script: PathBuf,
    pub workspace_root: PathBuf,
    /// Seconds a started container may be missing before it counts as exited
    pub start_grace_secs: u64,
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("POOL_CAPACITY must be at least 1")]
    ZeroCapacity,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            pool: PoolSettings {
                capacity: 4,
                load_timeout_secs: 120,
                ready_poll_interval_ms: 500,
                reconcile_grace_secs: 10,
            },
            workers: WorkerSettings {
                docker_bin: "docker".to_string(),
                name_prefix: "infer".to_string(),
                load_script: PathBuf::from("./load.sh"),
                infer_script: PathBuf::from("./infer.sh"),
                workspace_root: PathBuf::from("./images"),
                start_grace_secs: 5,
            },
            capability_rules_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from any variable source, falling back to defaults per field
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let string = |name: &str, default: String| lookup(name).unwrap_or(default);
        let path = |name: &str, default: PathBuf| lookup(name).map(PathBuf::from).unwrap_or(default);

        let config = Config {
            server: ServerConfig {
                host: string("SERVER_HOST", defaults.server.host),
                port: parse(&lookup, "SERVER_PORT", defaults.server.port)?,
            },
            pool: PoolSettings {
                capacity: parse(&lookup, "POOL_CAPACITY", defaults.pool.capacity)?,
                load_timeout_secs: parse(&lookup, "LOAD_TIMEOUT_SECS", defaults.pool.load_timeout_secs)?,
                ready_poll_interval_ms: parse(
                    &lookup,
                    "READY_POLL_INTERVAL_MS",
                    defaults.pool.ready_poll_interval_ms,
                )?,
                reconcile_grace_secs: parse(
                    &lookup,
                    "RECONCILE_GRACE_SECS",
                    defaults.pool.reconcile_grace_secs,
                )?,
            },
            workers: WorkerSettings {
                docker_bin: string("DOCKER_BIN", defaults.workers.docker_bin),
                name_prefix: string("WORKER_NAME_PREFIX", defaults.workers.name_prefix),
                load_script: path("WORKER_LOAD_SCRIPT", defaults.workers.load_script),
                infer_script: path("WORKER_INFER_SCRIPT", defaults.workers.infer_script),
                workspace_root: path("WORKSPACE_ROOT", defaults.workers.workspace_root),
                start_grace_secs: parse(
                    &lookup,
                    "WORKER_START_GRACE_SECS",
                    defaults.workers.start_grace_secs,
                )?,
            },
            capability_rules_path: lookup("CAPABILITY_RULES_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        };

        if config.pool.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(config)
    }

    /// Pool sizing and timing
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            capacity: self.pool.capacity,
            load_timeout: Duration::from_secs(self.pool.load_timeout_secs),
            reconcile_grace: Duration::from_secs(self.pool.reconcile_grace_secs),
        }
    }

    /// Settings for the docker orchestrator
    pub fn docker_settings(&self) -> DockerSettings {
        DockerSettings {
            docker_bin: self.workers.docker_bin.clone(),
            name_prefix: self.workers.name_prefix.clone(),
            load_script: self.workers.load_script.clone(),
            workspace_root: self.workers.workspace_root.clone(),
            poll_interval: Duration::from_millis(self.pool.ready_poll_interval_ms),
            start_grace: Duration::from_secs(self.workers.start_grace_secs),
        }
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
