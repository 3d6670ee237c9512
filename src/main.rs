//! OCR Gateway
//!
//! Routes OCR batches to specialized backends, keeping a bounded number of
//! worker containers alive and starting them on demand.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocr_gateway::capability::CapabilityRegistry;
use ocr_gateway::config::Config;
use ocr_gateway::dispatch::ScriptWorkerClient;
use ocr_gateway::pool::{DockerOrchestrator, WorkerPool};
use ocr_gateway::routes;
use ocr_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocr_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting OCR Gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Worker pool capacity: {}", config.pool.capacity);
    tracing::info!("Workspace root: {}", config.workers.workspace_root.display());

    let registry = match &config.capability_rules_path {
        Some(path) => {
            let registry = CapabilityRegistry::from_path(path)
                .with_context(|| format!("Failed to load capability rules from {}", path.display()))?;
            tracing::info!("Loaded {} capability rules from {}", registry.rules().len(), path.display());
            registry
        }
        None => CapabilityRegistry::default(),
    };

    tokio::fs::create_dir_all(&config.workers.workspace_root)
        .await
        .context("Failed to create workspace root")?;

    let orchestrator = Arc::new(DockerOrchestrator::new(config.docker_settings()));
    let pool = WorkerPool::new(orchestrator, config.pool_config());

    match pool.list_loaded().await {
        Ok(loaded) => tracing::info!("Found {} running workers", loaded.len()),
        Err(e) => tracing::warn!("Could not list running workers: {}", e),
    }

    let worker = Arc::new(ScriptWorkerClient::new(config.workers.infer_script.clone()));
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let app = routes::app(AppState::new(&config, registry, pool, worker));

    // Start server with graceful shutdown
    tracing::info!("OCR Gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
