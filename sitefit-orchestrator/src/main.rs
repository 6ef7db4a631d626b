use std::sync::Arc;

use anyhow::Context;
use sitefit_orchestrator::{
    api, config::OrchestratorConfig, engine::ProcessEngine, repository::JobRegistry,
    service::JobService,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitefit_orchestrator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sitefit Orchestrator...");

    let mut config = OrchestratorConfig::from_env().context("Failed to load configuration")?;
    config.validate()?;
    let cwd = std::env::current_dir().context("Failed to resolve the current directory")?;
    config.anchor_paths(&cwd);

    tracing::info!("Workspace root: {}", config.workspace_root.display());
    tracing::info!("Max concurrent jobs: {}", config.max_concurrent_jobs);
    tracing::info!(
        "Engine: {} {}",
        config.engine.program,
        config.engine.base_args.join(" ")
    );

    std::fs::create_dir_all(&config.workspace_root).with_context(|| {
        format!(
            "Failed to create workspace root {}",
            config.workspace_root.display()
        )
    })?;

    let shutdown = CancellationToken::new();

    let registry = {
        let (root, shutdown, retain) = (
            config.workspace_root.clone(),
            shutdown.clone(),
            config.log_retain_lines,
        );
        tokio::task::spawn_blocking(move || JobRegistry::load(&root, shutdown, retain))
            .await
            .context("Job restore task failed")?
            .context("Failed to restore jobs")?
    };
    tracing::info!("Restored {} job(s)", registry.len());

    let engine = Arc::new(ProcessEngine::new(config.termination_grace));
    let addr = config.bind_addr.clone();
    let service = Arc::new(JobService::new(
        config,
        Arc::new(registry),
        engine,
        shutdown,
    ));

    // Build router with all API endpoints
    let app = api::create_router(Arc::clone(&service));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down, stopping running jobs...");
    service.shutdown().await;
    tracing::info!("Orchestrator stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
