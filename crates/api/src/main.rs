use std::sync::Arc;

use anyhow::Context;

use vesselflow_api::app::{build_app, services};
use vesselflow_infra::{Pipeline, PipelineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vesselflow_observability::init();

    let config = PipelineConfig::from_env().context("invalid configuration")?;
    let classifier = vesselflow_ai::load_classifier(config.model_path.as_deref());
    let collaborators = services::build_collaborators(&config, classifier)?;

    let pipeline = Arc::new(Pipeline::new(collaborators, config.clone()));
    let runtime = pipeline.start().context("failed to start pipeline workers")?;
    tracing::info!(workers = runtime.workers(), chunk_size = config.chunk_size, "pipeline started");

    let app = build_app(Arc::new(services::AppServices::new(pipeline)));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("stopping pipeline workers");
    tokio::task::spawn_blocking(move || runtime.shutdown()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
