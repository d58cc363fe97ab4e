use chrono::Utc;
use clap::Parser;
use policy_rag_server::{run_server, Cli};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let config = Cli::parse().into_config()?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        bind = %config.bind,
        chunk_size = config.pipeline.chunk_size,
        chunk_overlap = config.pipeline.chunk_overlap,
        top_k = config.pipeline.top_k,
        deadline_secs = config.pipeline.answer_deadline.as_secs(),
        "policy-rag-server boot"
    );

    run_server(config).await
}
