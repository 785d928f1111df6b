use anyhow::Result;
use clap::Parser;
use fitsearch_core::{Engine, EngineConfig};
use server::queue::IngestQueue;
use server::{build_app, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: String,
    /// Engine configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Pending ingest jobs before producers wait
    #[arg(long, default_value_t = 1024)]
    queue_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let config = EngineConfig::load(args.config.as_deref())?;
    let engine = Arc::new(Engine::open(&args.index, &config)?);
    let (queue, worker) = IngestQueue::spawn(engine.clone(), args.queue_capacity);
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    if admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set, admin endpoints will reject every request");
    }
    let app = build_app(AppState { engine: engine.clone(), queue, admin_token });

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, index = %args.index, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    // The router owned the last queue handle, so the worker drains and exits.
    worker.await?;
    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.close()?,
        Err(shared) => shared.flush()?,
    }
    tracing::info!("index closed");
    Ok(())
}
