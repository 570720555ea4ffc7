use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::info;
use wpforge::{
    batch::BatchProcessor,
    config::Config,
    db,
    pipeline::{CostEstimator, IdempotencyGuard, PipelineRunner},
    providers::Upstreams,
    queue,
    server::{ForgeState, forge_router},
    utils::logging::init_tracing,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const BUILD_TAG: Option<&str> = option_env!("WPFORGE_BUILD_TAG");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::from_toml();
    init_tracing(&cfg.basic.loglevel);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        build = BUILD_TAG.unwrap_or("dev"),
        database_url = %cfg.basic.database_url,
        loglevel = %cfg.basic.loglevel,
        listen_addr = %cfg.basic.listen_addr,
        listen_port = cfg.basic.listen_port,
        workers = cfg.pipeline.worker_concurrency,
        max_attempts = cfg.pipeline.max_attempts,
        "wpforge starting"
    );

    let db = db::spawn(&cfg.basic.database_url).await?;
    let upstreams = Upstreams::from_config(&cfg)?;
    let costs = Arc::new(CostEstimator::from_config(&cfg));
    let guard = IdempotencyGuard::new(db.clone(), cfg.pipeline.idempotency_ttl());
    let runner = PipelineRunner::new(db.clone(), upstreams, costs, guard);
    let batches = BatchProcessor::new(db.clone());
    let queue = queue::spawn(
        db.clone(),
        runner.clone(),
        batches.clone(),
        cfg.pipeline.clone(),
    )
    .await?;

    let state = ForgeState::new(
        db,
        runner,
        batches,
        queue,
        Arc::from(cfg.basic.admin_key.as_str()),
        cfg.basic.license_cache_secs,
    );
    let app = forge_router(state);

    let addr = SocketAddr::from((cfg.basic.listen_addr, cfg.basic.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
