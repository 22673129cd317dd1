use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use reel_api::routes::build_router;
use reel_api::AppState;
use reel_core::Config;
use reel_storage::create_storage;
use reel_transcode::{
    ffmpeg::validate_tool_path, FfmpegRunner, HlsTranscoder, MediaProber, PipelineConfig,
    TranscodePipeline,
};
use reel_worker::{JobHandlerContext, JobQueue, JobQueueConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    validate_tool_path(&config.ffmpeg_path).context("Invalid FFMPEG_PATH")?;
    validate_tool_path(&config.ffprobe_path).context("Invalid FFPROBE_PATH")?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage backend")?;

    let videos = reel_db::VideoRepository::new(pool.clone());
    let outputs = reel_db::OutputRepository::new(pool.clone());
    let jobs = reel_db::JobRepository::new(pool.clone());

    let prober = MediaProber::new(config.ffprobe_path.clone());
    let runner = FfmpegRunner::new(config.ffmpeg_path.clone());
    let transcoder = HlsTranscoder::new(runner, storage.clone());
    let pipeline = TranscodePipeline::new(
        videos.clone(),
        outputs.clone(),
        jobs.clone(),
        storage.clone(),
        prober,
        transcoder,
        PipelineConfig {
            delete_source_after_transcode: config.delete_source_after_transcode,
        },
    );

    let state = AppState::new(pool.clone(), config.clone(), storage, pipeline);

    // The queue holds only a weak reference to the dispatch context; the
    // server's Arc keeps the state alive.
    let context: Arc<dyn JobHandlerContext> = state.clone();
    let queue = JobQueue::new(
        jobs,
        videos,
        JobQueueConfig {
            max_workers: config.queue_max_workers,
            poll_interval_ms: config.queue_poll_interval_ms,
            retry_base_delay_secs: config.queue_retry_delay_secs,
            visibility_timeout_secs: config.queue_visibility_timeout_secs,
            ..Default::default()
        },
        Arc::downgrade(&context),
        Some(pool),
    );

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        app = %config.app_name,
        addr = %addr,
        workers = config.queue_max_workers,
        "Server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    queue.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
