//! Application state shared by handlers and the job dispatch context.

use std::sync::Arc;

use reel_core::Config;
use reel_db::{JobRepository, OutputRepository, VideoRepository};
use reel_storage::Storage;
use reel_transcode::TranscodePipeline;
use reel_worker::Producer;
use sqlx::PgPool;

use crate::validation::{DefaultUploadValidator, UploadValidator};

pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub videos: VideoRepository,
    pub outputs: OutputRepository,
    pub jobs: JobRepository,
    pub storage: Arc<dyn Storage>,
    pub producer: Producer,
    pub pipeline: TranscodePipeline,
    pub upload_validator: Arc<dyn UploadValidator>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: Config,
        storage: Arc<dyn Storage>,
        pipeline: TranscodePipeline,
    ) -> Arc<Self> {
        let videos = VideoRepository::new(pool.clone());
        let outputs = OutputRepository::new(pool.clone());
        let jobs = JobRepository::new(pool.clone());
        let producer = Producer::new(jobs.clone(), config.queue_retry_attempts);
        let upload_validator: Arc<dyn UploadValidator> = Arc::new(
            DefaultUploadValidator::new(config.max_upload_size_bytes),
        );

        Arc::new(Self {
            pool,
            config,
            videos,
            outputs,
            jobs,
            storage,
            producer,
            pipeline,
            upload_validator,
        })
    }
}
