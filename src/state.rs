use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::encoder::Encoder;
use crate::infrastructure::queue::JobQueue;
use crate::infrastructure::redis::client::RedisService;
use crate::infrastructure::storage::layout::ArtifactLayout;
use crate::middleware::auth::TokenVerifier;
use crate::modules::video::pipeline::VideoPipeline;
use crate::modules::video::repository::VideoStore;
use crate::workers::MediaJobRunner;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn VideoStore>,
    pub pipeline: Arc<VideoPipeline>,
    pub tokens: TokenVerifier,
}

impl AppState {
    /// Prepares the media root and starts the job queue with its workers.
    /// Must run inside a tokio runtime.
    pub async fn build(
        config: AppConfig,
        store: Arc<dyn VideoStore>,
        encoder: Arc<dyn Encoder>,
        redis: Option<RedisService>,
    ) -> std::io::Result<Self> {
        let layout = ArtifactLayout::new(config.media_root.clone());
        layout.ensure_dirs().await?;

        let runner = MediaJobRunner::new(
            layout.clone(),
            encoder,
            store.clone(),
            config.pipeline.clone(),
        );
        let queue = JobQueue::start(config.worker_count, Arc::new(runner));
        let pipeline = Arc::new(VideoPipeline::new(queue, layout));
        let tokens = TokenVerifier::new(config.jwt_secret.clone(), redis);

        Ok(Self {
            config,
            store,
            pipeline,
            tokens,
        })
    }
}
