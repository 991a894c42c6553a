use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use videoflix_backend::app;
use videoflix_backend::config::settings::AppConfig;
use videoflix_backend::infrastructure::db::pool::{connect_to_db, run_migrations};
use videoflix_backend::infrastructure::encoder::FfmpegEncoder;
use videoflix_backend::infrastructure::queue::sweeper::spawn_expiry_sweeper;
use videoflix_backend::infrastructure::redis::client::RedisService;
use videoflix_backend::modules::video::repository::{
    MemoryVideoStore, PgVideoRepository, VideoStore,
};
use videoflix_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("invalid configuration")?;

    let store: Arc<dyn VideoStore> = match &config.database_url {
        Some(url) => {
            let pool = connect_to_db(url).await.context("connecting to PostgreSQL")?;
            run_migrations(&pool).await.context("running migrations")?;
            Arc::new(PgVideoRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, videos are kept in memory only");
            Arc::new(MemoryVideoStore::new())
        }
    };

    let redis = match &config.redis_url {
        Some(url) => Some(RedisService::new(url).await.context("connecting to Redis")?),
        None => {
            warn!("REDIS_URL not set, token revocation is not checked");
            None
        }
    };

    let encoder = Arc::new(FfmpegEncoder::new(config.ffmpeg_bin.clone()));
    let state = AppState::build(config.clone(), store, encoder, redis)
        .await
        .with_context(|| format!("preparing media root {}", config.media_root.display()))?;

    spawn_expiry_sweeper(
        state.pipeline.queue().clone(),
        &config.job_sweep_cron,
        config.job_retention,
    )
    .context("scheduling job expiry")?;

    let app = app::create_app(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
