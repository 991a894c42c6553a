use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use super::ConfigError;
use crate::config::env::{self, EnvKey};

/// Knobs for the derivation workers.
#[derive(Clone, Debug, Deserialize)]
pub struct PipelineSettings {
    /// Seek offset for the thumbnail frame, in ffmpeg time syntax.
    pub thumbnail_offset: String,
    pub thumbnail_width: u32,
    pub segment_seconds: u32,
    /// Run the rendition encoders of one transcode concurrently.
    pub parallel_renditions: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            thumbnail_offset: "00:00:10".to_string(),
            thumbnail_width: 320,
            segment_seconds: 5,
            parallel_renditions: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub media_root: PathBuf,
    pub public_base_url: Option<String>,
    pub worker_count: usize,
    pub ffmpeg_bin: String,
    pub pipeline: PipelineSettings,
    pub job_retention: Duration,
    pub job_sweep_cron: String,
    pub upload_limit_bytes: usize,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_lookup(env::from_process)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(EnvKey) -> Option<String>,
    {
        let defaults = PipelineSettings::default();

        let job_sweep_cron = env::get_or(&lookup, EnvKey::JobSweepCron, "0 */10 * * * *");
        if cron::Schedule::from_str(&job_sweep_cron).is_err() {
            return Err(ConfigError::Invalid {
                key: EnvKey::JobSweepCron.as_str(),
                value: job_sweep_cron,
            });
        }

        Ok(Self {
            server_port: env::get_parsed(&lookup, EnvKey::ServerPort, 3000)?,
            database_url: lookup(EnvKey::DatabaseUrl),
            redis_url: lookup(EnvKey::RedisUrl),
            jwt_secret: env::get(&lookup, EnvKey::JwtSecret)?,
            media_root: PathBuf::from(env::get_or(&lookup, EnvKey::MediaRoot, "media")),
            public_base_url: lookup(EnvKey::PublicBaseUrl),
            worker_count: env::get_parsed::<_, usize>(&lookup, EnvKey::WorkerCount, 2)?.max(1),
            ffmpeg_bin: env::get_or(&lookup, EnvKey::FfmpegBin, "ffmpeg"),
            pipeline: PipelineSettings {
                thumbnail_offset: env::get_or(
                    &lookup,
                    EnvKey::ThumbnailOffset,
                    &defaults.thumbnail_offset,
                ),
                thumbnail_width: env::get_parsed(
                    &lookup,
                    EnvKey::ThumbnailWidth,
                    defaults.thumbnail_width,
                )?,
                segment_seconds: env::get_parsed(
                    &lookup,
                    EnvKey::HlsSegmentSeconds,
                    defaults.segment_seconds,
                )?,
                parallel_renditions: env::get_parsed(
                    &lookup,
                    EnvKey::ParallelRenditions,
                    defaults.parallel_renditions,
                )?,
            },
            job_retention: Duration::from_secs(env::get_parsed(
                &lookup,
                EnvKey::JobRetentionSecs,
                3600,
            )?),
            job_sweep_cron,
            upload_limit_bytes: env::get_parsed(
                &lookup,
                EnvKey::UploadLimitBytes,
                2 * 1024 * 1024 * 1024,
            )?,
        })
    }

    /// Minimal configuration rooted at `media_root`, everything else at its default.
    pub fn with_media_root(
        media_root: impl Into<PathBuf>,
        jwt_secret: &str,
    ) -> Result<Self, ConfigError> {
        let secret = jwt_secret.to_string();
        let mut config = Self::from_lookup(|key| match key {
            EnvKey::JwtSecret => Some(secret.clone()),
            _ => None,
        })?;
        config.media_root = media_root.into();
        Ok(config)
    }
}
