use std::env;
use std::str::FromStr;

use super::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    RedisUrl,
    JwtSecret,
    MediaRoot,
    PublicBaseUrl,
    WorkerCount,
    FfmpegBin,
    ThumbnailOffset,
    ThumbnailWidth,
    HlsSegmentSeconds,
    ParallelRenditions,
    JobRetentionSecs,
    JobSweepCron,
    UploadLimitBytes,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::RedisUrl => "REDIS_URL",
            EnvKey::JwtSecret => "JWT_SECRET",
            EnvKey::MediaRoot => "MEDIA_ROOT",
            EnvKey::PublicBaseUrl => "PUBLIC_BASE_URL",
            EnvKey::WorkerCount => "WORKER_COUNT",
            EnvKey::FfmpegBin => "FFMPEG_BIN",
            EnvKey::ThumbnailOffset => "THUMBNAIL_OFFSET",
            EnvKey::ThumbnailWidth => "THUMBNAIL_WIDTH",
            EnvKey::HlsSegmentSeconds => "HLS_SEGMENT_SECONDS",
            EnvKey::ParallelRenditions => "PARALLEL_RENDITIONS",
            EnvKey::JobRetentionSecs => "JOB_RETENTION_SECS",
            EnvKey::JobSweepCron => "JOB_SWEEP_CRON",
            EnvKey::UploadLimitBytes => "UPLOAD_LIMIT_BYTES",
        }
    }
}

/// Reads a key from the process environment. Empty values count as unset.
pub fn from_process(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get<F>(lookup: &F, key: EnvKey) -> Result<String, ConfigError>
where
    F: Fn(EnvKey) -> Option<String>,
{
    lookup(key).ok_or(ConfigError::Missing(key.as_str()))
}

pub fn get_or<F>(lookup: &F, key: EnvKey, default: &str) -> String
where
    F: Fn(EnvKey) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

pub fn get_parsed<F, T>(lookup: &F, key: EnvKey, default: T) -> Result<T, ConfigError>
where
    F: Fn(EnvKey) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            key: key.as_str(),
            value: raw,
        }),
        None => Ok(default),
    }
}
