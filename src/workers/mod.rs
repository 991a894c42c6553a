//! Job bodies of the media derivation pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::settings::PipelineSettings;
use crate::infrastructure::encoder::{EncodeError, Encoder};
use crate::infrastructure::queue::{JobId, JobRunner};
use crate::infrastructure::storage::layout::ArtifactLayout;
use crate::modules::video::repository::VideoStore;

pub mod cleanup;
pub mod thumbnail;
pub mod transcoder;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MediaJob {
    Thumbnail { video_id: i64, source: PathBuf },
    Transcode { video_id: i64, source: PathBuf },
    CleanupOrigin { video_id: i64, source: PathBuf },
}

impl MediaJob {
    pub fn video_id(&self) -> i64 {
        match self {
            MediaJob::Thumbnail { video_id, .. }
            | MediaJob::Transcode { video_id, .. }
            | MediaJob::CleanupOrigin { video_id, .. } => *video_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("encoding {stage} for video {video_id} failed: {source}")]
    Encoding {
        video_id: i64,
        stage: String,
        #[source]
        source: EncodeError,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("entity store error: {0:#}")]
    Store(anyhow::Error),
    #[error("video {0} no longer exists")]
    VideoGone(i64),
    #[error("source file {} is missing", .0.display())]
    SourceMissing(PathBuf),
    #[error("encoder produced no output at {}", .0.display())]
    MissingOutput(PathBuf),
}

impl PipelineError {
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| PipelineError::Io { context, source }
    }
}

/// Runs [`MediaJob`]s against the artifact layout and the entity store.
pub struct MediaJobRunner {
    pub(crate) layout: ArtifactLayout,
    pub(crate) encoder: Arc<dyn Encoder>,
    pub(crate) store: Arc<dyn VideoStore>,
    pub(crate) settings: PipelineSettings,
}

impl MediaJobRunner {
    pub fn new(
        layout: ArtifactLayout,
        encoder: Arc<dyn Encoder>,
        store: Arc<dyn VideoStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            layout,
            encoder,
            store,
            settings,
        }
    }

    pub(crate) async fn video_exists(&self, video_id: i64) -> Result<bool, PipelineError> {
        self.store.exists(video_id).await.map_err(PipelineError::Store)
    }
}

#[async_trait]
impl JobRunner<MediaJob> for MediaJobRunner {
    async fn run(&self, job_id: JobId, job: &MediaJob) -> anyhow::Result<()> {
        info!(%job_id, video_id = job.video_id(), "Running {:?}", job);

        match job {
            MediaJob::Thumbnail { video_id, source } => {
                thumbnail::generate_thumbnail(self, *video_id, source).await?
            }
            MediaJob::Transcode { video_id, source } => {
                transcoder::convert_to_hls(self, *video_id, source).await?
            }
            MediaJob::CleanupOrigin { video_id, source } => {
                cleanup::delete_origin_file(*video_id, source).await?
            }
        }
        Ok(())
    }
}

pub(crate) async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
