use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;
use tracing::{debug, info, warn};

use super::events::{VideoCreated, VideoDeleted};
use crate::infrastructure::queue::{JobId, JobQueue, JobSpec, QueueError};
use crate::infrastructure::storage::layout::{ArtifactLayout, DeletionReport};
use crate::workers::{MediaJob, is_file};

/// Jobs queued for one newly created video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PipelineJobs {
    #[schema(value_type = Option<String>, format = Uuid)]
    pub thumbnail: Option<JobId>,
    #[schema(value_type = String, format = Uuid)]
    pub transcode: JobId,
    #[schema(value_type = String, format = Uuid)]
    pub cleanup: JobId,
}

/// Turns video lifecycle events into job graphs and artifact removals.
pub struct VideoPipeline {
    queue: Arc<JobQueue<MediaJob>>,
    layout: ArtifactLayout,
}

impl VideoPipeline {
    pub fn new(queue: Arc<JobQueue<MediaJob>>, layout: ArtifactLayout) -> Self {
        Self { queue, layout }
    }

    pub fn queue(&self) -> &Arc<JobQueue<MediaJob>> {
        &self.queue
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Queues thumbnail (only when the video has none), transcode, and an
    /// origin cleanup that waits on the transcode. Returns `None` without
    /// queueing anything when the source file is not on disk.
    pub async fn on_created(&self, event: &VideoCreated) -> Result<Option<PipelineJobs>, QueueError> {
        if !is_file(&event.source).await {
            debug!(
                video_id = event.id,
                "No source at {}, nothing to derive",
                event.source.display()
            );
            return Ok(None);
        }

        let thumbnail = if event.has_thumbnail {
            None
        } else {
            Some(
                self.queue
                    .enqueue(
                        MediaJob::Thumbnail {
                            video_id: event.id,
                            source: event.source.clone(),
                        },
                        &[],
                    )
                    .await?,
            )
        };

        let transcode = self
            .queue
            .enqueue(
                MediaJob::Transcode {
                    video_id: event.id,
                    source: event.source.clone(),
                },
                &[],
            )
            .await?;

        let cleanup = self
            .queue
            .enqueue_spec(
                JobSpec::new(MediaJob::CleanupOrigin {
                    video_id: event.id,
                    source: event.source.clone(),
                })
                .after(transcode),
            )
            .await?;

        info!(
            video_id = event.id,
            %transcode,
            %cleanup,
            thumbnail = thumbnail.is_some(),
            "📨 Derivation jobs queued"
        );

        Ok(Some(PipelineJobs {
            thumbnail,
            transcode,
            cleanup,
        }))
    }

    /// Removes the artifacts of a deleted video before returning.
    pub async fn on_deleted(&self, event: &VideoDeleted) -> DeletionReport {
        let report = self
            .layout
            .delete_tree(event.id, event.source.as_deref(), event.thumbnail.as_deref())
            .await;

        if report.is_clean() {
            info!(video_id = event.id, removed = report.removed.len(), "🗑️ Artifacts removed");
        } else {
            warn!(
                video_id = event.id,
                failed = report.failed.len(),
                "Some artifacts could not be removed"
            );
        }
        report
    }
}
