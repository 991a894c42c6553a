use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};

use super::PipelineError;

/// Deletes the uploaded source once its renditions exist. Only ever queued
/// behind a transcode, so it never runs if transcoding failed.
pub async fn delete_origin_file(video_id: i64, source: &Path) -> Result<(), PipelineError> {
    match tokio::fs::remove_file(source).await {
        Ok(()) => {
            info!(video_id, "🧹 Removed source upload {}", source.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(video_id, "Source upload {} already gone", source.display());
            Ok(())
        }
        Err(e) => Err(PipelineError::io(format!(
            "removing source {}",
            source.display()
        ))(e)),
    }
}
