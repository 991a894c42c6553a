use std::io::ErrorKind;
use std::path::Path;

use tracing::{error, info, warn};

use super::{MediaJobRunner, PipelineError, is_file};
use crate::infrastructure::storage::layout::ArtifactLayout;

/// Grabs one frame of `source` into `thumbnail/thumbnail_<id>.jpg` and points
/// the video row at it. The row update is the last step, after the image is
/// flushed to disk and renamed into place.
pub async fn generate_thumbnail(
    runner: &MediaJobRunner,
    video_id: i64,
    source: &Path,
) -> Result<(), PipelineError> {
    if !runner.video_exists(video_id).await? {
        return Err(PipelineError::VideoGone(video_id));
    }
    if !is_file(source).await {
        return Err(PipelineError::SourceMissing(source.to_path_buf()));
    }

    let layout = &runner.layout;
    tokio::fs::create_dir_all(layout.thumbnail_dir())
        .await
        .map_err(PipelineError::io("creating thumbnail directory"))?;

    let staging = layout.thumbnail_staging_path(video_id);
    let settings = &runner.settings;

    if let Err(source) = runner
        .encoder
        .extract_frame(
            source,
            &settings.thumbnail_offset,
            settings.thumbnail_width,
            &staging,
        )
        .await
    {
        error!(video_id, "❌ Thumbnail extraction failed: {}", source);
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(PipelineError::Encoding {
            video_id,
            stage: "thumbnail".to_string(),
            source,
        });
    }

    // A source shorter than the seek offset yields a clean exit and no frame.
    let file = match tokio::fs::File::open(&staging).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(
                video_id,
                "Encoder wrote no thumbnail; source may be shorter than {}",
                settings.thumbnail_offset
            );
            return Err(PipelineError::MissingOutput(staging));
        }
        Err(e) => return Err(PipelineError::io("opening thumbnail")(e)),
    };
    let metadata = file
        .metadata()
        .await
        .map_err(PipelineError::io("reading thumbnail metadata"))?;
    if metadata.len() == 0 {
        drop(file);
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(PipelineError::MissingOutput(staging));
    }
    file.sync_all()
        .await
        .map_err(PipelineError::io("flushing thumbnail"))?;
    drop(file);

    let target = layout.thumbnail_path(video_id);
    tokio::fs::rename(&staging, &target)
        .await
        .map_err(PipelineError::io("publishing thumbnail"))?;

    let reference = ArtifactLayout::thumbnail_reference(video_id);
    let updated = runner
        .store
        .set_thumbnail(video_id, &reference)
        .await
        .map_err(PipelineError::Store)?;

    if !updated {
        warn!(video_id, "Video deleted while its thumbnail was generated, discarding");
        let _ = tokio::fs::remove_file(&target).await;
        return Err(PipelineError::VideoGone(video_id));
    }

    info!(video_id, "🖼️ Thumbnail ready at {}", reference);
    Ok(())
}
