use std::io::ErrorKind;
use std::path::Path;

use futures_util::future::join_all;
use tracing::{error, info, warn};

use super::{MediaJobRunner, PipelineError, is_file};
use crate::common::rendition::{RENDITION_PROFILES, RenditionProfile};
use crate::infrastructure::storage::layout::PLAYLIST_FILE;

/// Encodes `source` into every rendition of the fixed profile set.
///
/// Each rendition is written to a hidden staging directory and renamed into
/// `videos/<id>/<rendition>/` once the encoder is done, so readers only ever
/// see complete renditions. Any failed rendition fails the whole job; the
/// renditions already published stay where they are.
pub async fn convert_to_hls(
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

    tokio::fs::create_dir_all(runner.layout.video_dir(video_id))
        .await
        .map_err(PipelineError::io("creating video directory"))?;

    info!(video_id, "🎥 Transcoding {} to HLS", source.display());

    if runner.settings.parallel_renditions {
        encode_in_parallel(runner, video_id, source).await?;
    } else {
        for profile in RENDITION_PROFILES.iter() {
            encode_rendition(runner, video_id, source, profile).await?;
        }
    }

    info!(video_id, "✅ All renditions published");
    Ok(())
}

/// Every rendition runs to completion so each one clears its own staging
/// directory; the first error is reported once all of them have settled.
async fn encode_in_parallel(
    runner: &MediaJobRunner,
    video_id: i64,
    source: &Path,
) -> Result<(), PipelineError> {
    let results = join_all(
        RENDITION_PROFILES
            .iter()
            .map(|profile| encode_rendition(runner, video_id, source, profile)),
    )
    .await;

    let mut errors: Vec<PipelineError> = results.into_iter().filter_map(Result::err).collect();
    if errors.is_empty() {
        return Ok(());
    }

    let layout = &runner.layout;
    if errors.iter().any(|e| matches!(e, PipelineError::VideoGone(_))) {
        // A sibling may have recreated the tree after the fence removed it.
        let _ = remove_dir_if_present(&layout.video_dir(video_id)).await;
        return Err(PipelineError::VideoGone(video_id));
    }

    for profile in RENDITION_PROFILES.iter() {
        let staging = layout.rendition_staging_path(video_id, profile);
        if let Err(e) = remove_dir_if_present(&staging).await {
            warn!(video_id, rendition = profile.name, "Failed to clear staging directory: {}", e);
        }
    }
    Err(errors.swap_remove(0))
}

async fn encode_rendition(
    runner: &MediaJobRunner,
    video_id: i64,
    source: &Path,
    profile: &RenditionProfile,
) -> Result<(), PipelineError> {
    let layout = &runner.layout;
    let staging = layout.rendition_staging_path(video_id, profile);

    remove_dir_if_present(&staging)
        .await
        .map_err(PipelineError::io("clearing stale staging directory"))?;
    tokio::fs::create_dir_all(&staging)
        .await
        .map_err(PipelineError::io("creating staging directory"))?;

    let playlist = staging.join(PLAYLIST_FILE);
    if let Err(source) = runner
        .encoder
        .transcode_hls(source, profile, runner.settings.segment_seconds, &playlist)
        .await
    {
        error!(video_id, rendition = profile.name, "❌ Encoder failed: {}", source);
        let _ = remove_dir_if_present(&staging).await;
        return Err(PipelineError::Encoding {
            video_id,
            stage: profile.name.to_string(),
            source,
        });
    }

    if !is_file(&playlist).await {
        let _ = remove_dir_if_present(&staging).await;
        return Err(PipelineError::MissingOutput(playlist));
    }

    let published = layout.rendition_path(video_id, profile);
    remove_dir_if_present(&published)
        .await
        .map_err(PipelineError::io("replacing previous rendition"))?;
    tokio::fs::rename(&staging, &published)
        .await
        .map_err(PipelineError::io("publishing rendition"))?;

    if !runner.video_exists(video_id).await? {
        warn!(
            video_id,
            rendition = profile.name,
            "Video deleted mid-transcode, discarding its renditions"
        );
        let _ = remove_dir_if_present(&layout.video_dir(video_id)).await;
        return Err(PipelineError::VideoGone(video_id));
    }

    info!(video_id, rendition = profile.name, "📦 Rendition {} ready", profile.scale());
    Ok(())
}

async fn remove_dir_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
