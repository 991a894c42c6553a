use std::path::PathBuf;

use anyhow::Result;
use axum::http::StatusCode;
use tracing::{error, info};
use url::Url;

use super::dto::{UploadVideoForm, VideoCreatedResponse, VideoListItem};
use super::events::{VideoCreated, VideoDeleted};
use super::model::{NewVideo, Video};
use crate::common::rendition::{RenditionProfile, SegmentName};
use crate::common::response::ApiError;
use crate::infrastructure::storage::layout::{DeletionReport, THUMBNAIL_DIR, VIDEOS_DIR};
use crate::state::AppState;
use crate::workers::is_file;

/// Failures of the read-side lookups. Absent things are always `NotFound`;
/// the caller cannot act on the difference between "never made" and "gone".
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::NotFound(_) => ApiError(err.to_string(), StatusCode::NOT_FOUND),
            StreamError::Store(e) => {
                error!("Entity store error: {:#}", e);
                ApiError(
                    "Internal Server Error".to_string(),
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
            }
        }
    }
}

pub struct VideoService;

impl VideoService {
    pub async fn list(state: &AppState, base: &Url) -> Result<Vec<VideoListItem>> {
        let videos = state.store.list().await?;
        Ok(videos
            .into_iter()
            .map(|video| VideoListItem::project(video, base))
            .collect())
    }

    /// Inserts the row for an already stored upload and starts its derivation.
    pub async fn create(
        state: &AppState,
        form: UploadVideoForm,
        video_file: String,
    ) -> Result<VideoCreatedResponse> {
        let video = state
            .store
            .insert(NewVideo {
                title: form.title,
                description: form.description,
                category: form.category,
                video_file,
                thumbnail: None,
            })
            .await?;
        info!(video_id = video.id, "Video '{}' created", video.title);

        let jobs = match VideoCreated::from_video(&video, state.pipeline.layout()) {
            Some(event) => state.pipeline.on_created(&event).await?,
            None => None,
        };

        Ok(VideoCreatedResponse { video, jobs })
    }

    /// Deletes the row, then every artifact derived from it.
    pub async fn delete(state: &AppState, id: i64) -> Result<(Video, DeletionReport), StreamError> {
        let video = state
            .store
            .delete(id)
            .await?
            .ok_or(StreamError::NotFound("Video"))?;

        let event = VideoDeleted::from_video(&video, state.pipeline.layout());
        let report = state.pipeline.on_deleted(&event).await;
        Ok((video, report))
    }

    pub async fn resolve_playlist(
        state: &AppState,
        id: i64,
        rendition: &str,
    ) -> Result<PathBuf, StreamError> {
        let profile = RenditionProfile::find(rendition).ok_or(StreamError::NotFound("Rendition"))?;
        Self::ensure_video(state, id).await?;

        let path = state.pipeline.layout().playlist_path(id, profile);
        if !is_file(&path).await {
            return Err(StreamError::NotFound("Playlist"));
        }
        Ok(path)
    }

    pub async fn resolve_segment(
        state: &AppState,
        id: i64,
        rendition: &str,
        segment: &str,
    ) -> Result<PathBuf, StreamError> {
        let profile = RenditionProfile::find(rendition).ok_or(StreamError::NotFound("Rendition"))?;
        let segment = SegmentName::parse(segment).ok_or(StreamError::NotFound("Segment"))?;
        Self::ensure_video(state, id).await?;

        let path = state.pipeline.layout().segment_path(id, profile, &segment);
        if !is_file(&path).await {
            return Err(StreamError::NotFound("Segment"));
        }
        Ok(path)
    }

    /// Any servable `.jpg` directly under `thumbnail/`.
    pub async fn resolve_thumbnail(state: &AppState, file: &str) -> Result<PathBuf, StreamError> {
        Self::resolve_media(state, THUMBNAIL_DIR, file, "Thumbnail").await
    }

    /// An uploaded source file, only for as long as it has not been cleaned up.
    pub async fn resolve_upload(state: &AppState, file: &str) -> Result<PathBuf, StreamError> {
        Self::resolve_media(state, VIDEOS_DIR, file, "Video file").await
    }

    async fn resolve_media(
        state: &AppState,
        dir: &str,
        file: &str,
        what: &'static str,
    ) -> Result<PathBuf, StreamError> {
        let path = state
            .pipeline
            .layout()
            .resolve_served(dir, file)
            .ok_or(StreamError::NotFound(what))?;
        if !is_file(&path).await {
            return Err(StreamError::NotFound(what));
        }
        Ok(path)
    }

    async fn ensure_video(state: &AppState, id: i64) -> Result<(), StreamError> {
        if state.store.exists(id).await? {
            Ok(())
        } else {
            Err(StreamError::NotFound("Video"))
        }
    }
}
