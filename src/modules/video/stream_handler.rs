use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::warn;

use crate::common::response::ApiError;
use crate::modules::video::service::VideoService;
use crate::state::AppState;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";

/// HLS playlist of one rendition. Renditions that are still being encoded
/// are simply not there yet.
#[utoipa::path(
    get,
    path = "/api/video/{id}/{rendition}/index.m3u8",
    params(
        ("id" = i64, Path, description = "Video ID"),
        ("rendition" = String, Path, description = "480p, 720p or 1080p")
    ),
    responses(
        (status = 200, description = "HLS playlist", body = String, content_type = "application/vnd.apple.mpegurl"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not Found")
    ),
    tag = "Video",
    security(("bearer_auth" = []))
)]
pub async fn get_playlist(
    State(state): State<AppState>,
    Path((id, rendition)): Path<(i64, String)>,
) -> Result<Response, ApiError> {
    let path = VideoService::resolve_playlist(&state, id, &rendition).await?;

    // The file can vanish between the check and the read when the video is deleted.
    let body = tokio::fs::read(&path).await.map_err(|e| {
        warn!(video_id = id, "Playlist read failed: {}", e);
        ApiError::not_found("Playlist")
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)],
        body,
    )
        .into_response())
}

/// One MPEG-TS segment, with `Range` support.
#[utoipa::path(
    get,
    path = "/api/video/{id}/{rendition}/{segment}",
    params(
        ("id" = i64, Path, description = "Video ID"),
        ("rendition" = String, Path, description = "480p, 720p or 1080p"),
        ("segment" = String, Path, description = "Segment file name, e.g. segment000.ts")
    ),
    responses(
        (status = 200, description = "Segment bytes", body = String, content_type = "video/MP2T"),
        (status = 206, description = "Partial Content"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not Found")
    ),
    tag = "Video",
    security(("bearer_auth" = []))
)]
pub async fn get_segment(
    State(state): State<AppState>,
    Path((id, rendition, segment)): Path<(i64, String, String)>,
    req: Request,
) -> Result<Response, ApiError> {
    let path = VideoService::resolve_segment(&state, id, &rendition, &segment).await?;

    let mut response = ServeFile::new(path)
        .oneshot(req)
        .await
        .map_err(|e| {
            warn!(video_id = id, "Segment read failed: {}", e);
            ApiError::not_found("Segment")
        })?;

    if response.status() == StatusCode::NOT_FOUND {
        return Err(ApiError::not_found("Segment"));
    }
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(SEGMENT_CONTENT_TYPE),
    );
    Ok(response.map(Body::new))
}
