use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::common::upload::stream_to_file;
use crate::infrastructure::storage::layout::ArtifactLayout;
use crate::modules::video::dto::*;
use crate::modules::video::service::VideoService;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Multipart, Path, Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{error, info, warn};
use url::Url;
use validator::Validate;

/// `PUBLIC_BASE_URL` when configured, otherwise the request's `Host`.
fn base_url(state: &AppState, headers: &HeaderMap) -> Result<Url, ApiError> {
    let raw = match &state.config.public_base_url {
        Some(base) => base.clone(),
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("localhost");
            format!("http://{host}")
        }
    };
    Url::parse(&raw).map_err(|e| {
        warn!("Unusable base URL {}: {}", raw, e);
        ApiError::bad_request("Invalid Host header")
    })
}

#[utoipa::path(
    get,
    path = "/api/video/",
    responses(
        (status = 200, description = "List Videos", body = Vec<VideoListItem>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Video",
    security(("bearer_auth" = []))
)]
pub async fn list_videos(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let base = match base_url(&state, &headers) {
        Ok(base) => base,
        Err(e) => return e.into_response(),
    };

    match VideoService::list(&state, &base).await {
        Ok(videos) => (StatusCode::OK, Json(videos)).into_response(),
        Err(e) => {
            error!("Failed to list videos: {:#}", e);
            ApiError::internal().into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/video",
    request_body(content = UploadVideoRequest, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Video Created", body = ApiResponse<VideoCreatedResponse>),
        (status = 400, description = "Bad Request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Video",
    security(("bearer_auth" = []))
)]
pub async fn upload_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut stored: Option<(String, std::path::PathBuf)> = None;

    let form = match read_upload(&state, multipart, &mut stored).await {
        Ok(form) => form,
        Err(e) => {
            discard(stored.as_ref().map(|(_, path)| path.as_path())).await;
            return Err(e);
        }
    };

    let Some((reference, path)) = stored else {
        return Err(ApiError::bad_request(
            "No video field found in multipart request",
        ));
    };

    match VideoService::create(&state, form, reference).await {
        Ok(created) => Ok(ApiSuccess(
            ApiResponse::success(created, "Video uploaded successfully"),
            StatusCode::CREATED,
        )),
        Err(e) => {
            error!("Failed to create video: {:#}", e);
            discard(Some(&path)).await;
            Err(ApiError::internal())
        }
    }
}

async fn read_upload(
    state: &AppState,
    mut multipart: Multipart,
    stored: &mut Option<(String, std::path::PathBuf)>,
) -> Result<UploadVideoForm, ApiError> {
    let mut form = UploadVideoForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "video" if stored.is_none() => {
                let file_name = field.file_name().unwrap_or("video.mp4").to_string();
                let reference = ArtifactLayout::upload_reference(&file_name);
                let path = state
                    .pipeline
                    .layout()
                    .resolve(&reference)
                    .ok_or_else(ApiError::internal)?;

                info!("Starting upload of {} to {}", file_name, reference);
                *stored = Some((reference, path.clone()));
                stream_to_file(field, &path)
                    .await
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
            }
            "title" | "description" | "category" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                match name.as_str() {
                    "title" => form.title = value,
                    "description" => form.description = value,
                    _ if value.is_empty() => {}
                    _ => form.category = value,
                }
            }
            _ => {}
        }
    }

    form.validate()?;
    Ok(form)
}

async fn discard(path: Option<&std::path::Path>) {
    if let Some(path) = path {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to discard upload {}: {}", path.display(), e);
            }
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/video/{id}",
    params(
        ("id" = i64, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Video Deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Video Not Found"),
        (status = 500, description = "Internal Server Error")
    ),
    tag = "Video",
    security(("bearer_auth" = []))
)]
pub async fn delete_video(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let (video, report) = VideoService::delete(&state, id).await?;

    let message = if report.is_clean() {
        "Video deleted successfully"
    } else {
        "Video deleted; some files could not be removed"
    };
    Ok(ApiSuccess(ApiResponse::success(video, message), StatusCode::OK))
}

#[utoipa::path(
    get,
    path = "/media/thumbnail/{file}",
    params(
        ("file" = String, Path, description = "Thumbnail file name, e.g. thumbnail_<id>.jpg")
    ),
    responses(
        (status = 200, description = "JPEG thumbnail", body = String, content_type = "image/jpeg"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not Found")
    ),
    tag = "Video",
    security(("bearer_auth" = []))
)]
pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path(file): Path<String>,
    req: Request,
) -> Result<Response, ApiError> {
    let path = VideoService::resolve_thumbnail(&state, &file).await?;

    serve_media(ServeFile::new_with_mime(path, &mime::IMAGE_JPEG), req, "Thumbnail").await
}

#[utoipa::path(
    get,
    path = "/media/videos/{file}",
    params(
        ("file" = String, Path, description = "Stored upload name, as listed in video_file")
    ),
    responses(
        (status = 200, description = "Uploaded source video", body = String, content_type = "video/mp4"),
        (status = 206, description = "Partial Content"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not Found or already cleaned up")
    ),
    tag = "Video",
    security(("bearer_auth" = []))
)]
pub async fn get_upload(
    State(state): State<AppState>,
    Path(file): Path<String>,
    req: Request,
) -> Result<Response, ApiError> {
    let path = VideoService::resolve_upload(&state, &file).await?;
    serve_media(ServeFile::new(path), req, "Video file").await
}

async fn serve_media(
    file: ServeFile,
    req: Request,
    what: &'static str,
) -> Result<Response, ApiError> {
    let response = file.oneshot(req).await.map_err(|e| {
        warn!("{} read failed: {}", what, e);
        ApiError::not_found(what)
    })?;

    if response.status() == StatusCode::NOT_FOUND {
        return Err(ApiError::not_found(what));
    }
    Ok(response.map(axum::body::Body::new))
}
