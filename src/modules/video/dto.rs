use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use super::model::{CATEGORIES, DEFAULT_CATEGORY, Video};
use super::pipeline::PipelineJobs;
use crate::infrastructure::storage::layout::ArtifactLayout;

/// One entry of `GET /api/video/`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VideoListItem {
    pub id: i64,
    #[schema(value_type = String, format = Date)]
    pub created_at: time::Date,
    pub title: String,
    pub description: String,
    /// Absolute thumbnail URL, `null` until the thumbnail job has run.
    pub thumbnail_url: Option<String>,
    pub category: String,
    /// Absolute URL of the uploaded source. It is removed once the renditions
    /// are published, after which the URL answers 404.
    pub video_file: Option<String>,
}

impl VideoListItem {
    pub fn project(video: Video, base: &Url) -> Self {
        Self {
            thumbnail_url: video
                .thumbnail
                .as_deref()
                .and_then(|t| media_url(base, t)),
            video_file: media_url(base, &video.video_file),
            id: video.id,
            created_at: video.created_at,
            title: video.title,
            description: video.description,
            category: video.category,
        }
    }
}

/// Text fields of the upload form.
#[derive(Debug, Clone, Validate)]
pub struct UploadVideoForm {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "Description must be 1 to 255 characters"))]
    pub description: String,
    #[validate(custom(function = "validate_category"))]
    pub category: String,
}

impl Default for UploadVideoForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

fn validate_category(category: &str) -> Result<(), ValidationError> {
    if CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(ValidationError::new("category").with_message("Unknown category".into()))
    }
}

/// Multipart body of `POST /api/video`, for the OpenAPI document.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadVideoRequest {
    pub title: String,
    pub description: String,
    #[schema(example = "action")]
    pub category: Option<String>,
    #[schema(value_type = String, format = Binary)]
    pub video: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VideoCreatedResponse {
    pub video: Video,
    /// Queued derivation jobs; absent when there was nothing to derive.
    pub jobs: Option<PipelineJobs>,
}

/// Absolute URL of a media-root relative `reference` below `<base>/media/`.
/// References the media routes do not serve project to `None`.
pub fn media_url(base: &Url, reference: &str) -> Option<String> {
    ArtifactLayout::served_reference(reference)?;
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("media/")
        .and_then(|media| media.join(reference))
        .ok()
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_urls_are_rooted_under_media() {
        let base = Url::parse("http://localhost:3000").unwrap();
        assert_eq!(
            media_url(&base, "thumbnail/thumbnail_7.jpg").as_deref(),
            Some("http://localhost:3000/media/thumbnail/thumbnail_7.jpg")
        );

        let prefixed = Url::parse("https://cdn.example.com/app").unwrap();
        assert_eq!(
            media_url(&prefixed, "thumbnail/thumbnail_7.jpg").as_deref(),
            Some("https://cdn.example.com/app/media/thumbnail/thumbnail_7.jpg")
        );
    }

    #[test]
    fn references_outside_the_media_routes_have_no_url() {
        let base = Url::parse("http://localhost").unwrap();
        assert_eq!(
            media_url(&base, "thumbnail/custom.jpg").as_deref(),
            Some("http://localhost/media/thumbnail/custom.jpg")
        );
        assert_eq!(media_url(&base, "posters/custom.jpg"), None);
        assert_eq!(media_url(&base, "videos/7/720p/index.m3u8"), None);
        assert_eq!(media_url(&base, "/etc/passwd"), None);
    }

    #[test]
    fn projection_leaves_missing_thumbnail_empty() {
        let base = Url::parse("http://localhost").unwrap();
        let video = Video {
            id: 3,
            created_at: time::Date::from_calendar_date(2024, time::Month::May, 1).unwrap(),
            title: "t".into(),
            description: "d".into(),
            video_file: "videos/abc_movie.mp4".into(),
            thumbnail: None,
            category: "drama".into(),
        };

        let item = VideoListItem::project(video, &base);
        assert_eq!(item.thumbnail_url, None);
        assert_eq!(
            item.video_file.as_deref(),
            Some("http://localhost/media/videos/abc_movie.mp4")
        );
    }

    #[test]
    fn form_rejects_unknown_category_and_empty_title() {
        let form = UploadVideoForm {
            title: "Trailer".into(),
            description: "A trailer".into(),
            category: "action".into(),
        };
        assert!(form.validate().is_ok());

        let bad = UploadVideoForm {
            title: String::new(),
            category: "opera".into(),
            ..form
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("title"));
        assert!(fields.contains_key("category"));
    }
}
