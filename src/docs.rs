use utoipa::OpenApi;
use crate::common::response::ApiResponse;
use crate::modules::video::dto::*;
use crate::modules::video::model::Video;
use crate::modules::video::pipeline::PipelineJobs;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::video::handler::list_videos,
        crate::modules::video::handler::upload_video,
        crate::modules::video::handler::delete_video,
        crate::modules::video::handler::get_thumbnail,
        crate::modules::video::handler::get_upload,
        crate::modules::video::stream_handler::get_playlist,
        crate::modules::video::stream_handler::get_segment,
    ),
    components(
        schemas(
            Video, VideoListItem, UploadVideoRequest, VideoCreatedResponse, PipelineJobs,
            ApiResponse<VideoCreatedResponse>,
        )
    ),
    tags(
        (name = "Video", description = "Upload, list and HLS streaming")
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
