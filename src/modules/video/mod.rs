use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use tower_http::limit::RequestBodyLimitLayer;
use crate::state::AppState;

pub mod dto;
pub mod events;
pub mod handler;
pub mod model;
pub mod pipeline;
pub mod repository;
pub mod service;
pub mod stream_handler;

/// `/video` routes, nested under `/api`. Everything needs a valid token;
/// writes additionally need the admin role.
pub fn router(state: AppState) -> Router<AppState> {
    let read_routes = Router::new()
        .route("/video", get(handler::list_videos))
        .route("/video/", get(handler::list_videos))
        .route("/video/{id}/{rendition}/index.m3u8", get(stream_handler::get_playlist))
        .route("/video/{id}/{rendition}/{segment}", get(stream_handler::get_segment))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/video", post(handler::upload_video))
        .route("/video/{id}", delete(handler::delete_video))
        .route_layer(middleware::from_fn(crate::middleware::role::admin_guard))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.upload_limit_bytes));

    read_routes.merge(admin_routes)
}

/// `/media` routes: thumbnails and not yet cleaned up source uploads.
pub fn media_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/thumbnail/{file}", get(handler::get_thumbnail))
        .route("/videos/{file}", get(handler::get_upload))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth::auth_middleware,
        ))
}
