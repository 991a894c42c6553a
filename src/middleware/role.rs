use crate::common::response::ApiError;
use crate::middleware::auth::{ADMIN_ROLE, TokenClaims};
use axum::{
    extract::{Extension, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

pub async fn admin_guard(
    Extension(claims): Extension<TokenClaims>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if claims.role != ADMIN_ROLE {
        return Err(ApiError(
            "Forbidden: Admin access required".to_string(),
            StatusCode::FORBIDDEN,
        ));
    }

    Ok(next.run(req).await)
}
