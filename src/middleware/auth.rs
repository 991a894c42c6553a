use crate::common::response::ApiError;
use crate::infrastructure::redis::client::RedisService;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use tracing::{debug, error};
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "ADMIN";
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: Uuid,
    pub role: String,
    pub exp: usize,
    pub iat: usize,
}

/// Checks bearer tokens: HS256 signature and expiry, then the optional
/// Redis blocklist of revoked tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
    blocklist: Option<RedisService>,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>, blocklist: Option<RedisService>) -> Self {
        Self {
            secret: secret.into(),
            blocklist,
        }
    }

    pub async fn verify(&self, token: &str) -> Result<TokenClaims, ApiError> {
        let claims = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            debug!("Rejected token: {}", e);
            ApiError::unauthorized("Invalid token signature")
        })?
        .claims;

        if let Some(redis) = &self.blocklist {
            let blocked = redis.is_token_blocked(token).await.map_err(|e| {
                error!("Redis error: {}", e);
                ApiError(
                    "Internal Server Error: Redis unavailable".to_string(),
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                )
            })?;
            if blocked {
                return Err(ApiError::unauthorized("Token is blocked/revoked"));
            }
        }

        Ok(claims)
    }
}

/// Authorization header first, then the `access_token` cookie.
fn extract_token(req: &Request, cookies: &Cookies) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned)
        .or_else(|| {
            cookies
                .get(ACCESS_TOKEN_COOKIE)
                .map(|cookie| cookie.value().to_owned())
        })
        .filter(|token| !token.is_empty())
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    cookies: Cookies,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&req, &cookies)
        .ok_or_else(|| ApiError::unauthorized("Missing or invalid token"))?;

    let claims = state.tokens.verify(&token).await?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn token(secret: &str, exp_offset: i64) -> String {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let claims = TokenClaims {
            sub: Uuid::new_v4(),
            role: "USER".to_string(),
            exp: (now + exp_offset) as usize,
            iat: now as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn accepts_valid_token_without_blocklist() {
        let verifier = TokenVerifier::new("secret", None);
        let claims = verifier.verify(&token("secret", 600)).await.unwrap();
        assert_eq!(claims.role, "USER");
    }

    #[tokio::test]
    async fn rejects_wrong_secret_and_expired_tokens() {
        let verifier = TokenVerifier::new("secret", None);

        let err = verifier.verify(&token("other", 600)).await.unwrap_err();
        assert_eq!(err.1, axum::http::StatusCode::UNAUTHORIZED);

        let err = verifier.verify(&token("secret", -600)).await.unwrap_err();
        assert_eq!(err.1, axum::http::StatusCode::UNAUTHORIZED);

        let err = verifier.verify("not-a-jwt").await.unwrap_err();
        assert_eq!(err.1, axum::http::StatusCode::UNAUTHORIZED);
    }
}
