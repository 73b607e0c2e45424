use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;
use crate::{AppState, blocking};

pub use snipbox_types::api::VIEWER_KEY_HEADER;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    /// Session row backing this token; deleting it revokes the token.
    pub sid: Uuid,
    pub exp: usize,
}

/// Extract and validate the bearer token, then require its session to be live.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::Unauthorized)?;
    let claims = authenticate(&state, &token).await?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

pub(crate) async fn authenticate(state: &AppState, token: &str) -> Result<Claims, ApiError> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?
    .claims;

    let (sid, uid) = (claims.sid.to_string(), claims.sub.to_string());
    let active = blocking(state, move |db| Ok(db.session_is_active(&sid, &uid)?)).await?;
    if !active {
        return Err(ApiError::Unauthorized);
    }
    Ok(claims)
}

/// Whoever is looking at a snippet: the signed-in user if a valid token was
/// sent, otherwise an anonymous fingerprint. A token that is present but
/// invalid is rejected rather than silently downgraded.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user_id: Option<Uuid>,
    /// Stable key used to count a view once.
    pub key: String,
}

impl FromRequestParts<AppState> for Viewer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(&parts.headers) {
            let claims = authenticate(state, &token).await?;
            return Ok(Self {
                user_id: Some(claims.sub),
                key: format!("user:{}", claims.sub),
            });
        }

        let ip = forwarded_for(&parts.headers).or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });
        Ok(Self {
            user_id: None,
            key: anonymous_key(
                ip.as_deref(),
                header_str(&parts.headers, "user-agent"),
                header_str(&parts.headers, VIEWER_KEY_HEADER),
            ),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")?
        .split(',')
        .next()
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

/// Hash of what we know about an anonymous viewer. Raw addresses are never
/// stored.
pub(crate) fn anonymous_key(ip: Option<&str>, user_agent: Option<&str>, viewer_key: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    for part in [ip, user_agent, viewer_key] {
        hasher.update(part.unwrap_or_default().as_bytes());
        hasher.update([0u8]);
    }
    format!("anon:{}", hex::encode(hasher.finalize()))
}
