use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::SaltString,
};
use axum::{Extension, extract::State, http::StatusCode, response::IntoResponse};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use snipbox_db::models::NewAccount;
use snipbox_types::api::{AuthResponse, RecoverRequest, ResetPasswordRequest, SignInRequest, SignUpRequest};
use snipbox_types::models::{CurrentUser, Session};
use snipbox_types::nav::safe_redirect;
use snipbox_types::validate;

use crate::error::{ApiError, account_conflict};
use crate::extract::Json;
use crate::middleware::Claims;
use crate::{AppState, blocking, convert};

const RESET_TOKEN_TTL_HOURS: i64 = 1;

pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let username = req.username.trim().to_string();
    validate::check_email(&email)?;
    validate::check_password(&req.password)?;
    validate::check_username(&username)?;

    let user_id = Uuid::new_v4();
    let password = req.password;
    let (e, u) = (email.clone(), username.clone());
    blocking(&state, move |db| {
        let password_hash = hash_password(&password)?;
        db.create_account(&NewAccount {
            id: &user_id.to_string(),
            email: &e,
            password_hash: Some(&password_hash),
            username: Some(&u),
        })
        .map_err(account_conflict)
    })
    .await?;

    info!("User {} registered as {}", user_id, username);

    let session = issue_session(&state, user_id).await?;
    let user = load_current_user(&state, user_id).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, session })))
}

pub async fn sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = req.email.trim().to_lowercase();
    let password = req.password;

    let user_id = blocking(&state, move |db| {
        let user = db.get_user_by_email(&email)?.ok_or(ApiError::InvalidCredentials)?;
        // OAuth-only accounts have no password to check against.
        let stored = user.password.ok_or(ApiError::InvalidCredentials)?;
        verify_password(&password, &stored)?;
        Ok(convert::parse_uuid(&user.id, "user id"))
    })
    .await?;

    let session = issue_session(&state, user_id).await?;
    let user = load_current_user(&state, user_id).await?;
    Ok(Json(AuthResponse { user, session }))
}

pub async fn sign_out(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let sid = claims.sid.to_string();
    blocking(&state, move |db| Ok(db.delete_session(&sid)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<CurrentUser>, ApiError> {
    Ok(Json(load_current_user(&state, claims.sub).await?))
}

/// Always answers 204 so the endpoint cannot be used to discover which emails
/// have accounts.
pub async fn recover(
    State(state): State<AppState>,
    Json(req): Json<RecoverRequest>,
) -> Result<StatusCode, ApiError> {
    let email = req.email.trim().to_lowercase();
    let token = URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>());
    let token_hash = sha256_hex(&token);
    let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);

    let e = email.clone();
    let user_id = blocking(&state, move |db| {
        let Some(user) = db.get_user_by_email(&e)? else {
            return Ok(None);
        };
        db.create_password_reset(&token_hash, &user.id, expires_at)?;
        Ok(Some(user.id))
    })
    .await?;

    match user_id {
        Some(user_id) => {
            let base = safe_redirect(&state.public_url, req.redirect_to.as_deref(), "/reset-password");
            let sep = if base.contains('?') { '&' } else { '?' };
            let link = format!("{base}{sep}token={token}");
            if let Err(e) = state.mailer.send_password_reset(&email, &link) {
                error!("Failed to send password reset for user {}: {:#}", user_id, e);
            } else {
                info!("Password reset issued for user {}", user_id);
            }
        }
        None => warn!("Password reset requested for unknown email"),
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    validate::check_password(&req.password)?;
    let token_hash = sha256_hex(req.token.trim());
    let password = req.password;

    let user_id = blocking(&state, move |db| {
        let user_id = db
            .consume_password_reset(&token_hash)?
            .ok_or(ApiError::InvalidResetToken)?;
        let password_hash = hash_password(&password)?;
        db.set_password(&user_id, &password_hash)?;
        db.delete_user_sessions(&user_id)?;
        Ok(user_id)
    })
    .await?;

    info!("Password reset completed for user {}; sessions revoked", user_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Create a session row and the bearer token that refers to it.
pub(crate) async fn issue_session(state: &AppState, user_id: Uuid) -> Result<Session, ApiError> {
    let sid = Uuid::new_v4();
    let expires_at = Utc::now() + state.session_ttl;
    let access_token = create_token(&state.jwt_secret, user_id, sid, expires_at.timestamp() as usize)?;

    let (s, u) = (sid.to_string(), user_id.to_string());
    blocking(state, move |db| Ok(db.create_session(&s, &u, expires_at)?)).await?;

    Ok(Session {
        access_token,
        token_type: "bearer".to_string(),
        expires_at,
    })
}

pub(crate) async fn load_current_user(state: &AppState, user_id: Uuid) -> Result<CurrentUser, ApiError> {
    let id = user_id.to_string();
    blocking(state, move |db| {
        let user = db.get_user_by_id(&id)?.ok_or(ApiError::Unauthorized)?;
        let profile = db.get_profile(&id)?;
        Ok(convert::current_user(user, profile))
    })
    .await
}

fn create_token(secret: &str, user_id: Uuid, sid: Uuid, exp: usize) -> Result<String, ApiError> {
    let claims = Claims { sub: user_id, sid, exp };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).map_err(|e| {
        error!("Failed to sign token: {}", e);
        ApiError::Internal
    })
}

/// Hash with Argon2id. CPU heavy; call from blocking context.
pub(crate) fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>()).map_err(|e| {
        error!("Salt encoding failed: {}", e);
        ApiError::Internal
    })?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            ApiError::Internal
        })
}

fn verify_password(password: &str, stored: &str) -> Result<(), ApiError> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        error!("Stored password hash is unreadable: {}", e);
        ApiError::Internal
    })?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::InvalidCredentials)
}

pub(crate) fn sha256_hex(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &hash).is_ok());
        assert!(matches!(verify_password("hunter23", &hash), Err(ApiError::InvalidCredentials)));
    }

    #[test]
    fn each_hash_gets_a_fresh_salt() {
        let a = hash_password("hunter22").unwrap();
        let b = hash_password("hunter22").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("hunter22", &b).is_ok());
    }

    #[test]
    fn token_hash_is_hex_sha256() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
