pub mod auth;
pub mod avatars;
pub mod convert;
pub mod error;
pub mod extract;
pub mod mail;
pub mod middleware;
pub mod oauth;
pub mod pages;
pub mod profiles;
pub mod render;
pub mod snippets;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, patch, post, put},
};
use tracing::error;

use snipbox_db::Database;

use crate::avatars::{AVATAR_BODY_LIMIT, AvatarStore};
use crate::error::ApiError;
use crate::mail::Mailer;
use crate::middleware::require_auth;
use crate::oauth::OAuthProviders;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Externally visible origin, no trailing slash. Used for avatar URLs,
    /// OAuth callbacks and reset links.
    pub public_url: String,
    pub session_ttl: chrono::Duration,
    pub avatars: AvatarStore,
    pub oauth: OAuthProviders,
    pub mailer: Arc<dyn Mailer>,
    pub http: reqwest::Client,
}

/// Everything the API layer needs besides the database.
pub struct ApiConfig {
    pub jwt_secret: String,
    pub public_url: String,
    pub session_ttl: chrono::Duration,
    pub storage_dir: PathBuf,
    pub oauth: OAuthProviders,
}

impl AppStateInner {
    pub async fn new(db: Database, config: ApiConfig, mailer: Arc<dyn Mailer>) -> anyhow::Result<AppState> {
        let avatars = AvatarStore::new(config.storage_dir.join("avatars")).await?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("snipbox/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Arc::new(Self {
            db,
            jwt_secret: config.jwt_secret,
            public_url: config.public_url.trim_end_matches('/').to_string(),
            session_ttl: config.session_ttl,
            avatars,
            oauth: config.oauth,
            mailer,
            http,
        }))
    }
}

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::sign_up))
        .route("/auth/signin", post(auth::sign_in))
        .route("/auth/recover", post(auth::recover))
        .route("/auth/reset", post(auth::reset_password))
        .route("/auth/oauth/{provider}", get(oauth::start))
        .route("/auth/callback/{provider}", get(oauth::callback))
        .route("/snippets", get(snippets::list))
        .route("/snippets/search", get(snippets::search))
        .route("/snippets/trending", get(snippets::trending))
        .route("/snippets/{id}", get(snippets::get))
        .route("/snippets/{id}/raw", get(snippets::raw))
        .route("/stats", get(snippets::stats))
        .route("/avatars/{file}", get(avatars::serve))
        .route("/", get(pages::index))
        .route("/view", get(pages::view))
        .route("/auth", get(pages::auth))
        .route("/create", get(pages::create))
        .route("/reset-password", get(pages::reset_password))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/auth/signout", post(auth::sign_out))
        .route("/auth/session", get(auth::session))
        .route("/snippets", post(snippets::create))
        .route("/snippets/{id}", patch(snippets::update).delete(snippets::delete))
        .route(
            "/me",
            get(profiles::get_me).patch(profiles::update_me).delete(profiles::delete_me),
        )
        .route("/me/snippets", get(profiles::my_snippets))
        .route("/me/stats", get(profiles::my_stats))
        .route(
            "/me/avatar",
            put(avatars::upload).layer(DefaultBodyLimit::max(AVATAR_BODY_LIMIT)),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

pub async fn health() -> &'static str {
    "ok"
}

/// Run blocking database work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
}
