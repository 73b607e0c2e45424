//! Third-party sign-in (authorization code flow) for GitHub and Google.

use axum::{extract::State, response::Redirect};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use snipbox_db::models::NewAccount;
use snipbox_types::api::{OAuthCallbackQuery, OAuthStartQuery};
use snipbox_types::nav::safe_redirect;

use crate::auth::issue_session;
use crate::error::{ApiError, account_conflict};
use crate::extract::{Path, Query};
use crate::{AppState, blocking, convert};

const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Github,
    Google,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Self::Github, Self::Google];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "github" => Some(Self::Github),
            "google" => Some(Self::Google),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Google => "google",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Github => "GitHub",
            Self::Google => "Google",
        }
    }

    fn authorize_endpoint(&self) -> &'static str {
        match self {
            Self::Github => "https://github.com/login/oauth/authorize",
            Self::Google => "https://accounts.google.com/o/oauth2/v2/auth",
        }
    }

    fn token_endpoint(&self) -> &'static str {
        match self {
            Self::Github => "https://github.com/login/oauth/access_token",
            Self::Google => "https://oauth2.googleapis.com/token",
        }
    }

    fn scope(&self) -> &'static str {
        match self {
            Self::Github => "read:user user:email",
            Self::Google => "openid email profile",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

/// Configured providers; an absent entry means the provider is disabled.
#[derive(Debug, Clone, Default)]
pub struct OAuthProviders {
    pub github: Option<OAuthClient>,
    pub google: Option<OAuthClient>,
}

impl OAuthProviders {
    pub fn get(&self, provider: Provider) -> Option<&OAuthClient> {
        match provider {
            Provider::Github => self.github.as_ref(),
            Provider::Google => self.google.as_ref(),
        }
    }

    /// Providers with credentials configured, in display order.
    pub fn enabled(&self) -> Vec<Provider> {
        Provider::ALL.into_iter().filter(|p| self.get(*p).is_some()).collect()
    }
}

/// Signed `state` parameter: binds the callback to the provider it was
/// started for and carries the post-login redirect.
#[derive(Debug, Serialize, Deserialize)]
struct OAuthState {
    provider: Provider,
    redirect_to: String,
    nonce: Uuid,
    exp: usize,
}

/// GET /auth/oauth/{provider}: redirect the browser to the provider.
pub async fn start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthStartQuery>,
) -> Result<Redirect, ApiError> {
    let provider = Provider::parse(&provider).ok_or(ApiError::ProviderDisabled)?;
    let client = state.oauth.get(provider).ok_or(ApiError::ProviderDisabled)?;

    let claims = OAuthState {
        provider,
        redirect_to: safe_redirect(&state.public_url, query.redirect_to.as_deref(), "/"),
        nonce: Uuid::new_v4(),
        exp: (Utc::now() + Duration::minutes(STATE_TTL_MINUTES)).timestamp() as usize,
    };
    let state_token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )
    .map_err(anyhow::Error::from)?;

    let url = authorize_url(provider, client, &callback_url(&state, provider), &state_token)?;
    Ok(Redirect::to(url.as_str()))
}

pub(crate) fn authorize_url(
    provider: Provider,
    client: &OAuthClient,
    callback: &str,
    state_token: &str,
) -> Result<Url, ApiError> {
    let mut params = vec![
        ("client_id", client.client_id.as_str()),
        ("redirect_uri", callback),
        ("response_type", "code"),
        ("scope", provider.scope()),
        ("state", state_token),
    ];
    if provider == Provider::Google {
        params.push(("access_type", "offline"));
        params.push(("prompt", "consent"));
    }
    Url::parse_with_params(provider.authorize_endpoint(), &params)
        .map_err(|e| anyhow::Error::from(e).into())
}

fn callback_url(state: &AppState, provider: Provider) -> String {
    format!("{}/auth/callback/{}", state.public_url, provider.as_str())
}

/// GET /auth/callback/{provider}: finish the flow and hand the new
/// session to the page that started it via the URL fragment.
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Redirect, ApiError> {
    let provider = Provider::parse(&provider).ok_or(ApiError::ProviderDisabled)?;
    let client = state.oauth.get(provider).ok_or(ApiError::ProviderDisabled)?;

    let claims = decode::<OAuthState>(
        &query.state,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!("Rejected OAuth state: {}", e);
        ApiError::OAuthFailed
    })?
    .claims;
    if claims.provider != provider {
        warn!("OAuth state was issued for {:?}, callback is {:?}", claims.provider, provider);
        return Err(ApiError::OAuthFailed);
    }

    let access_token =
        exchange_code(&state.http, provider, client, &query.code, &callback_url(&state, provider)).await?;
    let identity = fetch_identity(&state.http, provider, &access_token).await?;
    let user_id = link_or_create(&state, provider, identity).await?;
    let session = issue_session(&state, user_id).await?;

    info!("User {} signed in with {}", user_id, provider.as_str());
    let target = format!(
        "{}#access_token={}&token_type=bearer&expires_at={}",
        claims.redirect_to,
        session.access_token,
        session.expires_at.timestamp()
    );
    Ok(Redirect::to(&target))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

async fn exchange_code(
    http: &reqwest::Client,
    provider: Provider,
    client: &OAuthClient,
    code: &str,
    callback: &str,
) -> Result<String, ApiError> {
    let params = [
        ("client_id", client.client_id.as_str()),
        ("client_secret", client.client_secret.as_str()),
        ("code", code),
        ("redirect_uri", callback),
        ("grant_type", "authorization_code"),
    ];
    let resp = http
        .post(provider.token_endpoint())
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&params)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| upstream(provider, e))?;

    let token: TokenResponse = resp.json().await.map_err(|e| upstream(provider, e))?;
    Ok(token.access_token)
}

/// What we need from the provider to find or create the local account.
#[derive(Debug)]
struct ProviderIdentity {
    subject: String,
    email: String,
    login: String,
}

#[derive(Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    email: Option<String>,
}

#[derive(Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Deserialize)]
struct GoogleUser {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

async fn fetch_identity(
    http: &reqwest::Client,
    provider: Provider,
    access_token: &str,
) -> Result<ProviderIdentity, ApiError> {
    match provider {
        Provider::Github => {
            let user: GithubUser = get_json(http, provider, "https://api.github.com/user", access_token).await?;
            let email = match user.email {
                Some(email) => email,
                None => {
                    let emails: Vec<GithubEmail> =
                        get_json(http, provider, "https://api.github.com/user/emails", access_token).await?;
                    emails
                        .into_iter()
                        .find(|e| e.primary && e.verified)
                        .map(|e| e.email)
                        .ok_or(ApiError::OAuthFailed)?
                }
            };
            Ok(ProviderIdentity {
                subject: user.id.to_string(),
                email,
                login: user.login,
            })
        }
        Provider::Google => {
            let user: GoogleUser = get_json(
                http,
                provider,
                "https://openidconnect.googleapis.com/v1/userinfo",
                access_token,
            )
            .await?;
            let email = user
                .email
                .filter(|_| user.email_verified)
                .ok_or(ApiError::OAuthFailed)?;
            let login = email.split('@').next().unwrap_or_default().to_string();
            Ok(ProviderIdentity {
                subject: user.sub,
                email,
                login,
            })
        }
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    provider: Provider,
    url: &str,
    access_token: &str,
) -> Result<T, ApiError> {
    http.get(url)
        .bearer_auth(access_token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| upstream(provider, e))?
        .json()
        .await
        .map_err(|e| upstream(provider, e))
}

fn upstream(provider: Provider, e: reqwest::Error) -> ApiError {
    warn!("{} OAuth request failed: {}", provider.as_str(), e);
    ApiError::OAuthFailed
}

/// Existing link wins; otherwise an account with the same (provider
/// verified) email is linked; otherwise a fresh account is created.
async fn link_or_create(
    state: &AppState,
    provider: Provider,
    identity: ProviderIdentity,
) -> Result<Uuid, ApiError> {
    blocking(state, move |db| {
        let p = provider.as_str();
        if let Some(user_id) = db.find_identity(p, &identity.subject)? {
            return Ok(convert::parse_uuid(&user_id, "identity user_id"));
        }

        let email = identity.email.trim().to_lowercase();
        if let Some(user) = db.get_user_by_email(&email)? {
            db.link_identity(p, &identity.subject, &user.id)?;
            return Ok(convert::parse_uuid(&user.id, "user id"));
        }

        let user_id = Uuid::new_v4();
        let username = db.available_username(&username_base(&identity.login))?;
        db.create_oauth_account(
            &NewAccount {
                id: &user_id.to_string(),
                email: &email,
                password_hash: None,
                username: Some(&username),
            },
            p,
            &identity.subject,
        )
        .map_err(account_conflict)?;
        info!("Created account {} ({}) from {}", user_id, username, p);
        Ok(user_id)
    })
    .await
}

/// Reduce a provider login to something that passes username validation,
/// leaving room for a numeric suffix.
pub(crate) fn username_base(login: &str) -> String {
    let mut base: String = login
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .take(28)
        .collect();
    while base.chars().count() < 3 {
        base.push('_');
    }
    base
}
