//! Typed client for the snipbox HTTP API.
//!
//! One [`SnipboxClient`] per browsing session: it keeps the signed-in
//! [`Session`] and a random viewer key so anonymous views are counted once
//! per session.

pub mod error;
pub mod forms;
pub mod messages;
pub mod search;

use std::sync::{PoisonError, RwLock};

use chrono::DateTime;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use snipbox_types::api::{
    AuthResponse, AvatarResponse, ErrorBody, ListQuery, NewSnippet, ProfilePatch, RecoverRequest,
    ResetPasswordRequest, SearchQuery, SignInRequest, SnippetPatch, VIEWER_KEY_HEADER,
};
use snipbox_types::models::{CurrentUser, Profile, Session, SiteStats, Snippet, UserStats};
use snipbox_types::nav::{self, AuthTab};
use snipbox_types::validate::{self, SearchMode, classify_search};

pub use crate::error::ClientError;
use crate::forms::SignUpForm;

/// Size of the recent listing shown in place of a too-short search.
pub const RECENT_LIMIT: u32 = 10;

pub type Result<T> = std::result::Result<T, ClientError>;

pub struct SnipboxClient {
    http: reqwest::Client,
    /// Server origin without a trailing slash.
    base: String,
    session: RwLock<Option<Session>>,
    viewer_key: String,
}

impl SnipboxClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    pub fn with_http(http: reqwest::Client, base_url: &str) -> Result<Self> {
        Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
            session: RwLock::new(None),
            viewer_key: Uuid::new_v4().to_string(),
        })
    }

    // -- Session --

    pub fn session(&self) -> Option<Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn is_signed_in(&self) -> bool {
        self.session().is_some()
    }

    /// Where to send the browser to sign in with `provider`. The server
    /// redirects back to `redirect_to` with the session in the fragment; see
    /// [`session_from_fragment`].
    pub fn oauth_url(&self, provider: &str, redirect_to: Option<&str>) -> Result<String> {
        let endpoint = format!("{}/auth/oauth/{}", self.base, provider);
        let url = match redirect_to {
            Some(r) => Url::parse_with_params(&endpoint, [("redirect_to", r)]),
            None => Url::parse(&endpoint),
        };
        url.map(String::from).map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    /// Auth page opened on `tab`, returning to `redirect` once signed in.
    pub fn auth_page_url(&self, tab: AuthTab, redirect: Option<&str>) -> Result<String> {
        let endpoint = format!("{}/auth", self.base);
        let mut params = vec![("tab", tab.as_str())];
        if let Some(r) = redirect {
            params.push(("redirect", r));
        }
        Url::parse_with_params(&endpoint, &params)
            .map(String::from)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    /// Where to go after signing in or up: the `redirect` parameter if it
    /// stays on this site, else the home page.
    pub fn redirect_after_auth(&self, redirect: Option<&str>) -> String {
        nav::safe_redirect(&self.base, redirect, "/")
    }

    // -- Auth --

    /// Validate the form locally, then register and keep the new session.
    pub async fn sign_up(&self, form: &SignUpForm) -> Result<CurrentUser> {
        let req = form.validate()?;
        let resp: AuthResponse = self.send(self.request(Method::POST, "/auth/signup").json(&req)).await?;
        self.set_session(Some(resp.session));
        Ok(resp.user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<CurrentUser> {
        let req = SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let resp: AuthResponse = self.send(self.request(Method::POST, "/auth/signin").json(&req)).await?;
        self.set_session(Some(resp.session));
        Ok(resp.user)
    }

    /// Revoke the session server-side. The local session is dropped even if
    /// the server already considered it invalid.
    pub async fn sign_out(&self) -> Result<()> {
        let result = self.send_empty(self.request(Method::POST, "/auth/signout")).await;
        self.set_session(None);
        match result {
            Err(e) if e.status() == Some(401) => Ok(()),
            other => other,
        }
    }

    /// The signed-in user, or `None` without a session or once the session
    /// was revoked.
    pub async fn current_user(&self) -> Result<Option<CurrentUser>> {
        if !self.is_signed_in() {
            return Ok(None);
        }
        match self.send(self.request(Method::GET, "/auth/session")).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.status() == Some(401) => {
                self.set_session(None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn request_password_reset(&self, email: &str, redirect_to: Option<&str>) -> Result<()> {
        let req = RecoverRequest {
            email: email.trim().to_string(),
            redirect_to: redirect_to.map(str::to_string),
        };
        self.send_empty(self.request(Method::POST, "/auth/recover").json(&req)).await
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<()> {
        validate::check_password(password)?;
        let req = ResetPasswordRequest {
            token: token.to_string(),
            password: password.to_string(),
        };
        self.send_empty(self.request(Method::POST, "/auth/reset").json(&req)).await
    }

    // -- Snippets --

    pub async fn create_snippet(&self, snippet: &NewSnippet) -> Result<Snippet> {
        self.send(self.request(Method::POST, "/snippets").json(snippet)).await
    }

    pub async fn update_snippet(&self, id: Uuid, patch: &SnippetPatch) -> Result<Snippet> {
        self.send(self.request(Method::PATCH, &format!("/snippets/{id}")).json(patch))
            .await
    }

    pub async fn delete_snippet(&self, id: Uuid) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, &format!("/snippets/{id}")))
            .await
    }

    /// Fetch one snippet, counting a view for this session.
    pub async fn get_snippet(&self, id: Uuid) -> Result<Snippet> {
        self.send(self.request(Method::GET, &format!("/snippets/{id}"))).await
    }

    pub async fn raw_snippet(&self, id: Uuid) -> Result<String> {
        let resp = self
            .request(Method::GET, &format!("/snippets/{id}/raw"))
            .send()
            .await?;
        Ok(check(resp).await?.text().await?)
    }

    pub async fn list_snippets(&self, query: ListQuery) -> Result<Vec<Snippet>> {
        let (limit, _) = query.window();
        let page = query.page.max(1);
        self.send(self.request(Method::GET, "/snippets").query(&[("limit", limit), ("page", page)]))
            .await
    }

    pub async fn search_snippets(&self, q: &str, language: Option<&str>) -> Result<Vec<Snippet>> {
        let query = SearchQuery {
            q: q.to_string(),
            language: language.map(str::to_string),
        };
        self.send(self.request(Method::GET, "/snippets/search").query(&query))
            .await
    }

    /// What the search box shows: the recent listing for short input,
    /// otherwise the search results.
    pub async fn search_or_recent(&self, q: &str) -> Result<Vec<Snippet>> {
        match classify_search(q) {
            SearchMode::Recent => {
                self.list_snippets(ListQuery {
                    limit: RECENT_LIMIT,
                    page: 1,
                })
                .await
            }
            SearchMode::Search(q) => self.search_snippets(q, None).await,
        }
    }

    pub async fn trending(&self) -> Result<Vec<Snippet>> {
        self.send(self.request(Method::GET, "/snippets/trending")).await
    }

    pub async fn stats(&self) -> Result<SiteStats> {
        self.send(self.request(Method::GET, "/stats")).await
    }

    // -- Dashboard --

    pub async fn profile(&self) -> Result<Profile> {
        self.send(self.request(Method::GET, "/me")).await
    }

    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<Profile> {
        self.send(self.request(Method::PATCH, "/me").json(patch)).await
    }

    pub async fn my_snippets(&self) -> Result<Vec<Snippet>> {
        self.send(self.request(Method::GET, "/me/snippets")).await
    }

    pub async fn my_stats(&self) -> Result<UserStats> {
        self.send(self.request(Method::GET, "/me/stats")).await
    }

    /// Upload an avatar image and return its public URL.
    pub async fn upload_avatar(&self, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let req = self
            .request(Method::PUT, "/me/avatar")
            .query(&[("filename", filename)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes);
        let resp: AvatarResponse = self.send(req).await?;
        Ok(resp.avatar_url)
    }

    pub async fn delete_account(&self) -> Result<()> {
        self.send_empty(self.request(Method::DELETE, "/me")).await?;
        self.set_session(None);
        Ok(())
    }

    // -- Plumbing --

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base, path))
            .header(VIEWER_KEY_HEADER, &self.viewer_key);
        if let Some(session) = self.session() {
            req = req.bearer_auth(session.access_token);
        }
        req
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = check(req.send().await?).await?;
        Ok(resp.json().await?)
    }

    async fn send_empty(&self, req: RequestBuilder) -> Result<()> {
        check(req.send().await?).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into [`ClientError::Api`], preferring the
/// server's error message over the bare status.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.error)
        .unwrap_or_else(|_| if text.trim().is_empty() { status.to_string() } else { text });
    debug!("API error {}: {}", status, message);
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Parse the `#access_token=...&token_type=...&expires_at=...` fragment the
/// OAuth callback redirects to. A leading `#` is accepted.
pub fn session_from_fragment(fragment: &str) -> Option<Session> {
    let query = fragment.trim_start_matches('#');
    let url = Url::parse(&format!("http://localhost/?{query}")).ok()?;

    let (mut access_token, mut token_type, mut expires_at) = (None, "bearer".to_string(), None);
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "access_token" => access_token = Some(value.into_owned()),
            "token_type" => token_type = value.into_owned(),
            "expires_at" => expires_at = value.parse::<i64>().ok(),
            _ => {}
        }
    }

    Some(Session {
        access_token: access_token.filter(|t| !t.is_empty())?,
        token_type,
        expires_at: DateTime::from_timestamp(expires_at?, 0)?,
    })
}

impl std::fmt::Debug for SnipboxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnipboxClient")
            .field("base", &self.base)
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_oauth_fragment() {
        let s = session_from_fragment("#access_token=abc.def&token_type=bearer&expires_at=1700000000").unwrap();
        assert_eq!(s.access_token, "abc.def");
        assert_eq!(s.expires_at.timestamp(), 1_700_000_000);
        assert!(session_from_fragment("access_token=x").is_none());
    }

    #[test]
    fn oauth_url_encodes_redirect() {
        let client = SnipboxClient::new("http://snip.test/").unwrap();
        assert_eq!(
            client.oauth_url("github", Some("/view?id=1")).unwrap(),
            "http://snip.test/auth/oauth/github?redirect_to=%2Fview%3Fid%3D1"
        );
        assert_eq!(client.oauth_url("google", None).unwrap(), "http://snip.test/auth/oauth/google");
    }

    #[test]
    fn auth_navigation_parameters() {
        let client = SnipboxClient::new("http://snip.test").unwrap();
        assert_eq!(
            client.auth_page_url(AuthTab::Signup, None).unwrap(),
            "http://snip.test/auth?tab=signup"
        );
        assert_eq!(
            client.auth_page_url(AuthTab::Signin, Some("/create")).unwrap(),
            "http://snip.test/auth?tab=signin&redirect=%2Fcreate"
        );
        assert_eq!(client.redirect_after_auth(Some("/create")), "http://snip.test/create");
        assert_eq!(client.redirect_after_auth(Some("https://evil.example")), "http://snip.test/");
        assert_eq!(client.redirect_after_auth(None), "http://snip.test/");
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(matches!(SnipboxClient::new("not a url"), Err(ClientError::InvalidUrl(_))));
    }
}
