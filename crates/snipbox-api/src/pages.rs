use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use snipbox_types::api::{ListQuery, SearchQuery};
use snipbox_types::nav::{AuthPageQuery, AuthTab, safe_redirect};
use snipbox_types::validate::{SearchMode, classify_search};

use crate::error::ApiError;
use crate::extract::Query;
use crate::middleware::Viewer;
use crate::render::{self, IndexView};
use crate::snippets::{TRENDING_LIMIT, load_for_viewer, search_rows, site_stats};
use crate::{AppState, blocking, convert};

/// Snippets per page on the home listing.
pub const PAGE_SIZE: u32 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct IndexQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

/// GET /?q=&page=
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
) -> Result<Html<String>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let q = query.q.unwrap_or_default();
    let searching = matches!(classify_search(&q), SearchMode::Search(_));

    let (rows, has_next) = if searching {
        let rows = search_rows(
            &state,
            SearchQuery {
                q: q.clone(),
                language: None,
            },
        )
        .await?;
        (rows, false)
    } else {
        let (limit, offset) = ListQuery { limit: PAGE_SIZE, page }.window();
        // One extra row tells whether an older page exists.
        let mut rows = blocking(&state, move |db| Ok(db.recent_public(limit + 1, offset)?)).await?;
        let has_next = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        (rows, has_next)
    };

    let trending = blocking(&state, |db| Ok(db.trending_public(TRENDING_LIMIT)?)).await?;
    let stats = site_stats(&state).await?;

    let snippets = convert::snippets(rows);
    let trending = convert::snippets(trending);
    let view = IndexView {
        query: searching.then_some(q.trim()),
        snippets: &snippets,
        page,
        has_next,
        trending: &trending,
        stats,
    };
    Ok(Html(render::index_page(&view, Utc::now())))
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub id: Option<String>,
}

/// GET /view?id=: a missing, malformed or hidden snippet all render the
/// same not-found page.
pub async fn view(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<ViewQuery>,
) -> Result<Response, ApiError> {
    let Some(id) = query.id.as_deref().and_then(|id| id.trim().parse::<Uuid>().ok()) else {
        return Ok(not_found());
    };

    let row = match load_for_viewer(&state, id, &viewer, true).await {
        Ok(row) => row,
        Err(ApiError::SnippetNotFound) => return Ok(not_found()),
        Err(e) => return Err(e),
    };

    let snippet = convert::snippet(row);
    let is_owner = viewer.user_id == Some(snippet.user_id);
    let page_url = format!("{}/view?id={}", state.public_url, snippet.id);
    Ok(Html(render::view_page(&snippet, is_owner, &page_url)).into_response())
}

/// GET /auth?tab=&redirect=: a signed-in viewer goes straight to the
/// redirect target.
pub async fn auth(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<AuthPageQuery>,
) -> Response {
    let target = safe_redirect(&state.public_url, query.redirect.as_deref(), "/");
    if viewer.user_id.is_some() {
        return Redirect::to(&target).into_response();
    }
    Html(render::auth_page(
        &state.public_url,
        query.tab(),
        &target,
        &state.oauth.enabled(),
    ))
    .into_response()
}

/// GET /create?id=: empty form, or the owner's snippet for editing.
/// Anonymous viewers are sent to sign in and brought back here.
pub async fn create(
    State(state): State<AppState>,
    viewer: Viewer,
    Query(query): Query<ViewQuery>,
) -> Result<Response, ApiError> {
    let id = query.id.as_deref().map(str::trim).filter(|id| !id.is_empty());
    let Some(user_id) = viewer.user_id else {
        let back = match id {
            Some(id) => format!("/create?id={id}"),
            None => "/create".to_string(),
        };
        let login = render::site_url(
            &state.public_url,
            "/auth",
            &[("tab", AuthTab::Signin.as_str()), ("redirect", &back)],
        );
        return Ok(Redirect::to(&login).into_response());
    };

    let Some(id) = id else {
        return Ok(Html(render::editor_page(None)).into_response());
    };
    let Ok(id) = id.parse::<Uuid>() else {
        return Ok(not_found());
    };

    let (sid, uid) = (id.to_string(), user_id.to_string());
    let row = blocking(&state, move |db| Ok(db.get_owned_snippet(&sid, &uid)?)).await?;
    Ok(match row {
        Some(row) => Html(render::editor_page(Some(&convert::snippet(row)))).into_response(),
        None => not_found(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /reset-password?token=: target of the emailed reset link.
pub async fn reset_password(Query(query): Query<ResetQuery>) -> Html<String> {
    let token = query.token.as_deref().map(str::trim).filter(|t| !t.is_empty());
    Html(render::reset_page(token))
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html(render::not_found_page())).into_response()
}
