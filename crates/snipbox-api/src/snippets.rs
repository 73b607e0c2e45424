use axum::{
    Extension,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::{debug, info};
use uuid::Uuid;

use snipbox_db::models::{NewSnippetRow, SnippetRow};
use snipbox_types::api::{ListQuery, NewSnippet, SearchQuery, SnippetPatch};
use snipbox_types::models::{SiteStats, Snippet};
use snipbox_types::validate::{SearchMode, classify_search};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::middleware::{Claims, Viewer};
use crate::{AppState, blocking, convert};

/// Size of the listing shown when a search query is too short.
pub const RECENT_FALLBACK_LIMIT: u32 = 10;
pub const TRENDING_LIMIT: u32 = 5;

/// POST /snippets
pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<NewSnippet>,
) -> Result<impl IntoResponse, ApiError> {
    let snippet = req.validated()?;
    let id = Uuid::new_v4().to_string();
    let uid = claims.sub.to_string();

    let row = blocking(&state, move |db| {
        db.insert_snippet(&NewSnippetRow {
            id: &id,
            user_id: &uid,
            title: &snippet.title,
            description: snippet.description.as_deref(),
            code: &snippet.code,
            language: &snippet.language,
            visibility: snippet.visibility.as_str(),
            tags: &snippet.tags,
        })?;
        db.get_owned_snippet(&id, &uid)?.ok_or(ApiError::Internal)
    })
    .await?;

    info!("User {} created snippet {}", claims.sub, row.id);
    Ok((StatusCode::CREATED, Json(convert::snippet(row))))
}

/// PATCH /snippets/{id}: owner only. Someone else's snippet is reported
/// as missing.
pub async fn update(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(patch): Json<SnippetPatch>,
) -> Result<Json<Snippet>, ApiError> {
    let patch = patch.validated()?;
    let (sid, uid) = (id.to_string(), claims.sub.to_string());

    let row = blocking(&state, move |db| {
        if !db.update_snippet(&sid, &uid, &patch)? {
            return Err(ApiError::SnippetNotFound);
        }
        db.get_owned_snippet(&sid, &uid)?.ok_or(ApiError::SnippetNotFound)
    })
    .await?;

    Ok(Json(convert::snippet(row)))
}

/// DELETE /snippets/{id}: owner only.
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let (sid, uid) = (id.to_string(), claims.sub.to_string());
    let deleted = blocking(&state, move |db| Ok(db.delete_snippet(&sid, &uid)?)).await?;
    if !deleted {
        return Err(ApiError::SnippetNotFound);
    }

    info!("User {} deleted snippet {}", claims.sub, id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /snippets/{id}
pub async fn get(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<Json<Snippet>, ApiError> {
    let row = load_for_viewer(&state, id, &viewer, true).await?;
    Ok(Json(convert::snippet(row)))
}

/// GET /snippets/{id}/raw: the code alone, same access rule, no view.
pub async fn raw(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let row = load_for_viewer(&state, id, &viewer, false).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], row.code))
}

/// Fetch a snippet the viewer is allowed to see. The visibility rule is part
/// of the query, so a gated row is never read. With `count_view`, the view
/// is recorded once per viewer key in the same transaction and reflected in
/// the returned row.
pub(crate) async fn load_for_viewer(
    state: &AppState,
    id: Uuid,
    viewer: &Viewer,
    count_view: bool,
) -> Result<SnippetRow, ApiError> {
    let sid = id.to_string();
    let viewer_id = viewer.user_id.map(|u| u.to_string());
    let key = viewer.key.clone();

    blocking(state, move |db| {
        let row = if count_view {
            db.view_visible_snippet(&sid, viewer_id.as_deref(), &key)?
        } else {
            db.get_visible_snippet(&sid, viewer_id.as_deref())?
        };
        row.ok_or(ApiError::SnippetNotFound)
    })
    .await
}

/// GET /snippets?limit=&page=
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Snippet>>, ApiError> {
    let (limit, offset) = query.window();
    let rows = blocking(&state, move |db| Ok(db.recent_public(limit, offset)?)).await?;
    Ok(Json(convert::snippets(rows)))
}

/// GET /snippets/search?q=&language=
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Snippet>>, ApiError> {
    let rows = search_rows(&state, query).await?;
    Ok(Json(convert::snippets(rows)))
}

pub(crate) async fn search_rows(state: &AppState, query: SearchQuery) -> Result<Vec<SnippetRow>, ApiError> {
    let language = query
        .language
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());

    blocking(state, move |db| match classify_search(&query.q) {
        SearchMode::Recent => {
            debug!("Search query too short, returning recent snippets");
            Ok(db.recent_public(RECENT_FALLBACK_LIMIT, 0)?)
        }
        SearchMode::Search(q) => Ok(db.search_public(q, language.as_deref())?),
    })
    .await
}

/// GET /snippets/trending
pub async fn trending(State(state): State<AppState>) -> Result<Json<Vec<Snippet>>, ApiError> {
    let rows = blocking(&state, |db| Ok(db.trending_public(TRENDING_LIMIT)?)).await?;
    Ok(Json(convert::snippets(rows)))
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<SiteStats>, ApiError> {
    Ok(Json(site_stats(&state).await?))
}

pub(crate) async fn site_stats(state: &AppState) -> Result<SiteStats, ApiError> {
    blocking(state, |db| {
        Ok(SiteStats {
            snippets: db.count_public_snippets()?,
            users: db.count_users()?,
        })
    })
    .await
}
