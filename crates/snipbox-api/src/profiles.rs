use axum::{Extension, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use snipbox_db::models::ProfileChanges;
use snipbox_types::api::ProfilePatch;
use snipbox_types::models::{Profile, Snippet, UserStats};
use snipbox_types::validate;

use crate::error::{ApiError, account_conflict};
use crate::extract::Json;
use crate::middleware::Claims;
use crate::{AppState, blocking, convert};

/// GET /me
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Profile>, ApiError> {
    let uid = claims.sub.to_string();
    let row = blocking(&state, move |db| db.get_profile(&uid)?.ok_or(ApiError::NotFound)).await?;
    Ok(Json(convert::profile(row)))
}

/// PATCH /me
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<Profile>, ApiError> {
    let changes = profile_changes(patch)?;
    let uid = claims.sub.to_string();

    let row = blocking(&state, move |db| {
        db.update_profile(&uid, &changes)
            .map_err(account_conflict)?
            .ok_or(ApiError::NotFound)
    })
    .await?;

    Ok(Json(convert::profile(row)))
}

/// Trim every field; an empty value clears it. A non-empty username must
/// pass the usual rules.
fn profile_changes(patch: ProfilePatch) -> Result<ProfileChanges, ApiError> {
    fn cleared(value: Option<String>) -> Option<Option<String>> {
        value.map(|v| Some(v.trim().to_string()).filter(|v| !v.is_empty()))
    }

    let changes = ProfileChanges {
        username: cleared(patch.username),
        bio: cleared(patch.bio),
        website: cleared(patch.website),
    };
    if let Some(Some(username)) = &changes.username {
        validate::check_username(username)?;
    }
    Ok(changes)
}

/// GET /me/snippets: every visibility, newest first.
pub async fn my_snippets(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Snippet>>, ApiError> {
    let uid = claims.sub.to_string();
    let rows = blocking(&state, move |db| Ok(db.user_snippets(&uid)?)).await?;
    Ok(Json(convert::snippets(rows)))
}

/// GET /me/stats
pub async fn my_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserStats>, ApiError> {
    let uid = claims.sub.to_string();
    let (totals, profile) = blocking(&state, move |db| {
        let totals = db.user_snippet_totals(&uid)?;
        let profile = db.get_profile(&uid)?.ok_or(ApiError::NotFound)?;
        Ok((totals, profile))
    })
    .await?;

    let created = convert::parse_time(&profile.created_at, "profile created_at");
    Ok(Json(UserStats {
        total_snippets: totals.0,
        total_views: totals.1,
        account_age_days: account_age_days(created, Utc::now()),
    }))
}

/// Whole days since `created`, counting a started day as a full one.
pub(crate) fn account_age_days(created: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let secs = (now - created).num_seconds().max(0) as u64;
    secs.div_ceil(86_400)
}

/// DELETE /me: removes the account and everything it owns.
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let uid = claims.sub.to_string();
    let deleted = blocking(&state, move |db| Ok(db.delete_account(&uid)?)).await?;
    if !deleted {
        return Err(ApiError::NotFound);
    }

    if let Err(e) = state.avatars.remove_all(claims.sub).await {
        warn!("Account {} deleted but avatar cleanup failed: {}", claims.sub, e);
    }
    info!("Account {} deleted", claims.sub);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn empty_fields_clear() {
        let changes = profile_changes(ProfilePatch {
            username: Some("  ann_1 ".into()),
            bio: Some("   ".into()),
            website: None,
        })
        .unwrap();
        assert_eq!(changes.username, Some(Some("ann_1".into())));
        assert_eq!(changes.bio, Some(None));
        assert_eq!(changes.website, None);
    }

    #[test]
    fn bad_username_rejected() {
        let r = profile_changes(ProfilePatch {
            username: Some("a b".into()),
            ..Default::default()
        });
        assert!(matches!(r, Err(ApiError::Validation(_))));
    }

    #[test]
    fn account_age_rounds_up() {
        let t = Utc::now();
        assert_eq!(account_age_days(t, t), 0);
        assert_eq!(account_age_days(t, t + Duration::minutes(1)), 1);
        assert_eq!(account_age_days(t, t + Duration::days(2)), 2);
        assert_eq!(account_age_days(t, t + Duration::days(2) + Duration::seconds(1)), 3);
        assert_eq!(account_age_days(t + Duration::days(1), t), 0);
    }
}
