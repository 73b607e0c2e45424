//! Row to API model conversion. Corrupt columns are logged and defaulted
//! instead of failing the whole response.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use snipbox_db::models::{ProfileRow, SnippetRow, UserRow};
use snipbox_types::models::{Author, CurrentUser, Profile, Snippet, Visibility};

pub fn parse_uuid(value: &str, what: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, value, e);
        Uuid::default()
    })
}

pub fn parse_time(value: &str, what: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by SQLite's datetime('now') have no timezone.
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", what, value, e);
            DateTime::default()
        })
}

pub fn snippet(row: SnippetRow) -> Snippet {
    let visibility = row.visibility.parse().unwrap_or_else(|e| {
        warn!("Snippet {}: {}", row.id, e);
        Visibility::Private
    });
    let tags = serde_json::from_str(&row.tags).unwrap_or_else(|e| {
        warn!("Corrupt tags '{}' on snippet '{}': {}", row.tags, row.id, e);
        Vec::new()
    });

    Snippet {
        id: parse_uuid(&row.id, "snippet id"),
        user_id: parse_uuid(&row.user_id, "snippet user_id"),
        author: Author {
            username: row.author_username,
            avatar_url: row.author_avatar_url,
        },
        title: row.title,
        description: row.description,
        code: row.code,
        language: row.language,
        visibility,
        tags,
        views: row.views.max(0) as u64,
        created_at: parse_time(&row.created_at, "snippet created_at"),
        updated_at: parse_time(&row.updated_at, "snippet updated_at"),
    }
}

pub fn snippets(rows: Vec<SnippetRow>) -> Vec<Snippet> {
    rows.into_iter().map(snippet).collect()
}

pub fn profile(row: ProfileRow) -> Profile {
    Profile {
        id: parse_uuid(&row.id, "profile id"),
        username: row.username,
        bio: row.bio,
        website: row.website,
        avatar_url: row.avatar_url,
        created_at: parse_time(&row.created_at, "profile created_at"),
    }
}

pub fn current_user(user: UserRow, profile: Option<ProfileRow>) -> CurrentUser {
    CurrentUser {
        id: parse_uuid(&user.id, "user id"),
        email: user.email,
        username: profile.and_then(|p| p.username),
        created_at: parse_time(&user.created_at, "user created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(visibility: &str, tags: &str) -> SnippetRow {
        SnippetRow {
            id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            author_username: Some("ann".into()),
            author_avatar_url: None,
            title: "t".into(),
            description: None,
            code: "c".into(),
            language: "rust".into(),
            visibility: visibility.into(),
            tags: tags.into(),
            views: 3,
            created_at: "2025-01-02T03:04:05.678Z".into(),
            updated_at: "2025-01-02 03:04:05".into(),
        }
    }

    #[test]
    fn converts_rows() {
        let s = snippet(row("unlisted", r#"["a","b"]"#));
        assert_eq!(s.visibility, Visibility::Unlisted);
        assert_eq!(s.tags, vec!["a", "b"]);
        assert_eq!(s.views, 3);
        assert_eq!(s.created_at.timestamp_subsec_millis(), 678);
        assert_eq!(s.updated_at.to_rfc3339(), "2025-01-02T03:04:05+00:00");
    }

    #[test]
    fn corrupt_columns_fail_closed() {
        let s = snippet(row("weird", "not json"));
        assert_eq!(s.visibility, Visibility::Private);
        assert!(s.tags.is_empty());
    }
}
