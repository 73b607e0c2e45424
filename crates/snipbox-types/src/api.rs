use serde::{Deserialize, Serialize};

use crate::models::{CurrentUser, Session, Visibility};

// -- Errors --

/// Body of every non-2xx JSON response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// -- Auth --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: CurrentUser,
    pub session: Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecoverRequest {
    pub email: String,
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthStartQuery {
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub state: String,
}

// -- Snippets --

/// Header a client may send to identify an anonymous browsing session, so
/// views are deduplicated per session rather than per network address.
pub const VIEWER_KEY_HEADER: &str = "x-viewer-key";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewSnippet {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update of a snippet. Absent fields are left untouched; an empty
/// description clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnippetPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_page")]
    pub page: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            page: default_page(),
        }
    }
}

impl ListQuery {
    pub const MAX_LIMIT: u32 = 100;

    /// Clamp into the accepted range and return `(limit, offset)`.
    pub fn window(&self) -> (u32, u32) {
        let limit = self.limit.clamp(1, Self::MAX_LIMIT);
        let page = self.page.max(1);
        (limit, (page - 1).saturating_mul(limit))
    }
}

fn default_limit() -> u32 {
    20
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub language: Option<String>,
}

// -- Profiles --

/// Dashboard profile form. Absent fields are left untouched; empty strings
/// clear the field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarResponse {
    pub avatar_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_window_offsets() {
        let q = ListQuery { limit: 20, page: 3 };
        assert_eq!(q.window(), (20, 40));

        let q = ListQuery { limit: 0, page: 0 };
        assert_eq!(q.window(), (1, 0));

        let q = ListQuery { limit: 5000, page: 2 };
        assert_eq!(q.window(), (100, 100));
    }

    #[test]
    fn new_snippet_defaults() {
        let s: NewSnippet =
            serde_json::from_str(r#"{"title":"t","code":"c","language":"rust"}"#).unwrap();
        assert_eq!(s.visibility, Visibility::Public);
        assert!(s.tags.is_empty());
        assert!(s.description.is_none());
    }

    #[test]
    fn rejects_unknown_fields() {
        let r = serde_json::from_str::<SignInRequest>(
            r#"{"email":"a@b.io","password":"x","admin":true}"#,
        );
        assert!(r.is_err());
    }
}
