use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Access policy of a snippet.
///
/// `Public` snippets are listed and searchable, `Unlisted` ones are only
/// reachable by direct link, `Private` ones only by their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
        }
    }

    /// Human-facing label used by rendered pages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Unlisted => "Unlisted",
            Self::Private => "Private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown visibility '{0}'")]
pub struct UnknownVisibility(pub String);

impl FromStr for Visibility {
    type Err = UnknownVisibility;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "unlisted" => Ok(Self::Unlisted),
            "private" => Ok(Self::Private),
            other => Err(UnknownVisibility(other.to_string())),
        }
    }
}

/// Public profile of a user, editable from the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The author fields joined onto a snippet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Author {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub author: Author,
    pub title: String,
    pub description: Option<String>,
    pub code: String,
    pub language: String,
    pub visibility: Visibility,
    pub tags: Vec<String>,
    pub views: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The signed-in account as returned by session lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteStats {
    pub snippets: u64,
    pub users: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_snippets: u64,
    pub total_views: u64,
    pub account_age_days: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_wire_format() {
        assert_eq!(serde_json::to_string(&Visibility::Unlisted).unwrap(), "\"unlisted\"");
        let v: Visibility = serde_json::from_str("\"private\"").unwrap();
        assert_eq!(v, Visibility::Private);
        assert!(serde_json::from_str::<Visibility>("\"secret\"").is_err());
    }

    #[test]
    fn visibility_from_str() {
        assert_eq!("public".parse::<Visibility>(), Ok(Visibility::Public));
        let err = "Public".parse::<Visibility>().unwrap_err();
        assert_eq!(err, UnknownVisibility("Public".into()));
        assert_eq!(err.to_string(), "unknown visibility 'Public'");
        let _: &dyn std::error::Error = &err;
        assert_eq!(Visibility::default(), Visibility::Public);
    }
}
