/// Database row types: these map directly to SQLite rows.
/// Distinct from snipbox-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub email: String,
    /// Argon2 hash; `None` for accounts created through OAuth.
    pub password: Option<String>,
    pub created_at: String,
}

pub struct ProfileRow {
    pub id: String,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

pub struct SnippetRow {
    pub id: String,
    pub user_id: String,
    pub author_username: Option<String>,
    pub author_avatar_url: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub code: String,
    pub language: String,
    pub visibility: String,
    /// JSON array of strings.
    pub tags: String,
    pub views: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Account creation input. The profile row is created alongside.
pub struct NewAccount<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub username: Option<&'a str>,
}

pub struct NewSnippetRow<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub code: &'a str,
    pub language: &'a str,
    pub visibility: &'a str,
    pub tags: &'a [String],
}

/// Profile update. The outer `Option` says whether to touch the column,
/// the inner whether to store a value or NULL.
#[derive(Default)]
pub struct ProfileChanges {
    pub username: Option<Option<String>>,
    pub bio: Option<Option<String>>,
    pub website: Option<Option<String>>,
}
