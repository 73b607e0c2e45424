use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (accounts, profiles, snippets)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password    TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE profiles (
                id          TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                username    TEXT UNIQUE COLLATE NOCASE,
                bio         TEXT,
                website     TEXT,
                avatar_url  TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE identities (
                provider    TEXT NOT NULL,
                subject     TEXT NOT NULL,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (provider, subject)
            );

            CREATE TABLE sessions (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                expires_at  TEXT NOT NULL
            );

            CREATE INDEX idx_sessions_user ON sessions(user_id);

            CREATE TABLE password_resets (
                token_hash  TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at  TEXT NOT NULL
            );

            CREATE TABLE snippets (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                description TEXT,
                code        TEXT NOT NULL,
                language    TEXT NOT NULL,
                visibility  TEXT NOT NULL DEFAULT 'public'
                            CHECK (visibility IN ('public', 'unlisted', 'private')),
                tags        TEXT NOT NULL DEFAULT '[]',
                views       INTEGER NOT NULL DEFAULT 0,
                search_text TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_snippets_public
                ON snippets(visibility, created_at);
            CREATE INDEX idx_snippets_user
                ON snippets(user_id, created_at);

            -- One row per (snippet, viewer) so a viewer is counted once.
            CREATE TABLE snippet_views (
                snippet_id  TEXT NOT NULL REFERENCES snippets(id) ON DELETE CASCADE,
                viewer_key  TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (snippet_id, viewer_key)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
