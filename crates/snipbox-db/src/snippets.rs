use crate::models::{NewSnippetRow, SnippetRow};
use crate::queries::OptionalExt;
use crate::{Database, now};
use anyhow::Result;
use rusqlite::{Connection, Row, ToSql};
use snipbox_types::api::SnippetPatch;

/// Column list shared by every snippet SELECT; keep in sync with `map_snippet`.
const SNIPPET_SELECT: &str = "SELECT s.id, s.user_id, p.username, p.avatar_url, s.title, s.description,
            s.code, s.language, s.visibility, s.tags, s.views, s.created_at, s.updated_at
     FROM snippets s
     LEFT JOIN profiles p ON p.id = s.user_id";

pub const SEARCH_LIMIT: u32 = 50;

impl Database {
    pub fn insert_snippet(&self, s: &NewSnippetRow<'_>) -> Result<()> {
        let tags = serde_json::to_string(s.tags)?;
        let search_text = search_text(s.title, s.description, s.code);
        self.with_conn_mut(|conn| {
            let now = now();
            conn.execute(
                "INSERT INTO snippets
                    (id, user_id, title, description, code, language, visibility, tags, views, search_text, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10, ?10)",
                rusqlite::params![
                    s.id,
                    s.user_id,
                    s.title,
                    s.description,
                    s.code,
                    s.language,
                    s.visibility,
                    tags,
                    search_text,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    /// Apply a patch to a snippet owned by `owner_id`. Returns `false` when
    /// no such snippet exists for that owner.
    pub fn update_snippet(&self, id: &str, owner_id: &str, patch: &SnippetPatch) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(current) = query_owned(&tx, id, owner_id)? else {
                return Ok(false);
            };

            let title = patch.title.clone().unwrap_or(current.title);
            let description = match &patch.description {
                Some(d) if d.is_empty() => None,
                Some(d) => Some(d.clone()),
                None => current.description,
            };
            let code = patch.code.clone().unwrap_or(current.code);
            let language = patch.language.clone().unwrap_or(current.language);
            let visibility = patch
                .visibility
                .map(|v| v.as_str().to_string())
                .unwrap_or(current.visibility);
            let tags = match &patch.tags {
                Some(tags) => serde_json::to_string(tags)?,
                None => current.tags,
            };
            let search_text = search_text(&title, description.as_deref(), &code);

            tx.execute(
                "UPDATE snippets
                 SET title = ?1, description = ?2, code = ?3, language = ?4, visibility = ?5,
                     tags = ?6, search_text = ?7, updated_at = ?8
                 WHERE id = ?9 AND user_id = ?10",
                rusqlite::params![title, description, code, language, visibility, tags, search_text, now(), id, owner_id],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn delete_snippet(&self, id: &str, owner_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM snippets WHERE id = ?1 AND user_id = ?2", (id, owner_id))?;
            Ok(n > 0)
        })
    }

    /// Load a snippet only if `viewer_id` may see it. The visibility rule is
    /// part of the WHERE clause, so a private row is never read for anyone
    /// but its owner.
    pub fn get_visible_snippet(&self, id: &str, viewer_id: Option<&str>) -> Result<Option<SnippetRow>> {
        self.with_conn(|conn| query_visible(conn, id, viewer_id))
    }

    pub fn get_owned_snippet(&self, id: &str, owner_id: &str) -> Result<Option<SnippetRow>> {
        self.with_conn(|conn| query_owned(conn, id, owner_id))
    }

    /// Load a visible snippet and count the view once per `viewer_key`, in
    /// one transaction. The returned row already reflects this view.
    pub fn view_visible_snippet(
        &self,
        id: &str,
        viewer_id: Option<&str>,
        viewer_key: &str,
    ) -> Result<Option<SnippetRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(mut row) = query_visible(&tx, id, viewer_id)? else {
                return Ok(None);
            };
            if record_view(&tx, id, viewer_key)? {
                row.views += 1;
            }
            tx.commit()?;
            Ok(Some(row))
        })
    }

    /// Public snippets, newest first.
    pub fn recent_public(&self, limit: u32, offset: u32) -> Result<Vec<SnippetRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{SNIPPET_SELECT}
                 WHERE s.visibility = 'public'
                 ORDER BY s.created_at DESC, s.rowid DESC
                 LIMIT ?1 OFFSET ?2"
            );
            query_snippets(conn, &sql, rusqlite::params![limit, offset])
        })
    }

    /// Most viewed public snippets.
    pub fn trending_public(&self, limit: u32) -> Result<Vec<SnippetRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{SNIPPET_SELECT}
                 WHERE s.visibility = 'public'
                 ORDER BY s.views DESC, s.created_at DESC
                 LIMIT ?1"
            );
            query_snippets(conn, &sql, rusqlite::params![limit])
        })
    }

    /// Case-insensitive substring search over title, description and code
    /// of public snippets, optionally narrowed to one language.
    pub fn search_public(&self, query: &str, language: Option<&str>) -> Result<Vec<SnippetRow>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        self.with_conn(|conn| {
            let sql = format!(
                "{SNIPPET_SELECT}
                 WHERE s.visibility = 'public'
                   AND s.search_text LIKE ?1 ESCAPE '\\'
                   AND (?2 IS NULL OR s.language = ?2)
                 ORDER BY s.created_at DESC, s.rowid DESC
                 LIMIT ?3"
            );
            query_snippets(conn, &sql, rusqlite::params![pattern, language, SEARCH_LIMIT])
        })
    }

    /// Every snippet of one user regardless of visibility, newest first.
    pub fn user_snippets(&self, user_id: &str) -> Result<Vec<SnippetRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{SNIPPET_SELECT}
                 WHERE s.user_id = ?1
                 ORDER BY s.created_at DESC, s.rowid DESC"
            );
            query_snippets(conn, &sql, rusqlite::params![user_id])
        })
    }

    pub fn count_public_snippets(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM snippets WHERE visibility = 'public'",
                [],
                |r| r.get(0),
            )?;
            Ok(n as u64)
        })
    }

    /// `(snippet count, total views)` for one user.
    pub fn user_snippet_totals(&self, user_id: &str) -> Result<(u64, u64)> {
        self.with_conn(|conn| {
            let (count, views): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(views), 0) FROM snippets WHERE user_id = ?1",
                [user_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?;
            Ok((count as u64, views as u64))
        })
    }
}

fn query_visible(conn: &Connection, id: &str, viewer_id: Option<&str>) -> Result<Option<SnippetRow>> {
    let sql = format!(
        "{SNIPPET_SELECT}
         WHERE s.id = ?1 AND (s.visibility != 'private' OR s.user_id = ?2)"
    );
    Ok(conn.query_row(&sql, rusqlite::params![id, viewer_id], map_snippet).optional()?)
}

/// Returns whether this viewer had not been counted yet.
fn record_view(conn: &Connection, snippet_id: &str, viewer_key: &str) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO snippet_views (snippet_id, viewer_key, created_at) VALUES (?1, ?2, ?3)",
        (snippet_id, viewer_key, now()),
    )?;
    if inserted > 0 {
        conn.execute("UPDATE snippets SET views = views + 1 WHERE id = ?1", [snippet_id])?;
    }
    Ok(inserted > 0)
}

fn query_owned(conn: &Connection, id: &str, owner_id: &str) -> Result<Option<SnippetRow>> {
    let sql = format!("{SNIPPET_SELECT} WHERE s.id = ?1 AND s.user_id = ?2");
    Ok(conn.query_row(&sql, (id, owner_id), map_snippet).optional()?)
}

fn query_snippets(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<SnippetRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_snippet)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_snippet(row: &Row<'_>) -> rusqlite::Result<SnippetRow> {
    Ok(SnippetRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author_username: row.get(2)?,
        author_avatar_url: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        code: row.get(6)?,
        language: row.get(7)?,
        visibility: row.get(8)?,
        tags: row.get(9)?,
        views: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Lowercased haystack for search. SQLite's LIKE only folds ASCII, so the
/// folding happens here with full Unicode rules. Fields are joined with a
/// unit separator so a match cannot span two of them.
fn search_text(title: &str, description: Option<&str>, code: &str) -> String {
    [title, description.unwrap_or_default(), code]
        .join("\u{1f}")
        .to_lowercase()
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAccount;
    use snipbox_types::models::Visibility;
    use uuid::Uuid;

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let uid = Uuid::new_v4().to_string();
        db.create_account(&NewAccount {
            id: &uid,
            email: "ann@example.com",
            password_hash: Some("hash"),
            username: Some("ann"),
        })
        .unwrap();
        (db, uid)
    }

    fn add(db: &Database, uid: &str, title: &str, code: &str, visibility: Visibility) -> String {
        let id = Uuid::new_v4().to_string();
        db.insert_snippet(&NewSnippetRow {
            id: &id,
            user_id: uid,
            title,
            description: None,
            code,
            language: "rust",
            visibility: visibility.as_str(),
            tags: &["cli".to_string()],
        })
        .unwrap();
        id
    }

    #[test]
    fn private_rows_only_load_for_owner() {
        let (db, uid) = setup();
        let id = add(&db, &uid, "secret", "let x = 1;", Visibility::Private);

        assert!(db.get_visible_snippet(&id, None).unwrap().is_none());
        assert!(db.get_visible_snippet(&id, Some("intruder")).unwrap().is_none());
        let row = db.get_visible_snippet(&id, Some(&uid)).unwrap().unwrap();
        assert_eq!(row.author_username.as_deref(), Some("ann"));
        assert_eq!(row.tags, r#"["cli"]"#);
    }

    #[test]
    fn unlisted_loads_by_id_but_is_not_listed() {
        let (db, uid) = setup();
        let id = add(&db, &uid, "hidden", "x", Visibility::Unlisted);
        add(&db, &uid, "shown", "y", Visibility::Public);

        assert!(db.get_visible_snippet(&id, None).unwrap().is_some());
        let listed: Vec<_> = db.recent_public(10, 0).unwrap().into_iter().map(|r| r.title).collect();
        assert_eq!(listed, vec!["shown"]);
        assert_eq!(db.count_public_snippets().unwrap(), 1);
        assert_eq!(db.user_snippets(&uid).unwrap().len(), 2);
    }

    #[test]
    fn views_count_once_per_viewer() {
        let (db, uid) = setup();
        let id = add(&db, &uid, "t", "c", Visibility::Public);

        let view = |key: &str| db.view_visible_snippet(&id, None, key).unwrap().unwrap().views;
        assert_eq!(view("viewer-a"), 1);
        assert_eq!(view("viewer-a"), 1);
        assert_eq!(view("viewer-b"), 2);

        let row = db.get_visible_snippet(&id, None).unwrap().unwrap();
        assert_eq!(row.views, 2);
        assert_eq!(db.user_snippet_totals(&uid).unwrap(), (1, 2));
    }

    #[test]
    fn gated_or_deleted_snippet_records_no_view() {
        let (db, uid) = setup();
        let private = add(&db, &uid, "p", "c", Visibility::Private);
        assert!(db.view_visible_snippet(&private, None, "anon").unwrap().is_none());
        assert_eq!(db.get_owned_snippet(&private, &uid).unwrap().unwrap().views, 0);

        let gone = add(&db, &uid, "g", "c", Visibility::Public);
        db.delete_snippet(&gone, &uid).unwrap();
        assert!(db.view_visible_snippet(&gone, None, "anon").unwrap().is_none());
        let recorded: i64 = db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM snippet_views", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(recorded, 0);
    }

    #[test]
    fn recent_listing_pages_newest_first() {
        let (db, uid) = setup();
        for i in 0..5 {
            add(&db, &uid, &format!("s{i}"), "c", Visibility::Public);
        }
        let page1: Vec<_> = db.recent_public(2, 0).unwrap().into_iter().map(|r| r.title).collect();
        let page3: Vec<_> = db.recent_public(2, 4).unwrap().into_iter().map(|r| r.title).collect();
        assert_eq!(page1, vec!["s4", "s3"]);
        assert_eq!(page3, vec!["s0"]);
    }

    #[test]
    fn search_is_case_insensitive_and_escapes_wildcards() {
        let (db, uid) = setup();
        add(&db, &uid, "Привет мир", "print('hi')", Visibility::Public);
        add(&db, &uid, "Percent", "100% done", Visibility::Public);
        add(&db, &uid, "Hidden Match", "print", Visibility::Private);

        let hits = db.search_public("ПРИВЕТ", None).unwrap();
        assert_eq!(hits.len(), 1);

        let hits = db.search_public("PRINT", None).unwrap();
        assert_eq!(hits.len(), 1, "private snippets are never searched");

        assert_eq!(db.search_public("0%", None).unwrap().len(), 1);
        assert_eq!(db.search_public("%", None).unwrap().len(), 1);
        assert!(db.search_public("print", Some("python")).unwrap().is_empty());
    }

    #[test]
    fn update_and_delete_are_owner_scoped() {
        let (db, uid) = setup();
        let id = add(&db, &uid, "t", "c", Visibility::Public);

        let patch = SnippetPatch {
            title: Some("renamed".into()),
            visibility: Some(Visibility::Private),
            ..Default::default()
        };
        assert!(!db.update_snippet(&id, "intruder", &patch).unwrap());
        assert!(db.update_snippet(&id, &uid, &patch).unwrap());

        let row = db.get_owned_snippet(&id, &uid).unwrap().unwrap();
        assert_eq!(row.title, "renamed");
        assert_eq!(row.visibility, "private");
        assert_eq!(row.code, "c");

        assert!(!db.delete_snippet(&id, "intruder").unwrap());
        assert!(db.delete_snippet(&id, &uid).unwrap());
        assert!(db.get_visible_snippet(&id, Some(&uid)).unwrap().is_none());
    }

    #[test]
    fn trending_orders_by_views() {
        let (db, uid) = setup();
        let a = add(&db, &uid, "a", "c", Visibility::Public);
        let b = add(&db, &uid, "b", "c", Visibility::Public);
        db.view_visible_snippet(&b, None, "v1").unwrap();
        db.view_visible_snippet(&b, None, "v2").unwrap();
        db.view_visible_snippet(&a, None, "v1").unwrap();

        let titles: Vec<_> = db.trending_public(5).unwrap().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["b", "a"]);
    }
}
