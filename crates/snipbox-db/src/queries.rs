use crate::models::{NewAccount, ProfileChanges, ProfileRow, UserRow};
use crate::{Database, now, timestamp};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "id, email, password, created_at";
const PROFILE_COLUMNS: &str = "id, username, bio, website, avatar_url, created_at";

impl Database {
    // -- Accounts --

    /// Insert the auth record and its profile in one transaction, so a
    /// failed profile insert never leaves an orphaned account behind.
    pub fn create_account(&self, account: &NewAccount<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_account(&tx, account)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Same as [`Database::create_account`] plus the provider identity link.
    pub fn create_oauth_account(
        &self,
        account: &NewAccount<'_>,
        provider: &str,
        subject: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_account(&tx, account)?;
            tx.execute(
                "INSERT INTO identities (provider, subject, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                (provider, subject, account.id, now()),
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            Ok(conn.query_row(&sql, [email], map_user).optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], map_user).optional()?)
        })
    }

    pub fn set_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE users SET password = ?1 WHERE id = ?2", (password_hash, user_id))?;
            Ok(())
        })
    }

    /// Delete an account. Profile, snippets, sessions, identities and view
    /// records follow through `ON DELETE CASCADE`.
    pub fn delete_account(&self, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
            Ok(n > 0)
        })
    }

    pub fn count_users(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            Ok(n as u64)
        })
    }

    // -- Identities --

    /// Returns the local user id linked to a provider account.
    pub fn find_identity(&self, provider: &str, subject: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT user_id FROM identities WHERE provider = ?1 AND subject = ?2",
                    (provider, subject),
                    |r| r.get(0),
                )
                .optional()?)
        })
    }

    pub fn link_identity(&self, provider: &str, subject: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO identities (provider, subject, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                (provider, subject, user_id, now()),
            )?;
            Ok(())
        })
    }

    // -- Sessions --

    pub fn create_session(&self, id: &str, user_id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                (id, user_id, now(), timestamp(expires_at)),
            )?;
            Ok(())
        })
    }

    pub fn session_is_active(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM sessions WHERE id = ?1 AND user_id = ?2 AND expires_at > ?3",
                    (id, user_id, now()),
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn delete_user_sessions(&self, user_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?))
    }

    /// Drop expired sessions and reset tokens. Returns the number of rows removed.
    pub fn purge_expired(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let now = now();
            let sessions = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [&now])?;
            let resets = conn.execute("DELETE FROM password_resets WHERE expires_at <= ?1", [&now])?;
            Ok(sessions + resets)
        })
    }

    // -- Password resets --

    pub fn create_password_reset(
        &self,
        token_hash: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO password_resets (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
                (token_hash, user_id, timestamp(expires_at)),
            )?;
            Ok(())
        })
    }

    /// Single use: the token row is removed whether or not it is still valid.
    /// Returns the user id if the token existed and had not expired.
    pub fn consume_password_reset(&self, token_hash: &str) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let row: Option<(String, String)> = tx
                .query_row(
                    "SELECT user_id, expires_at FROM password_resets WHERE token_hash = ?1",
                    [token_hash],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()?;
            tx.execute("DELETE FROM password_resets WHERE token_hash = ?1", [token_hash])?;
            tx.commit()?;

            Ok(row.and_then(|(user_id, expires_at)| (expires_at > now()).then_some(user_id)))
        })
    }

    // -- Profiles --

    pub fn get_profile(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, id))
    }

    /// Apply `changes` and return the updated profile, or `None` if the
    /// profile does not exist. A taken username surfaces as a UNIQUE
    /// violation (see [`crate::unique_violation`]).
    pub fn update_profile(&self, id: &str, changes: &ProfileChanges) -> Result<Option<ProfileRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(current) = query_profile(&tx, id)? else {
                return Ok(None);
            };

            let username = changes.username.clone().unwrap_or(current.username);
            let bio = changes.bio.clone().unwrap_or(current.bio);
            let website = changes.website.clone().unwrap_or(current.website);

            tx.execute(
                "UPDATE profiles SET username = ?1, bio = ?2, website = ?3, updated_at = ?4 WHERE id = ?5",
                rusqlite::params![username, bio, website, now(), id],
            )?;
            let updated = query_profile(&tx, id)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    pub fn set_avatar_url(&self, id: &str, url: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE profiles SET avatar_url = ?1, updated_at = ?2 WHERE id = ?3",
                (url, now(), id),
            )?;
            Ok(())
        })
    }

    /// First of `base`, `base-2`, `base-3`, ... not yet used as a username.
    pub fn available_username(&self, base: &str) -> Result<String> {
        self.with_conn(|conn| {
            let mut candidate = base.to_string();
            let mut n = 1;
            loop {
                let taken = conn
                    .query_row("SELECT 1 FROM profiles WHERE username = ?1", [&candidate], |_| Ok(()))
                    .optional()?
                    .is_some();
                if !taken {
                    return Ok(candidate);
                }
                n += 1;
                candidate = format!("{base}-{n}");
            }
        })
    }
}

fn insert_account(conn: &Connection, account: &NewAccount<'_>) -> Result<()> {
    let now = now();
    conn.execute(
        "INSERT INTO users (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![account.id, account.email, account.password_hash, now],
    )?;
    conn.execute(
        "INSERT INTO profiles (id, username, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        rusqlite::params![account.id, account.username, now],
    )?;
    Ok(())
}

fn query_profile(conn: &Connection, id: &str) -> Result<Option<ProfileRow>> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1");
    let row = conn
        .query_row(&sql, [id], |row| {
            Ok(ProfileRow {
                id: row.get(0)?,
                username: row.get(1)?,
                bio: row.get(2)?,
                website: row.get(3)?,
                avatar_url: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn account(db: &Database, email: &str, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_account(&NewAccount {
            id: &id,
            email,
            password_hash: Some("hash"),
            username: Some(username),
        })
        .unwrap();
        id
    }

    #[test]
    fn account_creates_profile() {
        let db = Database::open_in_memory().unwrap();
        let id = account(&db, "ann@example.com", "ann");

        let user = db.get_user_by_email("ANN@example.com").unwrap().unwrap();
        assert_eq!(user.id, id);
        let profile = db.get_profile(&id).unwrap().unwrap();
        assert_eq!(profile.username.as_deref(), Some("ann"));
        assert_eq!(db.count_users().unwrap(), 1);
    }

    #[test]
    fn duplicate_username_is_unique_violation_and_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        account(&db, "ann@example.com", "ann");

        let id = Uuid::new_v4().to_string();
        let err = db
            .create_account(&NewAccount {
                id: &id,
                email: "other@example.com",
                password_hash: Some("hash"),
                username: Some("ANN"),
            })
            .unwrap_err();
        assert_eq!(crate::unique_violation(&err).as_deref(), Some("profiles.username"));
        // the users row from the failed transaction must not survive
        assert!(db.get_user_by_email("other@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_names_users_table() {
        let db = Database::open_in_memory().unwrap();
        account(&db, "ann@example.com", "ann");
        let id = Uuid::new_v4().to_string();
        let err = db
            .create_account(&NewAccount {
                id: &id,
                email: "ann@example.com",
                password_hash: None,
                username: Some("bob"),
            })
            .unwrap_err();
        assert_eq!(crate::unique_violation(&err).as_deref(), Some("users.email"));
    }

    #[test]
    fn sessions_expire_and_revoke() {
        let db = Database::open_in_memory().unwrap();
        let uid = account(&db, "ann@example.com", "ann");

        db.create_session("s1", &uid, Utc::now() + Duration::days(1)).unwrap();
        db.create_session("s2", &uid, Utc::now() - Duration::seconds(1)).unwrap();
        assert!(db.session_is_active("s1", &uid).unwrap());
        assert!(!db.session_is_active("s2", &uid).unwrap());
        assert!(!db.session_is_active("s1", "someone-else").unwrap());

        assert_eq!(db.purge_expired().unwrap(), 1);
        db.delete_session("s1").unwrap();
        assert!(!db.session_is_active("s1", &uid).unwrap());
    }

    #[test]
    fn reset_tokens_are_single_use() {
        let db = Database::open_in_memory().unwrap();
        let uid = account(&db, "ann@example.com", "ann");

        db.create_password_reset("h1", &uid, Utc::now() + Duration::hours(1)).unwrap();
        db.create_password_reset("h2", &uid, Utc::now() - Duration::hours(1)).unwrap();

        assert_eq!(db.consume_password_reset("h1").unwrap().as_deref(), Some(uid.as_str()));
        assert_eq!(db.consume_password_reset("h1").unwrap(), None);
        assert_eq!(db.consume_password_reset("h2").unwrap(), None);
    }

    #[test]
    fn profile_update_merges_fields() {
        let db = Database::open_in_memory().unwrap();
        let uid = account(&db, "ann@example.com", "ann");

        let changes = ProfileChanges {
            bio: Some(Some("hello".into())),
            website: Some(None),
            ..Default::default()
        };
        let p = db.update_profile(&uid, &changes).unwrap().unwrap();
        assert_eq!(p.username.as_deref(), Some("ann"));
        assert_eq!(p.bio.as_deref(), Some("hello"));
        assert_eq!(p.website, None);

        assert!(db.update_profile("missing", &changes).unwrap().is_none());
    }

    #[test]
    fn available_username_suffixes() {
        let db = Database::open_in_memory().unwrap();
        account(&db, "a@example.com", "octo");
        account(&db, "b@example.com", "octo-2");
        assert_eq!(db.available_username("octo").unwrap(), "octo-3");
        assert_eq!(db.available_username("fresh").unwrap(), "fresh");
    }

    #[test]
    fn delete_account_cascades() {
        let db = Database::open_in_memory().unwrap();
        let uid = account(&db, "ann@example.com", "ann");
        db.create_session("s1", &uid, Utc::now() + Duration::days(1)).unwrap();

        assert!(db.delete_account(&uid).unwrap());
        assert!(db.get_profile(&uid).unwrap().is_none());
        assert!(!db.session_is_active("s1", &uid).unwrap());
        assert!(!db.delete_account(&uid).unwrap());
    }
}
