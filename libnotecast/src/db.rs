//! Database operations for Notecast

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::{NotecastError, Result};
use crate::types::{
    NewNote, Note, NoteStatus, NostrCredentials, User, XCredentials, MAX_NOTE_LENGTH,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(crate::error::DbError::IoError)?;
        }

        // Use forward slashes for SQLite URL (works on both Windows and Unix)
        // Use mode=rwc to allow creating the database file if it doesn't exist
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(crate::error::DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Create a new user, returning its id
    pub async fn create_user(&self, username: &str) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, created_at) VALUES (?, ?)
            "#,
        )
        .bind(username)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.last_insert_rowid())
    }

    /// Get a user by id
    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, created_at FROM users WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(|r| User {
            id: r.get("id"),
            username: r.get("username"),
            created_at: r.get("created_at"),
        }))
    }

    /// Insert or replace a user's X API credentials
    pub async fn upsert_x_credentials(&self, user_id: i64, access_token: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO x_credentials (user_id, access_token, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET access_token = excluded.access_token,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(access_token)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Insert or replace a user's Nostr credentials
    pub async fn upsert_nostr_credentials(
        &self,
        user_id: i64,
        private_key: &str,
        public_key: &str,
        relay_urls: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO nostr_credentials (user_id, private_key, public_key, relay_urls, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET private_key = excluded.private_key,
                public_key = excluded.public_key,
                relay_urls = excluded.relay_urls,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(private_key)
        .bind(public_key)
        .bind(relay_urls)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Get a user's X API credentials
    pub async fn get_x_credentials(&self, user_id: i64) -> Result<Option<XCredentials>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, access_token FROM x_credentials WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(|r| XCredentials {
            user_id: r.get("user_id"),
            access_token: r.get("access_token"),
        }))
    }

    /// Get a user's Nostr credentials
    pub async fn get_nostr_credentials(&self, user_id: i64) -> Result<Option<NostrCredentials>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, private_key, public_key, relay_urls
            FROM nostr_credentials WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(|r| NostrCredentials {
            user_id: r.get("user_id"),
            private_key: r.get("private_key"),
            public_key: r.get("public_key"),
            relay_urls: r.get("relay_urls"),
        }))
    }

    /// Create a new note
    ///
    /// Content is validated here: empty or over-length content is rejected.
    pub async fn create_note(&self, new_note: &NewNote) -> Result<Note> {
        if new_note.content.trim().is_empty() {
            return Err(NotecastError::InvalidInput(
                "Note content cannot be empty".to_string(),
            ));
        }
        if new_note.content.chars().count() > MAX_NOTE_LENGTH {
            return Err(NotecastError::InvalidInput(format!(
                "Note content exceeds {} characters",
                MAX_NOTE_LENGTH
            )));
        }

        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO notes (user_id, content, status, scheduled_time, created_at,
                               publish_to_x, publish_to_nostr)
            VALUES (?, ?, 'pending', ?, ?, ?, ?)
            "#,
        )
        .bind(new_note.user_id)
        .bind(&new_note.content)
        .bind(new_note.scheduled_time)
        .bind(now)
        .bind(new_note.publish_to_x as i64)
        .bind(new_note.publish_to_nostr as i64)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        let id = result.last_insert_rowid();
        let note = self.get_note(id).await?.ok_or_else(|| {
            NotecastError::Database(crate::error::DbError::SqlxError(sqlx::Error::RowNotFound))
        })?;

        Ok(note)
    }

    /// Get a note by id
    pub async fn get_note(&self, note_id: i64) -> Result<Option<Note>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, content, status, scheduled_time, created_at, published_at,
                   tweet_id, nostr_id, publish_to_x, publish_to_nostr, last_error
            FROM notes WHERE id = ?
            "#,
        )
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(row.map(note_from_row))
    }

    /// Select all notes due for publishing
    ///
    /// A note is due when its status is still publishable (pending or partially
    /// published) and its scheduled time has arrived. Unscheduled notes are never due.
    pub async fn select_due_notes(&self, now: i64) -> Result<Vec<Note>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, content, status, scheduled_time, created_at, published_at,
                   tweet_id, nostr_id, publish_to_x, publish_to_nostr, last_error
            FROM notes
            WHERE status IN ('pending', 'published_x', 'published_n')
              AND scheduled_time IS NOT NULL
              AND scheduled_time <= ?
            ORDER BY scheduled_time, id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(rows.into_iter().map(note_from_row).collect())
    }

    /// Record the tweet id for a note, but only if none is recorded yet
    ///
    /// Returns true if this call performed the write. The conditional guard makes
    /// the write idempotent under concurrent dispatcher runs.
    pub async fn set_tweet_id_if_empty(&self, note_id: i64, tweet_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notes SET tweet_id = ? WHERE id = ? AND tweet_id = ''
            "#,
        )
        .bind(tweet_id)
        .bind(note_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Record the Nostr event id for a note, but only if none is recorded yet
    pub async fn set_nostr_id_if_empty(&self, note_id: i64, nostr_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notes SET nostr_id = ? WHERE id = ? AND nostr_id = ''
            "#,
        )
        .bind(nostr_id)
        .bind(note_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Record the most recent publish failure without touching the note status
    pub async fn set_last_error(&self, note_id: i64, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notes SET last_error = ? WHERE id = ?
            "#,
        )
        .bind(message)
        .bind(note_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Move a note to error status with a message
    pub async fn mark_error(&self, note_id: i64, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notes SET status = 'error', last_error = ? WHERE id = ?
            "#,
        )
        .bind(message)
        .bind(note_id)
        .execute(&self.pool)
        .await
        .map_err(crate::error::DbError::SqlxError)?;

        Ok(())
    }

    /// Apply the final status of a publish pass
    ///
    /// Writes published_at only when the pass completed every requested platform.
    pub async fn apply_status(
        &self,
        note_id: i64,
        status: NoteStatus,
        last_error: &str,
        published_at: Option<i64>,
    ) -> Result<()> {
        match published_at {
            Some(ts) => {
                sqlx::query(
                    r#"
                    UPDATE notes SET status = ?, last_error = ?, published_at = ? WHERE id = ?
                    "#,
                )
                .bind(status.as_str())
                .bind(last_error)
                .bind(ts)
                .bind(note_id)
                .execute(&self.pool)
                .await
                .map_err(crate::error::DbError::SqlxError)?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE notes SET status = ?, last_error = ? WHERE id = ?
                    "#,
                )
                .bind(status.as_str())
                .bind(last_error)
                .bind(note_id)
                .execute(&self.pool)
                .await
                .map_err(crate::error::DbError::SqlxError)?;
            }
        }

        Ok(())
    }
}

fn note_from_row(r: sqlx::sqlite::SqliteRow) -> Note {
    Note {
        id: r.get("id"),
        user_id: r.get("user_id"),
        content: r.get("content"),
        status: NoteStatus::from_str(&r.get::<String, _>("status")),
        scheduled_time: r.get("scheduled_time"),
        created_at: r.get("created_at"),
        published_at: r.get("published_at"),
        tweet_id: r.get("tweet_id"),
        nostr_id: r.get("nostr_id"),
        publish_to_x: r.get::<i64, _>("publish_to_x") != 0,
        publish_to_nostr: r.get::<i64, _>("publish_to_nostr") != 0,
        last_error: r.get("last_error"),
    }
}
