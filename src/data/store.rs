//! SQLite-backed key-value store
//!
//! Persists per-user fetch state and the append-only bookmark cache.
//! Payloads are stored as JSON blobs keyed by user id, with a rolling
//! TTL refreshed on every write; expired rows are invisible to reads.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};

use super::models::{BookmarkRecord, UserFetchState};
use crate::error::AppError;

/// Connection pool wrapper for all persistence operations.
pub struct Store {
    pool: Pool<Sqlite>,
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Store {
    /// Open (or create) the database file and run migrations.
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Database(e.into()))?;

        Ok(Self { pool })
    }

    /// In-memory database for unit tests.
    ///
    /// A single connection is required: every pooled connection to
    /// `:memory:` would otherwise see its own empty database.
    pub async fn connect_in_memory() -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Database(e.into()))?;

        Ok(Self { pool })
    }

    // =========================================================================
    // User state
    // =========================================================================

    /// Load a user's fetch state, if present and not expired.
    pub async fn get_user_state(
        &self,
        user_id: &str,
    ) -> Result<Option<UserFetchState>, AppError> {
        let row = sqlx::query(
            "SELECT payload FROM user_state WHERE user_id = ? AND expires_at > ?",
        )
        .bind(user_id)
        .bind(now_epoch())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let payload: String = row.get("payload");
                let state = serde_json::from_str(&payload)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt user state: {e}")))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Insert or replace a user's fetch state, refreshing its TTL.
    pub async fn put_user_state(
        &self,
        user_id: &str,
        state: &UserFetchState,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let payload = serde_json::to_string(state)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize user state: {e}")))?;
        let now = now_epoch();

        sqlx::query(
            "INSERT INTO user_state (user_id, payload, expires_at, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
                 payload = excluded.payload, \
                 expires_at = excluded.expires_at, \
                 updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(&payload)
        .bind(now + ttl.as_secs() as i64)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a user's fetch state (sign-out).
    pub async fn delete_user_state(&self, user_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM user_state WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Bookmark cache
    // =========================================================================

    /// All cached bookmarks for a user, in original fetch order.
    pub async fn cached_bookmarks(
        &self,
        user_id: &str,
    ) -> Result<Vec<BookmarkRecord>, AppError> {
        let rows = sqlx::query(
            "SELECT payload FROM bookmark_cache \
             WHERE user_id = ? AND expires_at > ? ORDER BY seq ASC",
        )
        .bind(user_id)
        .bind(now_epoch())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row.get("payload");
            let record = serde_json::from_str(&payload)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt cached bookmark: {e}")))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Append newly fetched bookmarks, de-duplicating by item id.
    ///
    /// The TTL of the whole cached set is refreshed on every append.
    /// Returns the number of records actually inserted.
    pub async fn append_bookmarks(
        &self,
        user_id: &str,
        records: &[BookmarkRecord],
        ttl: Duration,
    ) -> Result<usize, AppError> {
        let now = now_epoch();
        let expires_at = now + ttl.as_secs() as i64;

        let mut tx = self.pool.begin().await?;

        let next_seq: i64 =
            sqlx::query("SELECT COALESCE(MAX(seq) + 1, 0) AS next FROM bookmark_cache WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?
                .get("next");

        let mut seq = next_seq;
        let mut inserted = 0usize;
        for record in records {
            let payload = serde_json::to_string(record)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize bookmark: {e}")))?;
            let result = sqlx::query(
                "INSERT OR IGNORE INTO bookmark_cache \
                 (user_id, seq, bookmark_id, payload, expires_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(seq)
            .bind(&record.id)
            .bind(&payload)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
                seq += 1;
            }
        }

        sqlx::query("UPDATE bookmark_cache SET expires_at = ? WHERE user_id = ?")
            .bind(expires_at)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    /// Drop the whole cached set for a user (sign-out).
    pub async fn delete_cached_bookmarks(&self, user_id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM bookmark_cache WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::models::EngagementMetrics;

    fn record(id: &str) -> BookmarkRecord {
        BookmarkRecord {
            id: id.to_string(),
            text: format!("post {id}"),
            created_at: "2024-01-01T00:00:00.000Z".into(),
            author_id: "42".into(),
            lang: None,
            metrics: EngagementMetrics::default(),
            entities: None,
            media: None,
            referenced: None,
            note_text: None,
            author: None,
            quoted: None,
        }
    }

    fn state() -> UserFetchState {
        UserFetchState::new(
            "access".into(),
            "refresh".into(),
            1_700_000_000_000,
            "alice".into(),
            "Alice".into(),
            None,
        )
    }

    const TTL: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn user_state_round_trips() {
        let store = Store::connect_in_memory().await.unwrap();

        assert!(store.get_user_state("u1").await.unwrap().is_none());

        let mut s = state();
        s.total_fetched = 25;
        s.pagination_cursor = Some("tok".into());
        store.put_user_state("u1", &s, TTL).await.unwrap();

        let loaded = store.get_user_state("u1").await.unwrap().unwrap();
        assert_eq!(loaded, s);

        store.delete_user_state("u1").await.unwrap();
        assert!(store.get_user_state("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_state_is_invisible() {
        let store = Store::connect_in_memory().await.unwrap();
        store
            .put_user_state("u1", &state(), Duration::from_secs(0))
            .await
            .unwrap();

        assert!(store.get_user_state("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_preserves_order_and_dedupes() {
        let store = Store::connect_in_memory().await.unwrap();

        let first = store
            .append_bookmarks("u1", &[record("a"), record("b")], TTL)
            .await
            .unwrap();
        assert_eq!(first, 2);

        // "b" already cached; only "c" lands
        let second = store
            .append_bookmarks("u1", &[record("b"), record("c")], TTL)
            .await
            .unwrap();
        assert_eq!(second, 1);

        let cached = store.cached_bookmarks("u1").await.unwrap();
        let ids: Vec<&str> = cached.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn caches_are_isolated_per_user() {
        let store = Store::connect_in_memory().await.unwrap();
        store
            .append_bookmarks("u1", &[record("a")], TTL)
            .await
            .unwrap();
        store
            .append_bookmarks("u2", &[record("z")], TTL)
            .await
            .unwrap();

        assert_eq!(store.cached_bookmarks("u1").await.unwrap().len(), 1);
        assert_eq!(store.cached_bookmarks("u2").await.unwrap()[0].id, "z");

        store.delete_cached_bookmarks("u1").await.unwrap();
        assert!(store.cached_bookmarks("u1").await.unwrap().is_empty());
        assert_eq!(store.cached_bookmarks("u2").await.unwrap().len(), 1);
    }
}
