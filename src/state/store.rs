//! State store (C4): durable per-pair prior state in a local SQLite file.
//!
//! Grounded on `db.rs`'s `Database` pool wrapper and `db/sources.rs`'s
//! query style, backed by `sqlx::SqlitePool` instead of Postgres since this
//! engine keeps its whole working set in one local file. Per-action
//! selection is realized as fetch-the-joined-rows-once-and-classify-in-memory
//! rather than one SQL predicate per action, so the classifier stays a
//! pure, independently testable function.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::state::migrations;

/// One row of the `entries` table: the engine's full knowledge of a single
/// path within a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub pair_id: i64,
    pub path: String,
    pub remote_mtime: Option<i64>,
    pub remote_mtime_prev: Option<i64>,
    pub exists_remote: bool,
    pub local_mtime: Option<i64>,
    pub local_mtime_prev: Option<i64>,
    pub exists_local: bool,
    pub synced: bool,
    pub captured_at: i64,
}

#[derive(Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    /// Opens (creating if absent) the SQLite file at `path` and applies
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self> {
        let url = format!("sqlite://{}?mode=rwc", path);
        let pool = SqlitePoolOptions::new().max_connections(5).connect(&url).await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store, for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Clears both `exists_*` flags for every entry of the pair at the
    /// start of a pass, recording the pass's `captured_at`. Leaves the
    /// mtime columns untouched: a file absent from both snapshots this
    /// pass still carries last pass's mtime until the entry is dropped.
    pub async fn begin_pass(&self, pair_id: i64, captured_at: i64) -> Result<()> {
        sqlx::query(
            "UPDATE entries SET exists_remote = 0, exists_local = 0, captured_at = ? WHERE pair_id = ?",
        )
        .bind(captured_at)
        .bind(pair_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upserts the remote side of `(pair_id, path)`; never touches local
    /// fields.
    pub async fn observe_remote(
        &self,
        pair_id: i64,
        path: &str,
        mtime: i64,
        captured_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entries (pair_id, path, remote_mtime, exists_remote, captured_at)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(pair_id, path) DO UPDATE SET
                remote_mtime = excluded.remote_mtime,
                exists_remote = 1,
                captured_at = excluded.captured_at
            "#,
        )
        .bind(pair_id)
        .bind(path)
        .bind(mtime)
        .bind(captured_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upserts the local side of `(pair_id, path)`; never touches remote
    /// fields.
    pub async fn observe_local(
        &self,
        pair_id: i64,
        path: &str,
        mtime: i64,
        captured_at: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entries (pair_id, path, local_mtime, exists_local, captured_at)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(pair_id, path) DO UPDATE SET
                local_mtime = excluded.local_mtime,
                exists_local = 1,
                captured_at = excluded.captured_at
            "#,
        )
        .bind(pair_id)
        .bind(path)
        .bind(mtime)
        .bind(captured_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Registers a freshly materialized local observation for a renamed
    /// conflict copy: the new path is inserted as a local entry the same
    /// way `observe_local` would upsert it, but starting from a clean
    /// (unsynced) row rather than merging into an existing one.
    pub async fn register_conflict_copy(
        &self,
        pair_id: i64,
        new_path: &str,
        mtime: i64,
        captured_at: i64,
    ) -> Result<()> {
        self.observe_local(pair_id, new_path, mtime, captured_at).await
    }

    /// All entries for a pair, used by the classifier to derive the action
    /// list once per phase.
    pub async fn list_entries(&self, pair_id: i64) -> Result<Vec<Entry>> {
        let rows = sqlx::query(
            "SELECT pair_id, path, remote_mtime, remote_mtime_prev, exists_remote, \
             local_mtime, local_mtime_prev, exists_local, synced, captured_at \
             FROM entries WHERE pair_id = ?",
        )
        .bind(pair_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_entry).collect())
    }

    pub async fn get_entry(&self, pair_id: i64, path: &str) -> Result<Option<Entry>> {
        let row = sqlx::query(
            "SELECT pair_id, path, remote_mtime, remote_mtime_prev, exists_remote, \
             local_mtime, local_mtime_prev, exists_local, synced, captured_at \
             FROM entries WHERE pair_id = ? AND path = ?",
        )
        .bind(pair_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_entry))
    }

    pub async fn mark_downloaded(&self, pair_id: i64, path: &str, mtime: i64) -> Result<()> {
        sqlx::query(
            "UPDATE entries SET exists_local = 1, local_mtime = ?, synced = 1 \
             WHERE pair_id = ? AND path = ?",
        )
        .bind(mtime)
        .bind(pair_id)
        .bind(path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_uploaded(&self, pair_id: i64, path: &str, mtime: i64) -> Result<()> {
        sqlx::query(
            "UPDATE entries SET exists_remote = 1, remote_mtime = ?, synced = 1 \
             WHERE pair_id = ? AND path = ?",
        )
        .bind(mtime)
        .bind(pair_id)
        .bind(path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drops the row after a successful delete-remote / delete-local
    /// action.
    pub async fn drop_entry(&self, pair_id: i64, path: &str) -> Result<()> {
        sqlx::query("DELETE FROM entries WHERE pair_id = ? AND path = ?")
            .bind(pair_id)
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rotates current state into prior state, in one transaction:
    /// (a) marks `synced` where both sides exist and mtimes now match and
    ///     it wasn't already synced;
    /// (b) rotates `*_mtime_prev = *_mtime` for every row of the pair.
    pub async fn finish_pass(&self, pair_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE entries SET synced = 1 \
             WHERE pair_id = ? AND exists_remote = 1 AND exists_local = 1 \
             AND local_mtime = remote_mtime AND synced = 0",
        )
        .bind(pair_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE entries SET local_mtime_prev = local_mtime, remote_mtime_prev = remote_mtime \
             WHERE pair_id = ?",
        )
        .bind(pair_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn row_to_entry(row: sqlx::sqlite::SqliteRow) -> Entry {
    Entry {
        pair_id: row.get("pair_id"),
        path: row.get("path"),
        remote_mtime: row.get("remote_mtime"),
        remote_mtime_prev: row.get("remote_mtime_prev"),
        exists_remote: row.get::<i64, _>("exists_remote") != 0,
        local_mtime: row.get("local_mtime"),
        local_mtime_prev: row.get("local_mtime_prev"),
        exists_local: row.get::<i64, _>("exists_local") != 0,
        synced: row.get::<i64, _>("synced") != 0,
        captured_at: row.get("captured_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    async fn pair_store() -> (StateStore, i64) {
        let store = StateStore::open_in_memory().await.unwrap();
        let registry = Registry::new(store.pool().clone());
        let pair_id = registry
            .add("Docs", "/tmp/p1", vec![".*".to_string()])
            .await
            .unwrap();
        (store, pair_id)
    }

    #[tokio::test]
    async fn observe_remote_then_local_merges_into_one_row() {
        let (store, pair_id) = pair_store().await;
        store.observe_remote(pair_id, "a.txt", 100, 1).await.unwrap();
        store.observe_local(pair_id, "a.txt", 100, 1).await.unwrap();

        let entries = store.list_entries(pair_id).await.unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert!(e.exists_remote);
        assert!(e.exists_local);
        assert_eq!(e.remote_mtime, Some(100));
        assert_eq!(e.local_mtime, Some(100));
    }

    #[tokio::test]
    async fn begin_pass_clears_exists_flags() {
        let (store, pair_id) = pair_store().await;
        store.observe_remote(pair_id, "a.txt", 100, 1).await.unwrap();
        store.begin_pass(pair_id, 2).await.unwrap();

        let e = store.get_entry(pair_id, "a.txt").await.unwrap().unwrap();
        assert!(!e.exists_remote);
        assert!(!e.exists_local);
        // mtimes survive the clear, only existence flags reset.
        assert_eq!(e.remote_mtime, Some(100));
    }

    #[tokio::test]
    async fn finish_pass_sets_synced_and_rotates_prev_mtimes() {
        let (store, pair_id) = pair_store().await;
        store.observe_remote(pair_id, "a.txt", 100, 1).await.unwrap();
        store.observe_local(pair_id, "a.txt", 100, 1).await.unwrap();
        store.finish_pass(pair_id).await.unwrap();

        let e = store.get_entry(pair_id, "a.txt").await.unwrap().unwrap();
        assert!(e.synced);
        assert_eq!(e.remote_mtime_prev, Some(100));
        assert_eq!(e.local_mtime_prev, Some(100));
    }

    #[tokio::test]
    async fn drop_entry_removes_row() {
        let (store, pair_id) = pair_store().await;
        store.observe_remote(pair_id, "a.txt", 100, 1).await.unwrap();
        store.drop_entry(pair_id, "a.txt").await.unwrap();
        assert!(store.get_entry(pair_id, "a.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_observations_of_same_path_stay_one_row() {
        let (store, pair_id) = pair_store().await;
        for _ in 0..3 {
            store.observe_remote(pair_id, "a.txt", 100, 1).await.unwrap();
        }
        assert_eq!(store.list_entries(pair_id).await.unwrap().len(), 1);
    }
}
