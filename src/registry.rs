//! Pair registry (C9): CRUD for (remote root, local root, extension
//! filter) sync configurations.
//!
//! Grounded on `db/sources.rs`'s CRUD shape (`create_source`/`get_source`/
//! `get_sources`), adapted to the `pairs` table.

use sqlx::{Row, SqlitePool};

use crate::error::Result;

/// A sync configuration: one (remote root, local root, extension filter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub id: i64,
    pub remote_root: String,
    pub local_root: String,
    pub allowed_extensions: Vec<String>,
}

impl Pair {
    /// True iff `filename`'s lowercase extension is in the allowlist, or
    /// the allowlist is the `.*` wildcard sentinel.
    pub fn accepts(&self, filename: &str) -> bool {
        if self.allowed_extensions.iter().any(|e| e == ".*") {
            return true;
        }
        let lower = filename.to_ascii_lowercase();
        self.allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
    }
}

#[derive(Clone)]
pub struct Registry {
    pool: SqlitePool,
}

impl Registry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a new pair with an auto-assigned id. Extensions are
    /// normalized to lowercase.
    pub async fn add(
        &self,
        remote_root: &str,
        local_root: &str,
        extensions: Vec<String>,
    ) -> Result<i64> {
        let normalized: Vec<String> = extensions.iter().map(|e| e.to_ascii_lowercase()).collect();
        let csv = normalized.join(",");

        let row = sqlx::query(
            "INSERT INTO pairs (remote_root, local_root, allowed_extensions_csv) \
             VALUES (?, ?, ?) RETURNING id",
        )
        .bind(remote_root)
        .bind(local_root)
        .bind(csv)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("id"))
    }

    /// Deletes a pair, cascading to its entries in one transaction.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM entries WHERE pair_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM pairs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Pair>> {
        let rows = sqlx::query("SELECT id, remote_root, local_root, allowed_extensions_csv FROM pairs")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(row_to_pair).collect())
    }

    pub async fn get(&self, id: i64) -> Result<Option<Pair>> {
        let row = sqlx::query(
            "SELECT id, remote_root, local_root, allowed_extensions_csv FROM pairs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(row_to_pair))
    }
}

fn row_to_pair(row: sqlx::sqlite::SqliteRow) -> Pair {
    let csv: String = row.get("allowed_extensions_csv");
    Pair {
        id: row.get("id"),
        remote_root: row.get("remote_root"),
        local_root: row.get("local_root"),
        allowed_extensions: csv.split(',').filter(|s| !s.is_empty()).map(String::from).collect(),
    }
}
