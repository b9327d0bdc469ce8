//! Embedded schema migrations for the state store.
//!
//! Grounded on `migrations.rs`'s `MigrationRunner` shape, simplified to a
//! fixed in-binary list: this crate ships as one self-contained binary, so
//! there is no external `migrations/` directory to discover at runtime.

use sqlx::SqlitePool;

use crate::error::Result;

struct Migration {
    version: i64,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
            CREATE TABLE IF NOT EXISTS pairs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_root TEXT NOT NULL,
                local_root TEXT NOT NULL,
                allowed_extensions_csv TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                pair_id INTEGER NOT NULL REFERENCES pairs(id) ON DELETE CASCADE,
                path TEXT NOT NULL,
                remote_mtime INTEGER,
                remote_mtime_prev INTEGER,
                exists_remote INTEGER NOT NULL DEFAULT 0,
                local_mtime INTEGER,
                local_mtime_prev INTEGER,
                exists_local INTEGER NOT NULL DEFAULT 0,
                synced INTEGER NOT NULL DEFAULT 0,
                captured_at INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (pair_id, path)
            );
        "#,
    },
];

pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )"#,
    )
    .execute(pool)
    .await?;

    for migration in MIGRATIONS {
        let applied: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM schema_migrations WHERE version = ?")
                .bind(migration.version)
                .fetch_optional(pool)
                .await?;

        if applied.is_some() {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in migration.sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(version = migration.version, "applied state store migration");
    }

    Ok(())
}
