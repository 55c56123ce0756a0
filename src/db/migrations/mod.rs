//! Schema upgrades for the local cache.
//!
//! Each `vNN_*.sql` file moves the schema from version `NN-1` to `NN`. The cache is only ever
//! upgraded; a cache written by a newer build is refused before this module is reached.

use anyhow::Context;
use sqlx::{Executor, SqlitePool};
use tracing::debug;

use crate::error::Res;

/// Upgrade scripts in order. Script `i` brings the schema to version `i + 1`.
const UPGRADES: &[&str] = &[include_str!("v01_kv.sql")];

/// The schema version this build of the program expects.
pub(crate) const CURRENT_VERSION: i32 = UPGRADES.len() as i32;

/// Applies every upgrade after `from`. Each one runs in its own transaction together with the
/// `schema_version` update, so an interrupted upgrade leaves the previous version intact.
pub(crate) async fn upgrade(pool: &SqlitePool, from: i32) -> Res<()> {
    let pending = UPGRADES
        .iter()
        .enumerate()
        .map(|(i, sql)| (i as i32 + 1, *sql))
        .filter(|(version, _)| *version > from);
    for (version, sql) in pending {
        debug!("Upgrading the local cache schema to version {version}");
        let mut tx = pool
            .begin()
            .await
            .context("Failed to begin schema upgrade")?;
        tx.execute(sql)
            .await
            .with_context(|| format!("Failed to apply schema version {version}"))?;
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut *tx)
            .await
            .context("Failed to clear schema_version")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut *tx)
            .await
            .context("Failed to record schema_version")?;
        tx.commit()
            .await
            .with_context(|| format!("Failed to commit schema version {version}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn fresh_cache() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.sqlite");
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        (dir, pool)
    }

    async fn version(pool: &SqlitePool) -> Option<i32> {
        let row: (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
            .fetch_one(pool)
            .await
            .unwrap();
        row.0
    }

    #[tokio::test]
    async fn test_upgrade_creates_kv_with_one_value_per_key() {
        let (_dir, pool) = fresh_cache().await;
        upgrade(&pool, 0).await.unwrap();
        assert_eq!(version(&pool).await, Some(CURRENT_VERSION));

        let insert = "INSERT INTO kv (key, value, updated_at) VALUES ('expenses', '[]', 'now')";
        sqlx::query(insert).execute(&pool).await.unwrap();
        // Collections are single JSON values, so a second row for the same key is refused.
        assert!(sqlx::query(insert).execute(&pool).await.is_err());
    }

    #[tokio::test]
    async fn test_upgrade_from_current_keeps_cached_values() {
        let (_dir, pool) = fresh_cache().await;
        upgrade(&pool, 0).await.unwrap();
        sqlx::query("INSERT INTO kv (key, value, updated_at) VALUES ('binId', 'abc', 'now')")
            .execute(&pool)
            .await
            .unwrap();

        upgrade(&pool, CURRENT_VERSION).await.unwrap();

        let row: (String,) = sqlx::query_as("SELECT value FROM kv WHERE key = 'binId'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, "abc");
        assert_eq!(version(&pool).await, Some(CURRENT_VERSION));
    }

    #[tokio::test]
    async fn test_failed_upgrade_leaves_version_unchanged() {
        let (_dir, pool) = fresh_cache().await;
        // A table already named kv makes the first upgrade fail part way.
        sqlx::query("CREATE TABLE kv (other TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        assert!(upgrade(&pool, 0).await.is_err());
        assert_eq!(version(&pool).await, None);
    }
}
