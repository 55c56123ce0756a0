//! This module is responsible for reading, writing and managing the local SQLite cache.
//!
//! The cache is a key-value table. Each ledger collection is stored as one JSON string under its
//! own key (`expenses`, `income`, `pettyCash`, `categories`, `incomeCategories`) next to a few
//! sync metadata keys. A snapshot is always written in a single transaction so that the cache never
//! holds a mix of two snapshots.

mod migrations;

use crate::error::Res;
use crate::model::{default_expense_categories, default_income_categories, LedgerSnapshot};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, trace, warn};

pub(crate) const EXPENSES: &str = "expenses";
pub(crate) const INCOME: &str = "income";
pub(crate) const PETTY_CASH: &str = "pettyCash";
pub(crate) const CATEGORIES: &str = "categories";
pub(crate) const INCOME_CATEGORIES: &str = "incomeCategories";
pub(crate) const LAST_UPDATED: &str = "lastUpdated";
pub(crate) const LAST_SYNC: &str = "lastSync";
pub(crate) const BIN_ID: &str = "binId";

const COLLECTION_KEYS: &[&str] = &[EXPENSES, INCOME, PETTY_CASH, CATEGORIES, INCOME_CATEGORIES];

/// A handle to the local cache. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub(crate) struct Db {
    pool: SqlitePool,
}

/// The result of reading the ledger out of the local cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalLoad {
    /// `None` when no collection has ever been written.
    pub(crate) snapshot: Option<LedgerSnapshot>,
    /// Keys whose stored value could not be parsed. Each was treated as missing.
    pub(crate) corrupt_keys: Vec<String>,
}

impl Db {
    /// Opens the SQLite file at `path`, creating it if needed, and brings its schema up to date.
    pub(crate) async fn init(path: &Path) -> Res<Self> {
        let db = Self::connect(path, true).await?;
        db.migrate().await?;
        Ok(db)
    }

    /// Opens an existing SQLite file at `path` and brings its schema up to date.
    pub(crate) async fn load(path: &Path) -> Res<Self> {
        anyhow::ensure!(
            path.is_file(),
            "The local cache is missing '{}'",
            path.display()
        );
        let db = Self::connect(path, false).await?;
        db.migrate().await?;
        Ok(db)
    }

    async fn connect(path: &Path, create: bool) -> Res<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .context("Failed to parse SQLite connection string")?
            .create_if_missing(create);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
        Ok(Self { pool })
    }

    async fn migrate(&self) -> Res<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await
            .context("Failed to create schema_version table")?;
        let row: (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await
            .context("Failed to query schema version")?;
        let current = row.0.unwrap_or(0);
        if current > migrations::CURRENT_VERSION {
            anyhow::bail!(
                "The local cache schema version {current} is newer than this program supports \
                ({}). Is a newer version of ledger available?",
                migrations::CURRENT_VERSION
            );
        }
        migrations::upgrade(&self.pool, current).await
    }

    /// Reads the raw value stored under `key`.
    pub(crate) async fn get(&self, key: &str) -> Res<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read key '{key}'"))?;
        Ok(row.map(|r| r.0))
    }

    /// Stores `value` under `key`, replacing what was there.
    pub(crate) async fn set(&self, key: &str, value: &str) -> Res<()> {
        self.set_all(&[(key, value.to_string())]).await
    }

    /// Stores every entry in one transaction: either all of them are written or none are.
    pub(crate) async fn set_all(&self, entries: &[(&str, String)]) -> Res<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;
        for (key, value) in entries {
            trace!("Writing key '{key}' ({} bytes)", value.len());
            sqlx::query(
                "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                 updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to write key '{key}'"))?;
        }
        tx.commit().await.context("Failed to commit transaction")?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn remove(&self, key: &str) -> Res<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to remove key '{key}'"))?;
        Ok(())
    }

    /// Writes every collection of `snapshot` in a single transaction.
    pub(crate) async fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> Res<()> {
        let entries = vec![
            (EXPENSES, to_json(&snapshot.expenses)?),
            (INCOME, to_json(&snapshot.income)?),
            (PETTY_CASH, to_json(&snapshot.petty_cash)?),
            (CATEGORIES, to_json(&snapshot.categories)?),
            (INCOME_CATEGORIES, to_json(&snapshot.income_categories)?),
            (LAST_UPDATED, snapshot.last_updated.to_rfc3339()),
        ];
        self.set_all(&entries).await?;
        debug!(
            "Saved snapshot to local cache: {} expenses, {} income, {} petty cash",
            snapshot.expenses.len(),
            snapshot.income.len(),
            snapshot.petty_cash.len()
        );
        Ok(())
    }

    /// Reads the ledger from the cache. Missing keys become empty collections (or the default
    /// categories); unparseable keys are reported in `corrupt_keys` and treated as missing. Only a
    /// failure to query the database is an error.
    pub(crate) async fn load_snapshot(&self) -> Res<LocalLoad> {
        let mut found_any = false;
        for key in COLLECTION_KEYS {
            if self.get(key).await?.is_some() {
                found_any = true;
                break;
            }
        }
        if !found_any {
            return Ok(LocalLoad {
                snapshot: None,
                corrupt_keys: Vec::new(),
            });
        }

        let mut corrupt_keys = Vec::new();
        let mut snapshot = LedgerSnapshot::default();
        snapshot.expenses = self.read_key(EXPENSES, &mut corrupt_keys).await?.unwrap_or_default();
        snapshot.income = self.read_key(INCOME, &mut corrupt_keys).await?.unwrap_or_default();
        snapshot.petty_cash = self
            .read_key(PETTY_CASH, &mut corrupt_keys)
            .await?
            .unwrap_or_default();
        snapshot.categories = self
            .read_key(CATEGORIES, &mut corrupt_keys)
            .await?
            .unwrap_or_else(default_expense_categories);
        snapshot.income_categories = self
            .read_key(INCOME_CATEGORIES, &mut corrupt_keys)
            .await?
            .unwrap_or_else(default_income_categories);
        if let Some(ts) = self.get_timestamp(LAST_UPDATED).await? {
            snapshot.last_updated = ts;
        }

        Ok(LocalLoad {
            snapshot: Some(snapshot),
            corrupt_keys,
        })
    }

    /// Reads and parses one key. Parse failures are recorded in `corrupt` and yield `None`.
    async fn read_key<T>(&self, key: &str, corrupt: &mut Vec<String>) -> Res<Option<T>>
    where
        T: DeserializeOwned,
    {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("The local cache value for '{key}' is corrupt and will be ignored: {e}");
                corrupt.push(key.to_string());
                Ok(None)
            }
        }
    }

    /// Reads an RFC 3339 timestamp. An unparseable timestamp is logged and ignored.
    pub(crate) async fn get_timestamp(&self, key: &str) -> Res<Option<DateTime<Utc>>> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
            Err(e) => {
                warn!("Ignoring unparseable timestamp under '{key}': {e}");
                Ok(None)
            }
        }
    }

    pub(crate) async fn last_sync(&self) -> Res<Option<DateTime<Utc>>> {
        self.get_timestamp(LAST_SYNC).await
    }

    pub(crate) async fn set_last_sync(&self, when: DateTime<Utc>) -> Res<()> {
        self.set(LAST_SYNC, &when.to_rfc3339()).await
    }

    /// The identifier of the remote bin this install writes to, once one has been created.
    pub(crate) async fn bin_id(&self) -> Res<Option<String>> {
        self.get(BIN_ID).await
    }

    pub(crate) async fn set_bin_id(&self, bin_id: &str) -> Res<()> {
        self.set(BIN_ID, bin_id).await
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Res<String> {
    serde_json::to_string(value).context("Failed to serialize ledger collection")
}
