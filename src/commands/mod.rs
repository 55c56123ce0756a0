//! Command handlers for the ledger CLI.
//!
//! This module contains implementations for all CLI subcommands.

mod init;
mod query;
mod records;
mod sync;

use crate::api::Mode;
use crate::{Config, Result, SyncedLedgerStore};
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

pub use init::init;
pub use query::{list, status, summary, Listing, StatusReport, SummaryReport};
pub use records::{add, delete, pay, unpay, update};
pub use sync::{sync_down, sync_up, watch, SyncReport};

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// Opens the store and loads the ledger remote-first. Used by commands that change the ledger.
async fn open_synced(config: &Config, mode: Mode) -> Result<SyncedLedgerStore> {
    let store = SyncedLedgerStore::open(config, mode).await?;
    store.initialize().await;
    Ok(store)
}

/// Opens the store and loads the ledger from the local cache without contacting the remote.
async fn open_cached(config: &Config, mode: Mode) -> Result<SyncedLedgerStore> {
    let store = SyncedLedgerStore::open(config, mode).await?;
    store.initialize_from_cache().await;
    Ok(store)
}

fn plural(count: usize, one: &str, many: &str) -> String {
    format!("{count} {}", if count == 1 { one } else { many })
}
