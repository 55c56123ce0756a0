mod api;
pub mod args;
mod backup;
pub mod commands;
mod config;
mod db;
mod error;
pub mod model;
mod mutation;
pub mod report;
mod store;
mod utils;


pub use api::Mode;
pub use backup::Backup;
pub use config::{Config, RemoteKind, RemoteSettings, ACCESS_KEY_ENV};
pub use error::{Error, ErrorType, Result};
pub use mutation::{Applied, Mutation};
pub use store::{SnapshotSource, SyncStatus, SyncedLedgerStore};
