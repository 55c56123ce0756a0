//! `SyncedLedgerStore` owns the in-memory ledger and keeps two copies of it: the local cache, which
//! is written on every change, and an optional remote, which receives the full snapshot on a
//! best-effort basis.
//!
//! There is no merge. Whichever full snapshot is fetched or pushed replaces the other side, so two
//! writers clobber each other and the later full push wins.

use crate::api::{self, Mode, Remote};
use crate::backup::{Backup, PRE_PULL};
use crate::db::Db;
use crate::error::{Error, ErrorType, Result};
use crate::model::LedgerSnapshot;
use crate::mutation::{Applied, Mutation};
use crate::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// The sync state shown to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Only the local cache is in use: no remote is configured, it needs credentials, or it held
    /// nothing at startup.
    #[default]
    Local,
    Syncing,
    Synced,
    /// The last exchange with the remote failed. Local data is intact.
    Error,
}

/// `periodic_push` never ticks faster than this.
const MIN_PUSH_INTERVAL: Duration = Duration::from_millis(10);

serde_plain::derive_display_from_serialize!(SyncStatus);
serde_plain::derive_fromstr_from_deserialize!(SyncStatus);

impl SyncStatus {
    fn after(error_type: ErrorType) -> Self {
        match error_type {
            ErrorType::AuthRequired => SyncStatus::Local,
            _ => SyncStatus::Error,
        }
    }
}

/// Where the snapshot the store started with came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Remote,
    LocalCache,
    #[default]
    Defaults,
}

serde_plain::derive_display_from_serialize!(SnapshotSource);
serde_plain::derive_fromstr_from_deserialize!(SnapshotSource);

type SharedRemote = Arc<Mutex<Box<dyn Remote + Send>>>;

struct Ledger {
    snapshot: LedgerSnapshot,
    source: SnapshotSource,
}

/// A local-first ledger store. Clones share the same ledger.
#[derive(Clone)]
pub struct SyncedLedgerStore {
    ledger: Arc<Mutex<Ledger>>,
    db: Db,
    backup: Option<Backup>,
    remote: Option<SharedRemote>,
    status: Arc<watch::Sender<SyncStatus>>,
}

impl SyncedLedgerStore {
    /// Creates a store for the ledger home described by `config`. Call `initialize` before use.
    pub async fn open(config: &Config, mode: Mode) -> Result<Self> {
        let bin_id = match config.db().bin_id().await {
            Ok(bin_id) => bin_id,
            Err(e) => {
                warn!("Unable to read the remembered bin id: {e:#}");
                None
            }
        };
        let remote = api::remote(config, mode, bin_id)?;
        Ok(Self::new(
            config.db().clone(),
            remote,
            Some(config.backup()),
        ))
    }

    pub(crate) fn new(
        db: Db,
        remote: Option<Box<dyn Remote + Send>>,
        backup: Option<Backup>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Local);
        Self {
            ledger: Arc::new(Mutex::new(Ledger {
                snapshot: LedgerSnapshot::default(),
                source: SnapshotSource::Defaults,
            })),
            db,
            backup,
            remote: remote.map(|r| Arc::new(Mutex::new(r))),
            status: Arc::new(status),
        }
    }

    /// Loads the ledger. The remote is tried first; when it has a snapshot that snapshot wins and
    /// is mirrored into the local cache. Otherwise the local cache is used, and failing that an
    /// empty ledger with the default categories. Never fails.
    pub async fn initialize(&self) -> LedgerSnapshot {
        let local = self.load_local().await;

        if let Some(remote) = &self.remote {
            self.set_status(SyncStatus::Syncing);
            let fetched = remote.lock().await.fetch().await;
            match fetched {
                Ok(Some(snapshot)) => {
                    info!("Loaded the ledger from the remote");
                    self.adopt_remote(snapshot, local.as_ref()).await;
                    self.set_status(SyncStatus::Synced);
                    return self.snapshot().await;
                }
                Ok(None) => {
                    info!("The remote holds no ledger yet, using local data");
                    self.set_status(SyncStatus::Local);
                }
                Err(e) => {
                    warn!("Unable to load the ledger from the remote, using local data: {e}");
                    self.set_status(SyncStatus::after(e.error_type()));
                }
            }
        }

        self.use_local(local).await
    }

    /// Loads the ledger from the local cache only, without contacting the remote. Used where a
    /// remote-first load would discard the local data the caller is about to act on.
    pub async fn initialize_from_cache(&self) -> LedgerSnapshot {
        let local = self.load_local().await;
        self.use_local(local).await
    }

    async fn use_local(&self, local: Option<LedgerSnapshot>) -> LedgerSnapshot {
        let (snapshot, source) = match local {
            Some(snapshot) => (snapshot, SnapshotSource::LocalCache),
            None => {
                debug!("No local ledger found, starting with the default categories");
                (LedgerSnapshot::default(), SnapshotSource::Defaults)
            }
        };
        let mut ledger = self.ledger.lock().await;
        if source == SnapshotSource::Defaults {
            self.persist_local(&snapshot).await;
        }
        ledger.snapshot = snapshot.clone();
        ledger.source = source;
        snapshot
    }

    /// Applies `mutation`, writes the whole ledger to the local cache, and then pushes it to the
    /// remote. A rejected mutation changes nothing and returns its error. Failures to persist
    /// locally or remotely are logged and reflected in the status but are not returned.
    pub async fn mutate(&self, mutation: Mutation) -> Result<Applied> {
        trace!("Applying {mutation:?}");
        let applied = {
            let mut ledger = self.ledger.lock().await;
            let mut next = ledger.snapshot.clone();
            let applied = mutation.apply(&mut next)?;
            next.touch();
            // Written under the ledger lock so the cache sees snapshots in order.
            self.persist_local(&next).await;
            ledger.snapshot = next;
            applied
        };
        if self.remote.is_some() {
            if let Err(e) = self.force_push().await {
                debug!("Push after mutation failed: {e}");
            }
        }
        Ok(applied)
    }

    /// Pushes the current ledger to the remote. The ledger is read after the remote is acquired, so
    /// a push that waited behind another carries the newest state.
    pub async fn force_push(&self) -> Result<()> {
        let remote = self.require_remote()?;
        let mut remote = remote.lock().await;
        let snapshot = self.snapshot().await;
        self.set_status(SyncStatus::Syncing);
        let identity_before = remote.identity();
        match remote.push(&snapshot).await {
            Ok(()) => {
                let identity = remote.identity();
                drop(remote);
                if identity != identity_before {
                    if let Some(bin_id) = identity.as_deref() {
                        self.remember_bin_id(bin_id).await;
                    }
                }
                self.record_sync().await;
                self.set_status(SyncStatus::Synced);
                debug!("Pushed the ledger to the remote");
                Ok(())
            }
            Err(e) => {
                warn!("Unable to push the ledger to the remote: {e}");
                self.set_status(SyncStatus::after(e.error_type()));
                Err(e)
            }
        }
    }

    /// Replaces the in-memory ledger with the remote one and mirrors it locally. If the remote has
    /// nothing, or cannot be reached, the current ledger is kept.
    pub async fn force_pull(&self) -> Result<LedgerSnapshot> {
        let remote = self.require_remote()?;
        self.set_status(SyncStatus::Syncing);
        let fetched = remote.lock().await.fetch().await;
        match fetched {
            Ok(Some(snapshot)) => {
                let current = self.snapshot().await;
                self.adopt_remote(snapshot, Some(&current)).await;
                self.set_status(SyncStatus::Synced);
                Ok(self.snapshot().await)
            }
            Ok(None) => {
                info!("The remote holds no ledger, keeping local data");
                self.set_status(SyncStatus::Local);
                Ok(self.snapshot().await)
            }
            Err(e) => {
                warn!("Unable to pull the ledger from the remote: {e}");
                self.set_status(SyncStatus::after(e.error_type()));
                Err(e)
            }
        }
    }

    /// Starts a task that pushes the full ledger every `interval`, whether or not anything
    /// changed. The task runs until the returned handle is aborted. Without a remote the task
    /// ends immediately. Intervals shorter than 10ms are raised to 10ms.
    pub fn periodic_push(&self, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(MIN_PUSH_INTERVAL);
        let store = self.clone();
        tokio::spawn(async move {
            if store.remote.is_none() {
                debug!("No remote is configured, periodic push is not needed");
                return;
            }
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                trace!("Periodic push");
                if let Err(e) = store.force_push().await {
                    debug!("Periodic push failed: {e}");
                }
            }
        })
    }

    /// A copy of the current ledger.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.ledger.lock().await.snapshot.clone()
    }

    /// Where the ledger came from when it was last loaded.
    pub async fn source(&self) -> SnapshotSource {
        self.ledger.lock().await.source
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    /// Receives every status change.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// When the ledger was last pushed to or pulled from the remote.
    pub async fn last_sync(&self) -> Option<DateTime<Utc>> {
        match self.db.last_sync().await {
            Ok(when) => when,
            Err(e) => {
                warn!("Unable to read the last sync time: {e:#}");
                None
            }
        }
    }

    fn require_remote(&self) -> Result<&SharedRemote> {
        self.remote.as_ref().ok_or_else(|| {
            Error::msg(
                ErrorType::Config,
                "No remote is configured for this ledger, see remote in config.json",
            )
        })
    }

    fn set_status(&self, status: SyncStatus) {
        let previous = self.status.send_replace(status);
        if previous != status {
            debug!("Sync status {previous} -> {status}");
        }
    }

    async fn load_local(&self) -> Option<LedgerSnapshot> {
        match self.db.load_snapshot().await {
            Ok(load) => {
                for key in &load.corrupt_keys {
                    let e = Error::msg(
                        ErrorType::LocalCacheCorrupt,
                        format!("The local cache entry '{key}' could not be read"),
                    );
                    error!("{e}");
                }
                load.snapshot
            }
            Err(e) => {
                error!("Unable to read the local cache: {e:#}");
                None
            }
        }
    }

    /// Makes `snapshot` the ledger, mirrors it locally and backs up `previous` first if it held
    /// records that are about to be replaced.
    async fn adopt_remote(&self, snapshot: LedgerSnapshot, previous: Option<&LedgerSnapshot>) {
        if let (Some(previous), Some(backup)) = (previous, &self.backup) {
            if !previous.has_no_records() && !previous.same_contents(&snapshot) {
                match backup.save_json(PRE_PULL, previous).await {
                    Ok(path) => info!("Backed up local data to {}", path.display()),
                    Err(e) => warn!("Unable to back up local data before replacing it: {e:#}"),
                }
            }
        }
        let mut ledger = self.ledger.lock().await;
        self.persist_local(&snapshot).await;
        ledger.snapshot = snapshot;
        ledger.source = SnapshotSource::Remote;
        drop(ledger);
        self.record_sync().await;
    }

    async fn persist_local(&self, snapshot: &LedgerSnapshot) {
        if let Err(e) = self.db.save_snapshot(snapshot).await {
            error!("Unable to save the ledger to the local cache: {e:#}");
        }
    }

    async fn record_sync(&self) {
        if let Err(e) = self.db.set_last_sync(Utc::now()).await {
            warn!("Unable to record the sync time: {e:#}");
        }
    }

    async fn remember_bin_id(&self, bin_id: &str) {
        info!("Remembering remote bin {bin_id}");
        if let Err(e) = self.db.set_bin_id(bin_id).await {
            warn!("Unable to remember the remote bin id: {e:#}");
        }
    }
}
