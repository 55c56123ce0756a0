use crate::api::Mode;
use crate::args::WatchArgs;
use crate::commands::{open_cached, open_synced, plural, Out};
use crate::error::ErrorType;
use crate::model::LedgerSnapshot;
use crate::{Config, Result, SyncStatus, SyncedLedgerStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The outcome of `sync up` or `sync down`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub records: usize,
}

/// Pushes the local ledger to the remote, replacing whatever the remote holds.
pub async fn sync_up(config: Config, mode: Mode) -> Result<Out<SyncReport>> {
    let store = open_cached(&config, mode).await?;
    store.force_push().await?;
    let report = report(&store, &store.snapshot().await).await;
    let message = format!(
        "Pushed {} to the remote",
        plural(report.records, "record", "records")
    );
    Ok(Out::new(message, report))
}

/// Replaces the local ledger with the remote one. The replaced local data is backed up first. If
/// the remote holds nothing the local ledger is kept.
pub async fn sync_down(config: Config, mode: Mode) -> Result<Out<SyncReport>> {
    let store = open_cached(&config, mode).await?;
    let pulled = store.force_pull().await?;
    let report = report(&store, &pulled).await;
    let message = match report.status {
        SyncStatus::Synced => format!(
            "Pulled {} from the remote",
            plural(report.records, "record", "records")
        ),
        _ => "The remote holds no ledger yet, kept the local data".to_string(),
    };
    Ok(Out::new(message, report))
}

/// Loads the ledger and pushes it to the remote every `interval` (or `sync_interval_secs` from
/// `config.json`) until Ctrl-C is pressed.
pub async fn watch(config: Config, mode: Mode, args: WatchArgs) -> Result<Out<SyncReport>> {
    let interval = args
        .interval()
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.sync_interval());
    let store = open_synced(&config, mode).await?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    watch_until(&store, interval, shutdown).await?;
    let report = report(&store, &store.snapshot().await).await;
    Ok(Out::new("Stopped watching", report))
}

async fn watch_until(
    store: &SyncedLedgerStore,
    interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    if !store.has_remote() {
        return Err(crate::Error::msg(
            ErrorType::Config,
            "No remote is configured, there is nothing to watch",
        ));
    }
    info!(
        "Pushing the ledger every {}s, press Ctrl-C to stop",
        interval.as_secs_f64()
    );
    let handle = store.periodic_push(interval);
    let mut status = store.subscribe();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                match current {
                    SyncStatus::Syncing => debug!("Sync status: {current}"),
                    _ => info!("Sync status: {current}"),
                }
            }
        }
    }
    handle.abort();
    // Only reports the cancellation.
    let _ = handle.await;
    Ok(())
}

async fn report(store: &SyncedLedgerStore, ledger: &LedgerSnapshot) -> SyncReport {
    SyncReport {
        status: store.status(),
        last_sync: store.last_sync().await,
        records: ledger.expenses().len() + ledger.income().len() + ledger.petty_cash().len(),
    }
}
