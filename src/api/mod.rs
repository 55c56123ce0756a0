//! Remote storage for the ledger. The `Remote` trait is the seam between `SyncedLedgerStore` and
//! whatever holds the mirrored copy: a JSON bin service, a per-user document store, or the
//! in-memory `TestRemote` used when running in test mode.

mod bin;
mod documents;
mod test_remote;

use crate::config::{Config, RemoteKind};
use crate::error::{Error, ErrorType, IntoResult, Result};
use crate::model::LedgerSnapshot;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

pub(crate) use bin::BinRemote;
pub(crate) use documents::{DocumentRemote, Documents, RestDocuments, TestDocuments};
pub(crate) use test_remote::TestRemote;
#[cfg(test)]
pub(crate) use test_remote::TestRemoteState;

/// The environment variable that switches the program to in-memory remotes.
pub(crate) const TEST_MODE_ENV: &str = "LEDGER_SYNC_IN_TEST_MODE";

/// How long a single remote request may take before it counts as a network failure.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Whether the program talks to real remote services or to in-memory stand-ins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Live,
    Test,
}

impl Mode {
    /// `Mode::Test` when `LEDGER_SYNC_IN_TEST_MODE` is set and non-empty, otherwise `Mode::Live`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(v) if !v.is_empty() => Mode::Test,
            _ => Mode::Live,
        }
    }
}

/// A place that holds one full copy of the ledger.
///
/// Implementations classify their failures with `ErrorType::NetworkUnavailable`,
/// `ErrorType::AuthRequired` or `ErrorType::RemoteRejected` so the store can decide what status to
/// show.
#[async_trait::async_trait]
pub(crate) trait Remote: Send {
    /// Reads the stored snapshot. `Ok(None)` means nothing has been stored yet.
    async fn fetch(&mut self) -> Result<Option<LedgerSnapshot>>;

    /// Replaces whatever is stored with `snapshot`.
    async fn push(&mut self, snapshot: &LedgerSnapshot) -> Result<()>;

    /// The identity of the stored copy, e.g. a bin id. `None` until one exists.
    fn identity(&self) -> Option<String>;
}

/// Builds the remote described by `config`, or `None` when no remote is configured. `bin_id` is
/// the previously created bin remembered in the local cache, if any.
pub(crate) fn remote(
    config: &Config,
    mode: Mode,
    bin_id: Option<String>,
) -> Result<Option<Box<dyn Remote + Send>>> {
    let kind = config.remote_kind();
    debug!("Creating remote of kind '{kind}' in {mode:?} mode");
    let remote: Box<dyn Remote + Send> = match (kind, mode) {
        (RemoteKind::None, _) => return Ok(None),
        (RemoteKind::Bin, Mode::Test) => Box::new(TestRemote::new(config.remote_identity())),
        (RemoteKind::Documents, Mode::Test) => Box::new(DocumentRemote::new(
            TestDocuments,
            config.remote_identity(),
        )),
        (RemoteKind::Bin, Mode::Live) => {
            let credentials = config.credentials();
            Box::new(BinRemote::new(
                config.remote_url()?,
                credentials.access_key().map(str::to_string),
                bin_id,
                config.bin_name(),
            )?)
        }
        (RemoteKind::Documents, Mode::Live) => {
            let credentials = config.credentials();
            let documents = RestDocuments::new(
                config.remote_url()?,
                credentials.id_token().map(str::to_string),
            )?;
            Box::new(DocumentRemote::new(documents, config.remote_identity()))
        }
    };
    Ok(Some(remote))
}

/// Builds the HTTP client shared by the live remotes.
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .pub_result(ErrorType::Config)
}

/// Classifies a failure to complete an HTTP exchange.
pub(crate) fn transport_error(e: reqwest::Error, what: &str) -> Error {
    // A body that arrived but could not be decoded is the remote's fault. Anything else means the
    // remote was not reachable.
    let error_type = if e.is_decode() {
        ErrorType::RemoteRejected
    } else {
        ErrorType::NetworkUnavailable
    };
    Error::new(
        error_type,
        anyhow::Error::new(e).context(format!("{what} failed")),
    )
}

/// Turns a non-success status into a classified error.
pub(crate) async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());
    Err(Error::msg(
        status_error_type(status),
        format!("{what} failed with status {status}: {body}"),
    ))
}

fn status_error_type(status: StatusCode) -> ErrorType {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorType::AuthRequired,
        _ => ErrorType::RemoteRejected,
    }
}
