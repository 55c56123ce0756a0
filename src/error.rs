//! Error types for the ledger.
//!
//! Internally the crate uses `anyhow` (`Res<T>`) and adds `.context(..)` as errors bubble up. At
//! public boundaries errors are converted into `Error`, which carries an `ErrorType` so that callers
//! can tell a sync failure (which the store downgrades to a status) apart from a rejected mutation.

use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// The internal result type.
pub(crate) type Res<T> = std::result::Result<T, anyhow::Error>;

/// The public result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies an `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The ledger home or its configuration is missing or invalid.
    Config,
    /// The local SQLite cache could not be opened, read or written.
    Database,
    /// A mutation was rejected because a field was missing or invalid.
    Validation,
    /// A mutation referenced a record or category that does not exist.
    NotFound,
    /// A category could not be deleted because a record references it.
    CategoryInUse,
    /// A category with the same name (case-insensitive) already exists.
    DuplicateCategory,
    /// The remote could not be reached, or the request timed out.
    NetworkUnavailable,
    /// The remote requires credentials that are missing or were refused.
    AuthRequired,
    /// The remote answered with a non-success status or an unreadable body.
    RemoteRejected,
    /// A value stored in the local cache could not be parsed.
    LocalCacheCorrupt,
}

serde_plain::derive_display_from_serialize!(ErrorType);
serde_plain::derive_fromstr_from_deserialize!(ErrorType);

impl ErrorType {
    /// True for the errors that come from talking to a remote. The store never lets these escape.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ErrorType::NetworkUnavailable | ErrorType::AuthRequired | ErrorType::RemoteRejected
        )
    }
}

/// The public error type.
pub struct Error {
    error_type: ErrorType,
    inner: anyhow::Error,
}

impl Error {
    pub fn new(error_type: ErrorType, inner: impl Into<anyhow::Error>) -> Self {
        Self {
            error_type,
            inner: inner.into(),
        }
    }

    /// Create an error from a plain message.
    pub fn msg(error_type: ErrorType, message: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::new(error_type, anyhow::Error::msg(message))
    }

    pub fn error_type(&self) -> ErrorType {
        self.error_type
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:#}", self.error_type, self.inner)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error: {:?}", self.error_type, self.inner)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.inner)
    }
}

/// Converts an internal result into a public `Result` with the given `ErrorType`.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| Error::new(error_type, e))
    }
}
