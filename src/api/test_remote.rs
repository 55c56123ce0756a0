//! Implements the `Remote` trait in memory.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without a remote service. Every `TestRemote` with the same identity shares
//! the same stored snapshot for the life of the process, the way two devices share one bin.

use crate::api::Remote;
use crate::error::{Error, ErrorType, Result};
use crate::model::LedgerSnapshot;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use tracing::trace;

#[derive(Debug, Clone, Default)]
pub(crate) struct TestRemoteState {
    pub(crate) snapshot: Option<LedgerSnapshot>,
    /// When set, every call fails with this error type.
    pub(crate) failure: Option<ErrorType>,
    pub(crate) fetches: usize,
    pub(crate) pushes: usize,
}

fn registry() -> &'static Mutex<HashMap<String, TestRemoteState>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, TestRemoteState>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

pub(crate) struct TestRemote {
    identity: String,
}

impl TestRemote {
    pub(crate) fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut TestRemoteState) -> R) -> R {
        let mut guard = registry()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(guard.entry(self.identity.clone()).or_default())
    }

    /// A copy of the shared state for this identity.
    pub(crate) fn state(&self) -> TestRemoteState {
        self.with(|s| s.clone())
    }

    /// Stores `snapshot` as if another device had pushed it.
    pub(crate) fn seed(&self, snapshot: LedgerSnapshot) {
        self.with(|s| s.snapshot = Some(snapshot));
    }

    /// Makes every subsequent call fail with `failure`, or succeed again with `None`.
    pub(crate) fn set_failure(&self, failure: Option<ErrorType>) {
        self.with(|s| s.failure = failure);
    }
}

fn injected(error_type: ErrorType) -> Error {
    Error::msg(error_type, "Injected test remote failure")
}

#[async_trait::async_trait]
impl Remote for TestRemote {
    async fn fetch(&mut self) -> Result<Option<LedgerSnapshot>> {
        trace!("TestRemote fetch for {}", self.identity);
        self.with(|s| {
            if let Some(failure) = s.failure {
                return Err(injected(failure));
            }
            s.fetches += 1;
            Ok(s.snapshot.clone())
        })
    }

    async fn push(&mut self, snapshot: &LedgerSnapshot) -> Result<()> {
        trace!("TestRemote push for {}", self.identity);
        self.with(|s| {
            if let Some(failure) = s.failure {
                return Err(injected(failure));
            }
            s.pushes += 1;
            s.snapshot = Some(snapshot.clone());
            Ok(())
        })
    }

    fn identity(&self) -> Option<String> {
        Some(self.identity.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_instances_share_state_by_identity() {
        let id = format!("shared-{}", uuid::Uuid::new_v4());
        let mut a = TestRemote::new(&id);
        let mut b = TestRemote::new(&id);
        assert!(b.fetch().await.unwrap().is_none());
        a.push(&LedgerSnapshot::default()).await.unwrap();
        assert!(b.fetch().await.unwrap().is_some());
        assert_eq!(a.state().pushes, 1);
        assert_eq!(a.state().fetches, 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let mut r = TestRemote::new(format!("fail-{}", uuid::Uuid::new_v4()));
        r.set_failure(Some(ErrorType::NetworkUnavailable));
        let e = r.push(&LedgerSnapshot::default()).await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::NetworkUnavailable);
        assert!(r.state().snapshot.is_none());
        r.set_failure(None);
        r.push(&LedgerSnapshot::default()).await.unwrap();
        assert!(r.state().snapshot.is_some());
    }
}
