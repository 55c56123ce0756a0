//! Implements the `Remote` trait against a JSON bin service (the JSONBin v3 API shape).
//!
//! - `GET  {base}/b/{id}/latest` answers `{ "record": <document> }`
//! - `PUT  {base}/b/{id}` replaces the document
//! - `POST {base}/b` creates a bin and answers `{ "metadata": { "id": ... } }`
//!
//! The document is the ledger snapshot plus a `version` marker.

use crate::api::{check_status, http_client, transport_error, Remote};
use crate::error::{Error, ErrorType, IntoResult, Result};
use crate::model::LedgerSnapshot;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};
use url::Url;

const DOCUMENT_VERSION: &str = "1.0";
const MASTER_KEY: &str = "X-Master-Key";
const BIN_NAME: &str = "X-Bin-Name";
const BIN_PRIVATE: &str = "X-Bin-Private";

pub(crate) struct BinRemote {
    client: reqwest::Client,
    base: Url,
    access_key: Option<String>,
    bin_id: Option<String>,
    bin_name: String,
}

impl BinRemote {
    /// Creates a bin remote rooted at `base`. A missing `access_key` is not an error until the
    /// remote is used, at which point every call fails with `ErrorType::AuthRequired`.
    pub(crate) fn new(
        base: Url,
        access_key: Option<String>,
        bin_id: Option<String>,
        bin_name: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            base: with_trailing_slash(base),
            access_key,
            bin_id: bin_id.filter(|id| !id.is_empty()),
            bin_name: bin_name.into(),
        })
    }

    fn access_key(&self) -> Result<&str> {
        self.access_key.as_deref().ok_or_else(|| {
            Error::msg(
                ErrorType::AuthRequired,
                "No access key is available for the bin remote. Set LEDGER_ACCESS_KEY or add \
                access_key to .secrets/credentials.json",
            )
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .pub_result(ErrorType::Config)
    }

    async fn create(&mut self, snapshot: &LedgerSnapshot) -> Result<()> {
        let url = self.endpoint("b")?;
        debug!("Creating a new bin at {url}");
        let response = self
            .client
            .post(url)
            .header(MASTER_KEY, self.access_key()?)
            .header(BIN_NAME, &self.bin_name)
            .header(BIN_PRIVATE, "true")
            .json(&BinDocument::new(snapshot))
            .send()
            .await
            .map_err(|e| transport_error(e, "Creating the bin"))?;
        let response = check_status(response, "Creating the bin").await?;
        let created: Created = response
            .json()
            .await
            .map_err(|e| transport_error(e, "Reading the created bin id"))?;
        info!("Created bin {}", created.metadata.id);
        self.bin_id = Some(created.metadata.id);
        Ok(())
    }

    async fn replace(&self, bin_id: &str, snapshot: &LedgerSnapshot) -> Result<()> {
        let url = self.endpoint(&format!("b/{bin_id}"))?;
        trace!("PUT {url}");
        let response = self
            .client
            .put(url)
            .header(MASTER_KEY, self.access_key()?)
            .json(&BinDocument::new(snapshot))
            .send()
            .await
            .map_err(|e| transport_error(e, "Updating the bin"))?;
        check_status(response, "Updating the bin").await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Remote for BinRemote {
    async fn fetch(&mut self) -> Result<Option<LedgerSnapshot>> {
        let key = self.access_key()?.to_string();
        let Some(bin_id) = self.bin_id.as_deref() else {
            debug!("No bin has been created yet, nothing to fetch");
            return Ok(None);
        };
        let url = self.endpoint(&format!("b/{bin_id}/latest"))?;
        trace!("GET {url}");
        let response = self
            .client
            .get(url)
            .header(MASTER_KEY, key)
            .send()
            .await
            .map_err(|e| transport_error(e, "Fetching the bin"))?;
        let response = check_status(response, "Fetching the bin").await?;
        let latest: Latest = response
            .json()
            .await
            .map_err(|e| transport_error(e, "Reading the bin"))?;
        if let Some(version) = &latest.record.version {
            trace!("Bin document version {version}");
        }
        Ok(Some(latest.record.snapshot))
    }

    async fn push(&mut self, snapshot: &LedgerSnapshot) -> Result<()> {
        match self.bin_id.clone() {
            Some(bin_id) => self.replace(&bin_id, snapshot).await,
            None => self.create(snapshot).await,
        }
    }

    fn identity(&self) -> Option<String> {
        self.bin_id.clone()
    }
}

/// `Url::join` drops the last path segment unless the base ends with a slash.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[derive(Serialize)]
struct BinDocument<'a> {
    #[serde(flatten)]
    snapshot: &'a LedgerSnapshot,
    version: &'static str,
}

impl<'a> BinDocument<'a> {
    fn new(snapshot: &'a LedgerSnapshot) -> Self {
        Self {
            snapshot,
            version: DOCUMENT_VERSION,
        }
    }
}

#[derive(Deserialize)]
struct StoredDocument {
    #[serde(flatten)]
    snapshot: LedgerSnapshot,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Deserialize)]
struct Latest {
    record: StoredDocument,
}

#[derive(Deserialize)]
struct Created {
    metadata: CreatedMetadata,
}

#[derive(Deserialize)]
struct CreatedMetadata {
    id: String,
}
