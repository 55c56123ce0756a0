//! Configuration file handling for the ledger.
//!
//! The configuration file is stored at `$LEDGER_HOME/config.json` and contains the remote settings,
//! the push interval and backup settings. Credentials for the remote never live in the config file;
//! they are read from `$LEDGER_HOME/.secrets/credentials.json` or from the `LEDGER_ACCESS_KEY`
//! environment variable.

use crate::backup::Backup;
use crate::db::Db;
use crate::error::{ErrorType, IntoResult, Res, Result};
use crate::utils;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const APP_NAME: &str = "ledger";
const CONFIG_VERSION: u8 = 1;
const BACKUP_COPIES: u32 = 5;
const SYNC_INTERVAL_SECS: u64 = 30;
const SECRETS: &str = ".secrets";
const BACKUPS: &str = ".backups";
const CREDENTIALS_JSON: &str = "credentials.json";
const CONFIG_JSON: &str = "config.json";
const LEDGER_SQLITE: &str = "ledger.sqlite";
const DEFAULT_BIN_URL: &str = "https://api.jsonbin.io/v3/";
const DEFAULT_BIN_NAME: &str = "ledger";

/// Overrides `access_key` from the credentials file.
pub const ACCESS_KEY_ENV: &str = "LEDGER_ACCESS_KEY";

/// Which kind of remote, if any, the ledger is mirrored to.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RemoteKind {
    /// Local cache only.
    #[default]
    None,
    /// A JSON bin service holding the whole ledger as one document.
    Bin,
    /// A per-user document store holding one document per record.
    Documents,
}

serde_plain::derive_display_from_serialize!(RemoteKind);
serde_plain::derive_fromstr_from_deserialize!(RemoteKind);

/// The remote section of `config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct RemoteSettings {
    #[serde(default)]
    kind: RemoteKind,

    /// Base URL of the remote service. The bin remote defaults to the public JSONBin v3 API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,

    /// The identity the document remote stores data under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,

    /// The `X-Bin-Name` sent when a bin is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bin_name: Option<String>,
}

impl RemoteSettings {
    pub fn new(kind: RemoteKind, url: Option<String>, user_id: Option<String>) -> Self {
        Self {
            kind,
            url,
            user_id,
            bin_name: None,
        }
    }

    pub fn kind(&self) -> RemoteKind {
        self.kind
    }
}

/// Secrets for the remote. The `Debug` output never shows their values.
#[derive(Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub(crate) struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_token: Option<String>,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    /// Combines the credentials file with the environment; a non-empty `env_access_key` wins.
    fn resolve(file: Option<Credentials>, env_access_key: Option<String>) -> Self {
        let mut credentials = file.unwrap_or_default();
        if let Some(key) = env_access_key.filter(|k| !k.is_empty()) {
            credentials.access_key = Some(key);
        }
        credentials
    }

    pub(crate) fn access_key(&self) -> Option<&str> {
        self.access_key.as_deref().filter(|k| !k.is_empty())
    }

    pub(crate) fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$LEDGER_HOME` and from there it loads `$LEDGER_HOME/config.json`. It provides
/// paths to other items that are expected in a certain location within the ledger home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    backups: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
    credentials: Credentials,
}

impl Config {
    /// Creates the ledger home directory, its subdirectories, an initial `config.json` and the
    /// local cache.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the ledger home, e.g. `$HOME/ledger`
    /// - `remote` - Where the ledger is mirrored to
    /// - `credentials_file` - Optional JSON file with `access_key` and/or `id_token`. It is copied
    ///   into `.secrets/credentials.json` with owner-only permissions.
    ///
    /// # Errors
    /// - Returns an error if any file operations fail.
    pub async fn create(
        dir: impl Into<PathBuf>,
        remote: RemoteSettings,
        credentials_file: Option<&Path>,
    ) -> Result<Self> {
        create(dir.into(), remote, credentials_file)
            .await
            .pub_result(ErrorType::Config)
    }

    /// This will
    /// - validate that the `ledger_home` exists and that the config file exists
    /// - load the config file and the credentials
    /// - validate that the backups and secrets directories exist
    /// - open the local cache
    pub async fn load(ledger_home: impl Into<PathBuf>) -> Result<Self> {
        load(ledger_home.into())
            .await
            .pub_result(ErrorType::Config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub fn backups(&self) -> &Path {
        &self.backups
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn backup_copies(&self) -> u32 {
        self.config_file.backup_copies
    }

    /// How often `watch` re-pushes the ledger.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.config_file.sync_interval_secs.max(1))
    }

    pub fn remote_kind(&self) -> RemoteKind {
        self.config_file.remote.kind
    }

    /// The base URL of the remote. The bin remote falls back to the public JSONBin API.
    pub(crate) fn remote_url(&self) -> Result<Url> {
        let raw = match (&self.config_file.remote.url, self.remote_kind()) {
            (Some(url), _) => url.as_str(),
            (None, RemoteKind::Bin) => DEFAULT_BIN_URL,
            (None, kind) => {
                return Err(crate::Error::msg(
                    ErrorType::Config,
                    format!("The '{kind}' remote requires remote.url in config.json"),
                ))
            }
        };
        Url::parse(raw)
            .with_context(|| format!("Invalid remote URL '{raw}'"))
            .pub_result(ErrorType::Config)
    }

    /// The identity remote data is stored under: the configured user id, or the ledger home path.
    pub(crate) fn remote_identity(&self) -> String {
        self.config_file
            .remote
            .user_id
            .clone()
            .unwrap_or_else(|| self.root.display().to_string())
    }

    pub(crate) fn bin_name(&self) -> String {
        self.config_file
            .remote
            .bin_name
            .clone()
            .unwrap_or_else(|| DEFAULT_BIN_NAME.to_string())
    }

    pub(crate) fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Creates a new `Backup` instance for managing backup files.
    pub fn backup(&self) -> Backup {
        Backup::new(self)
    }

    fn credentials_path(&self) -> PathBuf {
        self.secrets.join(CREDENTIALS_JSON)
    }
}

async fn create(
    maybe_relative: PathBuf,
    remote: RemoteSettings,
    credentials_file: Option<&Path>,
) -> Res<Config> {
    utils::make_dir(&maybe_relative)
        .await
        .context("Unable to create the ledger home directory")?;
    let root = utils::canonicalize(&maybe_relative).await?;

    let backups = root.join(BACKUPS);
    utils::make_dir(&backups).await?;
    let secrets = root.join(SECRETS);
    utils::make_dir(&secrets).await?;

    let credentials_path = secrets.join(CREDENTIALS_JSON);
    if let Some(source) = credentials_file {
        let parsed: Credentials = utils::deserialize(source)
            .await
            .context("The credentials file must be JSON with access_key and/or id_token")?;
        let data = serde_json::to_string_pretty(&parsed).context("Unable to serialize credentials")?;
        utils::write(&credentials_path, data).await?;
        utils::restrict_permissions(&credentials_path)?;
    }

    let config_path = root.join(CONFIG_JSON);
    let config_file = ConfigFile {
        remote,
        ..ConfigFile::default()
    };
    config_file.save(&config_path).await?;

    let sqlite_path = root.join(LEDGER_SQLITE);
    let db = Db::init(&sqlite_path)
        .await
        .context("Unable to create SQLite DB")?;

    let credentials = read_credentials(&credentials_path).await?;
    Ok(Config {
        root,
        backups,
        secrets,
        config_path,
        config_file,
        db,
        sqlite_path,
        credentials,
    })
}

async fn load(maybe_relative: PathBuf) -> Res<Config> {
    let root = utils::canonicalize(&maybe_relative)
        .await
        .context("Ledger Home is missing, run 'ledger init' first")?;

    let config_path = root.join(CONFIG_JSON);
    if !config_path.is_file() {
        bail!("The config file is missing '{}'", config_path.display())
    }
    let config_file = ConfigFile::load(&config_path).await?;

    let backups = root.join(BACKUPS);
    if !backups.is_dir() {
        bail!("The backups directory is missing '{}'", backups.display())
    }
    let secrets = root.join(SECRETS);
    if !secrets.is_dir() {
        bail!("The secrets directory is missing '{}'", secrets.display())
    }

    let sqlite_path = root.join(LEDGER_SQLITE);
    let db = Db::load(&sqlite_path)
        .await
        .context("Unable to load SQLite DB")?;

    let credentials = read_credentials(&secrets.join(CREDENTIALS_JSON)).await?;
    let config = Config {
        root,
        backups,
        secrets,
        config_path,
        config_file,
        db,
        sqlite_path,
        credentials,
    };
    debug!(
        "Loaded config from {} with remote '{}'",
        config.config_path.display(),
        config.remote_kind()
    );
    if config.remote_kind() != RemoteKind::None && !config.credentials_path().is_file() {
        debug!("No credentials file at {}", config.credentials_path().display());
    }
    Ok(config)
}

async fn read_credentials(path: &Path) -> Res<Credentials> {
    let file = if path.is_file() {
        Some(utils::deserialize(path).await?)
    } else {
        None
    };
    let env_key = std::env::var(ACCESS_KEY_ENV).ok();
    if env_key.as_deref().is_some_and(|k| !k.is_empty()) {
        debug!("Using the access key from {ACCESS_KEY_ENV}");
    }
    Ok(Credentials::resolve(file, env_key))
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "ledger",
///   "config_version": 1,
///   "backup_copies": 5,
///   "sync_interval_secs": 30,
///   "remote": {
///     "kind": "bin",
///     "url": "https://api.jsonbin.io/v3/"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "ledger"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// Number of backup copies to keep
    backup_copies: u32,

    /// Seconds between periodic pushes
    #[serde(default = "default_sync_interval_secs")]
    sync_interval_secs: u64,

    #[serde(default)]
    remote: RemoteSettings,
}

fn default_sync_interval_secs() -> u64 {
    SYNC_INTERVAL_SECS
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            backup_copies: BACKUP_COPIES,
            sync_interval_secs: SYNC_INTERVAL_SECS,
            remote: RemoteSettings::default(),
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if it belongs to another app.
    async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;
        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        if config.config_version > CONFIG_VERSION {
            warn!(
                "config.json has version {} but this program knows version {CONFIG_VERSION}",
                config.config_version
            );
        }
        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    async fn save(&self, path: impl AsRef<Path>) -> Res<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_create() {
        let dir = TempDir::new().unwrap();
        let home_dir = dir.path().join("ledger_home");
        let credentials_source = dir.path().join("creds.json");
        utils::write(&credentials_source, r#"{"access_key":"k-123"}"#)
            .await
            .unwrap();

        let remote = RemoteSettings::new(RemoteKind::Bin, None, None);
        let config = Config::create(&home_dir, remote, Some(&credentials_source))
            .await
            .unwrap();

        assert_eq!(config.remote_kind(), RemoteKind::Bin);
        assert_eq!(config.remote_url().unwrap().as_str(), DEFAULT_BIN_URL);
        assert_eq!(config.sync_interval(), Duration::from_secs(30));
        assert!(config.backups().is_dir());
        assert!(config.secrets().is_dir());
        assert!(config.sqlite_path().is_file());

        let stored: Credentials = utils::deserialize(&config.credentials_path())
            .await
            .unwrap();
        assert_eq!(stored.access_key(), Some("k-123"));
    }

    #[tokio::test]
    async fn test_config_load() {
        let dir = TempDir::new().unwrap();
        let remote = RemoteSettings::new(
            RemoteKind::Documents,
            Some("https://docs.example.com/api".to_string()),
            Some("alice".to_string()),
        );
        let created = Config::create(dir.path(), remote, None).await.unwrap();
        let loaded = Config::load(dir.path()).await.unwrap();
        assert_eq!(created.config_file, loaded.config_file);
        assert_eq!(loaded.remote_identity(), "alice");
        assert_eq!(
            loaded.remote_url().unwrap().as_str(),
            "https://docs.example.com/api"
        );
    }

    #[tokio::test]
    async fn test_config_load_missing_home() {
        let dir = TempDir::new().unwrap();
        let e = Config::load(dir.path().join("nope")).await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Config);
    }

    #[tokio::test]
    async fn test_documents_remote_requires_url() {
        let dir = TempDir::new().unwrap();
        let remote = RemoteSettings::new(RemoteKind::Documents, None, Some("bob".to_string()));
        let config = Config::create(dir.path(), remote, None).await.unwrap();
        assert_eq!(
            config.remote_url().unwrap_err().error_type(),
            ErrorType::Config
        );
    }

    #[test]
    fn test_config_file_default() {
        let config = ConfigFile::default();
        assert_eq!(config.app_name, "ledger");
        assert_eq!(config.backup_copies, 5);
        assert_eq!(config.sync_interval_secs, 30);
        assert_eq!(config.remote.kind(), RemoteKind::None);
    }

    #[tokio::test]
    async fn test_config_file_load_with_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "ledger",
            "config_version": 1,
            "backup_copies": 3
        }"#;
        utils::write(&config_path, json).await.unwrap();

        let config = ConfigFile::load(&config_path).await.unwrap();
        assert_eq!(config.backup_copies, 3);
        assert_eq!(config.sync_interval_secs, 30);
        assert_eq!(config.remote, RemoteSettings::default());
    }

    #[tokio::test]
    async fn test_config_file_load_invalid_app_name() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let json = r#"{
            "app_name": "budget",
            "config_version": 1,
            "backup_copies": 5
        }"#;
        utils::write(&config_path, json).await.unwrap();

        let result = ConfigFile::load(&config_path).await;
        assert!(result.unwrap_err().to_string().contains("Invalid app_name"));
    }

    #[test]
    fn test_config_file_serialization_omits_none_fields() {
        let json = serde_json::to_string(&ConfigFile::default()).unwrap();
        assert!(!json.contains("url"));
        assert!(!json.contains("user_id"));
        assert!(!json.contains("bin_name"));
    }

    #[test]
    fn test_env_access_key_wins() {
        let file = Credentials {
            access_key: Some("from-file".to_string()),
            id_token: Some("tok".to_string()),
        };
        let c = Credentials::resolve(Some(file.clone()), Some("from-env".to_string()));
        assert_eq!(c.access_key(), Some("from-env"));
        assert_eq!(c.id_token(), Some("tok"));

        let c = Credentials::resolve(Some(file), Some(String::new()));
        assert_eq!(c.access_key(), Some("from-file"));

        let c = Credentials::resolve(None, None);
        assert_eq!(c.access_key(), None);
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let c = Credentials::resolve(None, Some("super-secret".to_string()));
        let s = format!("{c:?}");
        assert!(!s.contains("super-secret"), "{s}");
    }
}
