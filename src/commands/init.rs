use crate::args::InitArgs;
use crate::commands::Out;
use crate::config::{RemoteKind, RemoteSettings};
use crate::{Config, Result};
use std::path::Path;

/// Creates the ledger home directory, its subdirectories and:
/// - Creates an initial `config.json` file with the chosen remote and default settings
/// - Copies the credentials file, if given, into `.secrets/credentials.json`
/// - Creates the local cache
///
/// # Arguments
/// - `ledger_home` - The directory that will be the ledger home, e.g. `$HOME/ledger`
/// - `args` - The remote settings and the optional credentials file
///
/// # Errors
/// - Returns an error if any file operations fail.
pub async fn init(ledger_home: &Path, args: &InitArgs) -> Result<Out<()>> {
    let settings = RemoteSettings::new(
        args.remote(),
        args.remote_url().map(str::to_string),
        args.user_id().map(str::to_string),
    );
    let config = Config::create(ledger_home, settings, args.credentials()).await?;
    let message = match config.remote_kind() {
        RemoteKind::None => format!(
            "Created the ledger in {}. Data is kept locally only",
            config.root().display()
        ),
        kind => format!(
            "Created the ledger in {} with the '{kind}' remote",
            config.root().display()
        ),
    };
    Ok(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_local_only() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("ledger");
        let args = InitArgs::new(RemoteKind::None, None, None, None);
        let out = init(&home, &args).await.unwrap();
        assert!(out.message().contains("locally only"));
        assert!(home.join("config.json").is_file());
        assert!(home.join("ledger.sqlite").is_file());

        let config = Config::load(&home).await.unwrap();
        assert_eq!(config.remote_kind(), RemoteKind::None);
    }

    #[tokio::test]
    async fn test_init_copies_credentials() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("ledger");
        let credentials = dir.path().join("creds.json");
        std::fs::write(&credentials, r#"{"access_key": "k-123"}"#).unwrap();

        let args = InitArgs::new(RemoteKind::Bin, None, None, Some(credentials));
        let out = init(&home, &args).await.unwrap();
        assert!(out.message().contains("'bin' remote"));
        assert!(home.join(".secrets").join("credentials.json").is_file());

        let config = Config::load(&home).await.unwrap();
        assert_eq!(config.remote_kind(), RemoteKind::Bin);
    }

    #[tokio::test]
    async fn test_init_rejects_bad_credentials() {
        let dir = TempDir::new().unwrap();
        let credentials = dir.path().join("creds.json");
        std::fs::write(&credentials, "not json").unwrap();

        let args = InitArgs::new(RemoteKind::Bin, None, None, Some(credentials));
        let err = init(&dir.path().join("ledger"), &args).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Config);
    }
}
