//! Account Credentials
//!
//! Read-only lookup of the server domain and bearer token for an account id.
//! Account creation and OAuth live in the frontend; this side only resolves.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::streaming::error::CredentialError;
use crate::streaming::types::{Account, Credentials};

/// File name of the account list inside the app data directory
pub const ACCOUNTS_FILE: &str = "accounts.json";

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, account_id: &str) -> Result<Credentials, CredentialError>;
}

fn credentials_for(account: &Account) -> Result<Credentials, CredentialError> {
    if account.domain.trim().is_empty() || account.access_token.trim().is_empty() {
        return Err(CredentialError::Empty(account.id.clone()));
    }
    Ok(Credentials {
        domain: account.domain.trim().to_string(),
        access_token: account.access_token.trim().to_string(),
    })
}

/// Accounts held in memory, keyed by id
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|account| (account.id.clone(), account))
            .collect();
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    pub async fn insert(&self, account: Account) {
        self.accounts
            .write()
            .await
            .insert(account.id.clone(), account);
    }

    pub async fn remove(&self, account_id: &str) -> Option<Account> {
        self.accounts.write().await.remove(account_id)
    }
}

#[async_trait]
impl CredentialResolver for InMemoryAccountStore {
    async fn resolve(&self, account_id: &str) -> Result<Credentials, CredentialError> {
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(account_id)
            .ok_or_else(|| CredentialError::NotFound(account_id.to_string()))?;
        credentials_for(account)
    }
}

/// Accounts stored as a JSON array in a file. The file is read on every
/// lookup so edits made by the frontend are picked up without a restart.
#[derive(Debug, Clone)]
pub struct JsonAccountStore {
    path: PathBuf,
}

impl JsonAccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<data_dir>/accounts.json`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(ACCOUNTS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored accounts; a missing file means none
    pub async fn load(&self) -> Result<Vec<Account>, CredentialError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CredentialError::Store(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&contents).map_err(|e| {
            CredentialError::Store(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl CredentialResolver for JsonAccountStore {
    async fn resolve(&self, account_id: &str) -> Result<Credentials, CredentialError> {
        let accounts = self.load().await?;
        let account = accounts
            .iter()
            .find(|account| account.id == account_id)
            .ok_or_else(|| CredentialError::NotFound(account_id.to_string()))?;
        credentials_for(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_resolve() {
        let store = InMemoryAccountStore::with_accounts([Account::new(
            "1",
            "example.social",
            "tok1",
        )]);

        let credentials = store.resolve("1").await.expect("resolves");
        assert_eq!(credentials.domain, "example.social");
        assert_eq!(credentials.access_token, "tok1");

        assert_eq!(
            store.resolve("2").await,
            Err(CredentialError::NotFound("2".to_string()))
        );
    }

    #[tokio::test]
    async fn test_blank_fields_are_empty_credentials() {
        let store = InMemoryAccountStore::new();
        store.insert(Account::new("1", "example.social", "  ")).await;
        store.insert(Account::new("2", "", "tok")).await;

        assert_eq!(
            store.resolve("1").await,
            Err(CredentialError::Empty("1".to_string()))
        );
        assert_eq!(
            store.resolve("2").await,
            Err(CredentialError::Empty("2".to_string()))
        );
    }

    #[tokio::test]
    async fn test_removed_account_is_not_found() {
        let store = InMemoryAccountStore::with_accounts([Account::new("1", "a.example", "t")]);
        assert!(store.remove("1").await.is_some());
        assert!(matches!(
            store.resolve("1").await,
            Err(CredentialError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_json_store_reads_accounts_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonAccountStore::in_dir(dir.path());
        std::fs::write(
            store.path(),
            r#"[{"_id":"abc","domain":"example.social","accessToken":"tok1"},
                {"id":"def","domain":"other.example","accessToken":""}]"#,
        )
        .expect("write accounts");

        let credentials = store.resolve("abc").await.expect("resolves");
        assert_eq!(credentials.domain, "example.social");
        assert_eq!(
            store.resolve("def").await,
            Err(CredentialError::Empty("def".to_string()))
        );
        assert_eq!(
            store.resolve("zzz").await,
            Err(CredentialError::NotFound("zzz".to_string()))
        );
    }

    #[tokio::test]
    async fn test_json_store_missing_file_has_no_accounts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonAccountStore::in_dir(dir.path());
        assert!(store.load().await.expect("loads").is_empty());
        assert!(matches!(
            store.resolve("abc").await,
            Err(CredentialError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_json_store_corrupt_file_is_store_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonAccountStore::in_dir(dir.path());
        std::fs::write(store.path(), "{not an array").expect("write");
        assert!(matches!(
            store.resolve("abc").await,
            Err(CredentialError::Store(_))
        ));
    }
}
