//! Account key ownership: long-lived, process-wide
//! state keyed by account id, loaded once and never mutated automatically.
//! Per-certificate keys, by contrast, are owned by a single record and
//! rotated on every successful issuance — see [`crate::crypto`].

use std::collections::HashMap;
use std::sync::Arc;

use instant_acme::{Account, AccountCredentials, ExternalAccountKey, NewAccount};
use tokio::sync::RwLock;

use crate::config::AccountConfig;
use crate::error::{AcmeProtocolError, ConfigError};

use super::client::HttpsClientForAcme;

/// Holds one loaded `instant_acme::Account` per configured account id.
/// `new_account` is idempotent server-side (an already-registered key
/// returns its existing account URL), so loading is safe to repeat on
/// every startup.
pub struct AccountRegistry {
    accounts: RwLock<HashMap<String, Arc<Account>>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self { accounts: RwLock::new(HashMap::new()) }
    }

    /// Returns the loaded account for `account_id`, registering it with
    /// the ACME server on first use if no cached credentials exist yet.
    pub async fn get_or_register(
        &self,
        account_id: &str,
        config: &AccountConfig,
        eab_key: Option<&ExternalAccountKey>,
    ) -> Result<Arc<Account>, AcmeProtocolError> {
        if let Some(account) = self.accounts.read().await.get(account_id) {
            return Ok(account.clone());
        }

        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.get(account_id) {
            return Ok(account.clone());
        }

        let account = self.load_or_create(config, eab_key).await?;
        let account = Arc::new(account);
        accounts.insert(account_id.to_string(), account.clone());
        Ok(account)
    }

    async fn load_or_create(&self, config: &AccountConfig, eab_key: Option<&ExternalAccountKey>) -> Result<Account, AcmeProtocolError> {
        let builder = Account::builder_with_http(Box::new(HttpsClientForAcme::new()));

        if let Ok(credentials_json) = tokio::fs::read(&config.key_path).await {
            if let Ok(credentials) = serde_json::from_slice::<AccountCredentials>(&credentials_json) {
                return builder
                    .from_credentials(credentials)
                    .await
                    .map_err(|e| server_internal(e.to_string()));
            }
        }

        let (account, credentials) = builder
            .create(
                &NewAccount {
                    contact: &config.contact.iter().map(String::as_str).collect::<Vec<_>>(),
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                config.directory.clone(),
                eab_key,
            )
            .await
            .map_err(|e| server_internal(e.to_string()))?;

        if let Some(parent) = config.key_path.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Ok(serialized) = serde_json::to_vec(&credentials) {
            let _ = tokio::fs::write(&config.key_path, serialized).await;
        }

        Ok(account)
    }

    /// Administrative operation, never invoked automatically: discards the
    /// cached credentials and registers a brand-new account key on next
    /// use.
    pub async fn rotate_account_key(&self, account_id: &str, config: &AccountConfig) -> Result<(), ConfigError> {
        self.accounts.write().await.remove(account_id);
        if tokio::fs::remove_file(&config.key_path).await.is_err() {
            // Absence is fine; a stale file that fails to delete for
            // another reason surfaces on the next registration attempt.
        }
        Ok(())
    }
}

impl Default for AccountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn server_internal(detail: String) -> AcmeProtocolError {
    AcmeProtocolError::ServerInternal {
        problem_type: "account".to_string(),
        detail,
    }
}
