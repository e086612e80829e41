/// API-key selection for the Gemini backend.
///
/// The backend reads the key from a shared store at request time, so a key
/// picked after a failed attempt is used by the retry without rebuilding
/// the service.
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use studio_core::CredentialAuthority;
use tracing::{debug, info};

/// Shared, swappable API key.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    key: Arc<RwLock<Option<String>>>,
}

impl ApiKeyStore {
    pub fn new(key: Option<String>) -> Self {
        let store = Self::default();
        if let Some(key) = key {
            store.set(key);
        }
        store
    }

    pub fn get(&self) -> Option<String> {
        self.key.read().clone()
    }

    /// Blank keys clear the store.
    pub fn set(&self, key: impl Into<String>) {
        let key = key.into().trim().to_string();
        *self.key.write() = (!key.is_empty()).then_some(key);
    }

    pub fn clear(&self) {
        *self.key.write() = None;
    }

    pub fn is_set(&self) -> bool {
        self.key.read().is_some()
    }
}

/// Where a replacement key comes from (a terminal prompt, a dialog, ...).
#[async_trait]
pub trait KeyPrompter: Send + Sync {
    /// `None` when the user declined to enter one.
    async fn prompt_for_key(&self) -> Result<Option<String>>;
}

/// Credential authority backed by the key store. "Selecting" a credential
/// means asking the prompter for a key.
pub struct KeyStoreAuthority {
    keys: ApiKeyStore,
    prompter: Arc<dyn KeyPrompter>,
}

impl KeyStoreAuthority {
    pub fn new(keys: ApiKeyStore, prompter: Arc<dyn KeyPrompter>) -> Self {
        Self { keys, prompter }
    }
}

#[async_trait]
impl CredentialAuthority for KeyStoreAuthority {
    async fn has_selected_credential(&self) -> Result<bool> {
        Ok(self.keys.is_set())
    }

    async fn open_selection_ui(&self) -> Result<()> {
        match self.prompter.prompt_for_key().await? {
            Some(key) => {
                self.keys.set(key);
                info!(selected = self.keys.is_set(), "api key updated");
            }
            None => debug!("key selection dismissed"),
        }
        Ok(())
    }
}
