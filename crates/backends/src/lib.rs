/// Generation backends
///
/// Concrete `GenerationService`s for the studio:
/// - Gemini API (Veo long-running operations)
/// - Scripted mock (no network)
pub mod config;
pub mod credentials;
pub mod gemini;

use anyhow::Result;
use std::sync::Arc;
use studio_core::mock::MockGenerationService;
use studio_core::GenerationService;
use tracing::info;

pub use config::{BackendConfig, BackendType};
pub use credentials::{ApiKeyStore, KeyPrompter, KeyStoreAuthority};
pub use gemini::GeminiVeoBackend;

/// Backend factory for creating backend instances
pub struct BackendFactory;

impl BackendFactory {
    /// Create backend from config. `keys` is read at request time, so it
    /// can be shared with a credential authority.
    pub fn create(config: &BackendConfig, keys: ApiKeyStore) -> Result<Arc<dyn GenerationService>> {
        info!(backend = %config.backend_type, "creating generation backend");
        match config.backend_type {
            BackendType::Gemini => Ok(Arc::new(GeminiVeoBackend::new(config, keys)?)),
            BackendType::Mock => Ok(Arc::new(MockGenerationService::new())),
        }
    }

    /// Key store seeded from the config or `GEMINI_API_KEY`.
    pub fn key_store(config: &BackendConfig) -> ApiKeyStore {
        ApiKeyStore::new(config.resolved_api_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_each_backend() {
        let mock = BackendFactory::create(
            &BackendConfig::new(BackendType::Mock),
            ApiKeyStore::default(),
        )
        .unwrap();
        assert_eq!(mock.name(), "mock");

        let gemini = BackendFactory::create(
            &BackendConfig::new(BackendType::Gemini),
            ApiKeyStore::default(),
        )
        .unwrap();
        assert_eq!(gemini.name(), "gemini");
    }

    #[test]
    fn test_factory_rejects_blank_url() {
        let config = BackendConfig::new(BackendType::Gemini).with_api_url(" ");
        assert!(BackendFactory::create(&config, ApiKeyStore::default()).is_err());
    }

    #[test]
    fn test_key_store_prefers_config_key() {
        let config = BackendConfig::default().with_api_key("from-config");
        assert_eq!(
            BackendFactory::key_store(&config).get().as_deref(),
            Some("from-config")
        );
    }
}
