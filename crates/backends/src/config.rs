/// Backend configuration
///
/// Which generation service to talk to, where it lives, which models map
/// to which engine, and where finished clips land on disk. Stored as
/// pretty JSON; every field has a default so partial files load.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use studio_core::Engine;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_FAST_MODEL: &str = "veo-3.1-fast-generate-preview";
pub const DEFAULT_STANDARD_MODEL: &str = "veo-3.1-generate-preview";

/// Backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Gemini API long-running video generation
    #[default]
    Gemini,
    /// Scripted in-memory service, nothing leaves the process
    Mock,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for BackendType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "mock" => Ok(Self::Mock),
            other => anyhow::bail!("unknown backend '{other}' (expected gemini or mock)"),
        }
    }
}

/// Backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend type
    pub backend_type: BackendType,

    /// API endpoint URL
    pub api_url: String,

    /// API key. Falls back to `GEMINI_API_KEY` when unset.
    pub api_key: Option<String>,

    /// Model used for the fast engine
    pub fast_model: String,

    /// Model used for the standard engine
    pub standard_model: String,

    /// Where downloaded clips are written
    pub output_dir: PathBuf,

    /// Delay between operation polls
    pub poll_interval_secs: u64,

    /// Overall deadline for one generation, submit to download
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: BackendType::Gemini,
            api_url: GEMINI_API_BASE.to_string(),
            api_key: None,
            fast_model: DEFAULT_FAST_MODEL.to_string(),
            standard_model: DEFAULT_STANDARD_MODEL.to_string(),
            output_dir: default_output_dir(),
            poll_interval_secs: 10,
            timeout_secs: 600,
        }
    }
}

impl BackendConfig {
    /// Create new backend config
    pub fn new(backend_type: BackendType) -> Self {
        Self {
            backend_type,
            ..Self::default()
        }
    }

    /// With API endpoint
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// With API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// With output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// With poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// With timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Model name for an engine.
    pub fn model_for(&self, engine: Engine) -> &str {
        match engine {
            Engine::Fast => &self.fast_model,
            Engine::Standard => &self.standard_model,
        }
    }

    /// The configured key, or the environment's. Blank keys count as unset.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Load configuration from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config = serde_json::from_str(&json)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }
}

pub fn default_output_dir() -> PathBuf {
    let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    base.join("veo-studio")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_config() {
        let config = BackendConfig::new(BackendType::Mock)
            .with_api_url("http://localhost:8080")
            .with_output_dir("/tmp/clips")
            .with_poll_interval(1)
            .with_timeout(30);

        assert_eq!(config.backend_type, BackendType::Mock);
        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.output_dir, PathBuf::from("/tmp/clips"));
        assert_eq!(config.poll_interval_secs, 1);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_backend_type_display() {
        assert_eq!(BackendType::Gemini.to_string(), "gemini");
        assert_eq!(BackendType::Mock.to_string(), "mock");
        assert_eq!("Mock".parse::<BackendType>().unwrap(), BackendType::Mock);
        assert!("replicate".parse::<BackendType>().is_err());
    }

    #[test]
    fn test_model_for_engine() {
        let config = BackendConfig::default();
        assert_eq!(config.model_for(Engine::Fast), DEFAULT_FAST_MODEL);
        assert_eq!(config.model_for(Engine::Standard), DEFAULT_STANDARD_MODEL);
    }

    #[test]
    fn test_explicit_key_wins_and_blank_is_unset() {
        let config = BackendConfig::default().with_api_key("  abc  ");
        assert_eq!(config.resolved_api_key().as_deref(), Some("abc"));

        let blank = BackendConfig::default().with_api_key("   ");
        assert_eq!(blank.resolved_api_key(), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("backend.json");
        let config = BackendConfig::new(BackendType::Mock).with_timeout(42);

        config.save(&path).unwrap();
        assert_eq!(BackendConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: BackendConfig = serde_json::from_str(r#"{"backend_type": "mock"}"#).unwrap();
        assert_eq!(config.backend_type, BackendType::Mock);
        assert_eq!(config.api_url, GEMINI_API_BASE);
        assert_eq!(config.timeout_secs, 600);
    }
}
