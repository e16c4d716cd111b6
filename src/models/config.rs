use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_API_BASE: &str = "http://localhost:5000/v1";
pub const DEFAULT_API_KEY: &str = "Dummy api key";
pub const DEFAULT_STORE_URL: &str = "postgres://localhost:5432/postgres";
pub const DEFAULT_DATABASE: &str = "Gen_AI";
pub const DEFAULT_EMBEDDING_COLLECTION: &str = "Embedings";
pub const DEFAULT_RESPONSE_COLLECTION: &str = "Results";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_RESPONSE_MODEL: &str = "deepseek/deepseek-r1-0528-qwen3-8b";
pub const DEFAULT_BATCH_SIZE: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub models: ModelConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Values supplied on the command line or through the environment.
/// Each `Some` replaces the value loaded from the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub store_url: Option<String>,
    pub database: Option<String>,
    pub embedding_collection: Option<String>,
    pub response_collection: Option<String>,
    pub embedding_model: Option<String>,
    pub response_model: Option<String>,
    pub batch_size: Option<usize>,
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("embedflow").join("config.toml"))
    }

    /// Load the global config file, falling back to defaults when it does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit path when given, otherwise from the global config file.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        let ConfigOverrides {
            api_base,
            api_key,
            store_url,
            database,
            embedding_collection,
            response_collection,
            embedding_model,
            response_model,
            batch_size,
        } = overrides;

        if let Some(v) = api_base {
            self.api.base_url = v;
        }
        if let Some(v) = api_key {
            self.api.api_key = v;
        }
        if let Some(v) = store_url {
            self.store.url = v;
        }
        if let Some(v) = database {
            self.store.database = v;
        }
        if let Some(v) = embedding_collection {
            self.store.embedding_collection = v;
        }
        if let Some(v) = response_collection {
            self.store.response_collection = v;
        }
        if let Some(v) = embedding_model {
            self.models.embedding = v;
        }
        if let Some(v) = response_model {
            self.models.response = v;
        }
        if let Some(v) = batch_size {
            self.pipeline.batch_size = v;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = &self.api.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "api.base_url must start with http:// or https://, got '{}'",
                base
            )));
        }

        StoreDriver::from_url(&self.store.url)?;

        for (name, value) in [
            ("store.database", &self.store.database),
            ("store.embedding_collection", &self.store.embedding_collection),
            ("store.response_collection", &self.store.response_collection),
        ] {
            if !is_identifier(value) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be a non-empty name of letters, digits and underscores, got '{}'",
                    name, value
                )));
            }
        }

        if self.store.embedding_collection == self.store.response_collection {
            return Err(ConfigError::ValidationError(
                "embedding and response collections must differ".to_string(),
            ));
        }

        if self.models.embedding.trim().is_empty() || self.models.response.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "model names must not be empty".to_string(),
            ));
        }

        if self.pipeline.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.batch_size must be a positive integer".to_string(),
            ));
        }

        if self.pipeline.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_attempts must be a positive integer".to_string(),
            ));
        }

        Ok(())
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,

    #[serde(default = "default_api_key")]
    pub api_key: String,

    #[serde(default = "default_embedding_timeout")]
    pub embedding_timeout_secs: u64,

    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_api_key() -> String {
    DEFAULT_API_KEY.to_string()
}

fn default_embedding_timeout() -> u64 {
    120
}

fn default_response_timeout() -> u64 {
    900
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            api_key: default_api_key(),
            embedding_timeout_secs: default_embedding_timeout(),
            response_timeout_secs: default_response_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_embedding_model")]
    pub embedding: String,

    #[serde(default = "default_response_model")]
    pub response: String,
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_response_model() -> String {
    DEFAULT_RESPONSE_MODEL.to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            embedding: default_embedding_model(),
            response: default_response_model(),
        }
    }
}

/// Document store backend, selected by the scheme of the store URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDriver {
    PostgreSQL,
    Sqlite,
}

impl StoreDriver {
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(StoreDriver::PostgreSQL)
        } else if url.starts_with("sqlite:") {
            Ok(StoreDriver::Sqlite)
        } else {
            Err(ConfigError::ValidationError(format!(
                "store.url must start with postgres://, postgresql:// or sqlite:, got '{}'",
                url
            )))
        }
    }
}

impl std::fmt::Display for StoreDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreDriver::PostgreSQL => write!(f, "postgresql"),
            StoreDriver::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_embedding_collection")]
    pub embedding_collection: String,

    #[serde(default = "default_response_collection")]
    pub response_collection: String,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,

    #[serde(default = "default_pool_acquire_timeout")]
    pub pool_acquire_timeout: u32,
}

fn default_store_url() -> String {
    DEFAULT_STORE_URL.to_string()
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_embedding_collection() -> String {
    DEFAULT_EMBEDDING_COLLECTION.to_string()
}

fn default_response_collection() -> String {
    DEFAULT_RESPONSE_COLLECTION.to_string()
}

fn default_pool_max() -> u32 {
    4
}

fn default_pool_acquire_timeout() -> u32 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            database: default_database(),
            embedding_collection: default_embedding_collection(),
            response_collection: default_response_collection(),
            pool_max: default_pool_max(),
            pool_acquire_timeout: default_pool_acquire_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn driver(&self) -> Result<StoreDriver, ConfigError> {
        StoreDriver::from_url(&self.url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_batch_pause_ms() -> u64 {
    50
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            batch_pause_ms: default_batch_pause_ms(),
        }
    }
}
