use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Upload secret used when `UPLOAD_KEY` is not set.
pub const DEFAULT_UPLOAD_KEY: &str = "Free-Uploading-tickles.dev";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    /// Static secret every upload must present as `uploadKey`
    pub upload_key: String,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
}

/// How the file index survives restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    /// Nothing persisted; blobs on disk become orphans after a restart.
    Memory,
    /// `metadata.json` in the storage root, rewritten on every mutation.
    Snapshot,
    /// `index.redb` in the storage root.
    Redb,
}

impl IndexBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "memory" => Some(IndexBackend::Memory),
            "snapshot" | "json" => Some(IndexBackend::Snapshot),
            "redb" => Some(IndexBackend::Redb),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Blob root; thumbnails and in-flight uploads live in subdirectories
    pub root: String,
    pub index: IndexBackend,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: "./uploads".to_string(),
            index: IndexBackend::Snapshot,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5000".to_string());

        let root = std::env::var("STORAGE_DIR").unwrap_or_else(|_| "./uploads".to_string());

        let index = match std::env::var("INDEX_PERSISTENCE") {
            Ok(value) => IndexBackend::parse(&value).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "INDEX_PERSISTENCE must be one of memory, snapshot, redb (got '{value}')"
                ))
            })?,
            Err(_) => IndexBackend::Snapshot,
        };

        let upload_key =
            std::env::var("UPLOAD_KEY").unwrap_or_else(|_| DEFAULT_UPLOAD_KEY.to_string());

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100 * 1024 * 1024); // 100MB

        let config = Config {
            server: ServerConfig { bind_address },
            storage: StorageConfig { root, index },
            upload_key,
            max_upload_size,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.upload_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "UPLOAD_KEY cannot be empty".to_string(),
            ));
        }

        if self.storage.root.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "STORAGE_DIR cannot be empty".to_string(),
            ));
        }

        if self.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.upload_key == DEFAULT_UPLOAD_KEY {
            tracing::warn!("UPLOAD_KEY is not set; the built-in default key is in use");
        }

        Ok(())
    }
}
