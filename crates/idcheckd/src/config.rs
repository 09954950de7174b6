use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{key}: unknown storage backend {value:?} (expected \"azure\" or \"local\")")]
    UnknownBackend { key: &'static str, value: String },
}

/// Where submitted images are stored.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    Azure { connection_string: String },
    Local { root: PathBuf },
}

impl StorageBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::Azure { .. } => "azure",
            StorageBackend::Local { .. } => "local",
        }
    }
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address (default: 127.0.0.1:8080).
    pub listen_addr: String,
    /// Azure AI Vision resource endpoint.
    pub vision_endpoint: String,
    /// Azure AI Vision subscription key.
    pub vision_key: String,
    pub storage: StorageBackend,
    /// Blob container (or directory) holding submitted images.
    pub container: String,
    /// Path to the SQLite attempt database.
    pub db_path: PathBuf,
    /// How long SQLite waits on a locked database before failing.
    pub db_busy_timeout_secs: u64,
    /// Timeout applied to every collaborator call.
    pub call_timeout_secs: u64,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from `IDCHECK_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("idcheck");

        let vision_endpoint = var("IDCHECK_VISION_ENDPOINT")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("IDCHECK_VISION_ENDPOINT"))?;
        let vision_key = var("IDCHECK_VISION_KEY")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("IDCHECK_VISION_KEY"))?;

        let storage = match var("IDCHECK_STORAGE_BACKEND").as_deref().unwrap_or("local") {
            "azure" => StorageBackend::Azure {
                connection_string: var("IDCHECK_STORAGE_CONNECTION_STRING")
                    .filter(|v| !v.is_empty())
                    .ok_or(ConfigError::Missing("IDCHECK_STORAGE_CONNECTION_STRING"))?,
            },
            "local" => StorageBackend::Local {
                root: var("IDCHECK_STORAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir.join("blobs")),
            },
            other => {
                return Err(ConfigError::UnknownBackend {
                    key: "IDCHECK_STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            listen_addr: var("IDCHECK_LISTEN").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            vision_endpoint,
            vision_key,
            storage,
            container: var("IDCHECK_STORAGE_CONTAINER")
                .unwrap_or_else(|| "verification-images".to_string()),
            db_path: var("IDCHECK_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("attempts.db")),
            db_busy_timeout_secs: parsed(&var, "IDCHECK_DB_BUSY_TIMEOUT_SECS", 30),
            call_timeout_secs: nonzero(&var, "IDCHECK_CALL_TIMEOUT_SECS", 30),
            // Two 10 MiB images, base64-encoded, plus JSON framing.
            max_body_bytes: nonzero(&var, "IDCHECK_MAX_BODY_BYTES", 28 * 1024 * 1024),
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn db_busy_timeout(&self) -> Duration {
        Duration::from_secs(self.db_busy_timeout_secs)
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Like [`parsed`], but zero also falls back to the default.
fn nonzero<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Default + PartialEq,
{
    var(key)
        .and_then(|v| v.parse().ok())
        .filter(|v: &T| *v != T::default())
        .unwrap_or(default)
}
