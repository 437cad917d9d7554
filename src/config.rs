//! Foldvault configuration file handling
//!
//! Operator settings (paths, chunking, worker and retry tuning, logging) in
//! TOML. A commented default file is generated on first run next to the
//! database.
//!
//! Durations are written in `humantime` form (`"10ms"`, `"5m"`).

use crate::controller::ControllerConfig;
use crate::persistence::DEFAULT_CHUNK_SIZE;
use crate::worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Database file name inside the data directory
const DATABASE_FILE: &str = "foldvault.db";

/// Foldvault configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderConfig {
    /// Where fold records and parameter chunks live
    pub storage: StorageConfig,

    #[serde(default)]
    pub parameters: ParametersConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database
    pub database_path: PathBuf,
}

/// Parameter import configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametersConfig {
    /// Bytes per chunk when importing a parameter blob
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ParametersConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl FolderConfig {
    /// Create a configuration with defaults for the given database path
    pub fn new(database_path: PathBuf) -> Self {
        Self {
            storage: StorageConfig { database_path },
            parameters: ParametersConfig::default(),
            worker: WorkerConfig::default(),
            controller: ControllerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: FolderConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Load the file at `path`, writing the default one first if it is missing
    pub fn load_or_create(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            let database_path = path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(DATABASE_FILE);
            Self::create_default(path, &database_path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
        }
        Self::load(path)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file '{}': {}", path.display(), e))?;

        Ok(())
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(database_path: &Path) -> String {
        format!(
            r#"# Foldvault Configuration
#
# Operator settings for the local proof accumulator. Fold records and
# proving parameters live in the SQLite database below; this file only
# tunes how they are stored and processed.

[storage]
# SQLite database holding parameter chunks and fold records
database_path = "{database_path}"

[parameters]
# Bytes per chunk when importing a parameter blob
chunk_size = {chunk_size}

[worker]
# Engine jobs allowed to run at once (one per category is plenty)
max_concurrent_jobs = 3

[controller]
# Parameter Store key the proving parameters are stored under
parameter_purpose = "membership"

# Attempts per operation before a write conflict is reported as contention
max_fold_attempts = 5

# Backoff before the first retry, doubled per attempt up to the cap
retry_backoff = "10ms"
max_retry_backoff = "1s"

# Give up waiting on a single operation after this long (optional)
# An operation that already started still completes in the background.
# operation_timeout = "5m"

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/foldvault/foldvault.log"
"#,
            database_path = database_path.display(),
            chunk_size = DEFAULT_CHUNK_SIZE,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        database_path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(database_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }
}

/// Get the default data directory
///
/// - Linux: ~/.local/share/foldvault/
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("foldvault")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

/// Serde helpers for `Duration` fields written as `humantime` strings.
pub mod duration_format {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Like [`duration_format`], for optional durations.
pub mod option_duration_format {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => humantime::parse_duration(&text)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
