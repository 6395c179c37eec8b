//! Application configuration
//!
//! One TOML file, `~/.config/hidbridge/config.toml` unless a path is given on
//! the command line. Every section has defaults, so a missing file or a file
//! that only sets a few keys still yields a complete [`AppConfig`].
//!
//! ```toml
//! mappings_file = "/etc/hidbridge/mappings.toml"
//!
//! [engine]
//! serial_timeout_ms = 100
//! can_timeout_ms = 50
//! serial_payload_limit = 64
//! event_queue_depth = 256
//! stats_interval_secs = 30
//!
//! [storage]
//! path = "/var/lib/hidbridge/mappings.bin"
//!
//! [[serial_ports]]
//! port = 0
//! path = "/dev/ttyAMA0"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = ".config/hidbridge";
const CONFIG_FILE: &str = "config.toml";
const BLOB_FILE: &str = "mappings.bin";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Tunables of the mapping engine and the event pump
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct EngineSettings {
    /// Upper bound for one serial send
    pub serial_timeout_ms: u64,
    /// Upper bound for one CAN send
    pub can_timeout_ms: u64,
    /// Largest serial payload, longer payloads are truncated
    pub serial_payload_limit: usize,
    /// Capacity of the channel between event sources and the pump
    pub event_queue_depth: usize,
    /// Seconds between two statistics summaries, 0 disables them
    pub stats_interval_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            serial_timeout_ms: 100,
            can_timeout_ms: 50,
            serial_payload_limit: 64,
            event_queue_depth: 256,
            stats_interval_secs: 30,
        }
    }
}

impl EngineSettings {
    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_timeout_ms)
    }

    pub fn can_timeout(&self) -> Duration {
        Duration::from_millis(self.can_timeout_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// File holding the persisted mapping blob
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: config_dir().join(BLOB_FILE),
        }
    }
}

/// UART device backing a logical serial port number
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SerialPortConfig {
    pub port: u8,
    pub path: PathBuf,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// TOML `[[mapping]]` list imported on startup
    pub mappings_file: Option<PathBuf>,
    pub engine: EngineSettings,
    pub storage: StorageConfig,
    pub serial_ports: Vec<SerialPortConfig>,
}

impl AppConfig {
    /// Reads `path`, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("No configuration at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded configuration from {}", path.display());
        debug!("{:?}", config);
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `~/.config/hidbridge`
pub fn config_dir() -> PathBuf {
    get_home_dir().join(CONFIG_DIR)
}

pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Writes a default configuration to `path` if nothing is there yet
///
/// Returns `true` when a file was created.
pub fn ensure_default_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    info!("Creating default configuration at {}", path.display());
    AppConfig::default().save(path)?;
    Ok(true)
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
