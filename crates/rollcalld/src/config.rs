//! Daemon configuration.
//!
//! Loaded from a TOML file. Every field has a default, so a missing file or
//! an empty file yields a working single-machine setup:
//!
//! ```toml
//! listen_addr = "0.0.0.0:8080"
//! framing = "line"
//! data_dir = "/var/lib/rollcall"
//! listener_reader = "GATE-1"
//!
//! [[locations]]
//! id = "LAB-CS"
//! name = "Computer Science Lab"
//! capacity = 30
//!
//! [[readers]]
//! id = "GATE-1"
//! location = "LAB-CS"
//! ```
//!
//! Relative `log_file`, `export_dir`, `mailbox_path` and `roster_path`
//! values are resolved against `data_dir`.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rollcall_core::{Location, LocationId, ReaderId};
use rollcall_protocol::Framing;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "ROLLCALL_CONFIG";

/// Default listen address (all interfaces, the scanners' well-known port).
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

const DEFAULT_MAX_CONNECTIONS: usize = 64;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAILBOX_INTERVAL_SECS: u64 = 2;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid listen address {addr:?}: {reason}")]
    InvalidListenAddr { addr: String, reason: String },

    #[error("location {0} has zero capacity")]
    ZeroCapacity(LocationId),

    #[error("location {0} is defined more than once")]
    DuplicateLocation(LocationId),

    #[error("reader {reader} references unknown location {location}")]
    UnknownLocation {
        reader: ReaderId,
        location: LocationId,
    },

    #[error("listener_reader {0} is not a configured reader")]
    UnknownListenerReader(ReaderId),

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
}

/// A location as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocationConfig {
    pub id: LocationId,
    pub name: String,
    pub capacity: u32,
}

/// A reader as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReaderConfig {
    pub id: ReaderId,
    pub location: LocationId,
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RollcallConfig {
    pub listen_addr: String,
    pub framing: Framing,
    pub max_connections: usize,
    pub read_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
    pub export_dir: PathBuf,
    pub mailbox_path: PathBuf,
    pub mailbox_interval_secs: u64,
    pub roster_path: PathBuf,
    /// Reader attributed to scans arriving over TCP
    pub listener_reader: Option<ReaderId>,
    pub locations: Vec<LocationConfig>,
    pub readers: Vec<ReaderConfig>,
}

impl Default for RollcallConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            framing: Framing::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            data_dir: default_data_dir(),
            log_file: PathBuf::from("attendance.dat"),
            export_dir: PathBuf::from("."),
            mailbox_path: PathBuf::from("scan_pipe.txt"),
            mailbox_interval_secs: DEFAULT_MAILBOX_INTERVAL_SECS,
            roster_path: PathBuf::from("roster.json"),
            listener_reader: None,
            locations: Vec::new(),
            readers: Vec::new(),
        }
    }
}

/// Returns the platform data directory for rollcall, or the working
/// directory if the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("rollcall"))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl RollcallConfig {
    /// Loads and validates the configuration.
    ///
    /// Resolution order: `path` if given, else `$ROLLCALL_CONFIG`, else
    /// defaults. An explicitly named file that does not exist is treated as
    /// empty.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

        let config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a configuration file without validating it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.max_connections == 0 {
            return Err(ConfigError::ZeroValue {
                field: "max_connections",
            });
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue {
                field: "read_timeout_secs",
            });
        }
        if self.mailbox_interval_secs == 0 {
            return Err(ConfigError::ZeroValue {
                field: "mailbox_interval_secs",
            });
        }

        let mut seen = HashSet::new();
        for loc in &self.locations {
            if loc.capacity == 0 {
                return Err(ConfigError::ZeroCapacity(loc.id.clone()));
            }
            if !seen.insert(&loc.id) {
                return Err(ConfigError::DuplicateLocation(loc.id.clone()));
            }
        }

        for reader in &self.readers {
            if !seen.contains(&reader.location) {
                return Err(ConfigError::UnknownLocation {
                    reader: reader.id.clone(),
                    location: reader.location.clone(),
                });
            }
        }

        if let Some(listener) = &self.listener_reader {
            if !self.readers.iter().any(|r| &r.id == listener) {
                return Err(ConfigError::UnknownListenerReader(listener.clone()));
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidListenAddr {
                addr: self.listen_addr.clone(),
                reason: e.to_string(),
            })
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn mailbox_interval(&self) -> Duration {
        Duration::from_secs(self.mailbox_interval_secs)
    }

    pub fn log_path(&self) -> PathBuf {
        self.resolve(&self.log_file)
    }

    pub fn export_path(&self) -> PathBuf {
        self.resolve(&self.export_dir)
    }

    pub fn mailbox_file(&self) -> PathBuf {
        self.resolve(&self.mailbox_path)
    }

    pub fn roster_file(&self) -> PathBuf {
        self.resolve(&self.roster_path)
    }

    /// Builds zeroed location counters from the configured locations.
    pub fn build_locations(&self) -> Vec<Location> {
        self.locations
            .iter()
            .map(|l| Location::new(l.id.clone(), l.name.clone(), l.capacity))
            .collect()
    }

    /// Builds the reader → location mapping.
    pub fn reader_map(&self) -> HashMap<ReaderId, LocationId> {
        self.readers
            .iter()
            .map(|r| (r.id.clone(), r.location.clone()))
            .collect()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}
