//! # Configuration
//!
//! Settings come from three places, later ones winning:
//!
//! 1. Built-in defaults (`rombel.db`, redb backend, `127.0.0.1:8080`)
//! 2. `rombel.toml` (or the file given with `--config`)
//! 3. CLI flags
//!
//! ```toml
//! database = "data/rombel.db"
//! backend = "redb"            # redb | file | memory
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [students]
//! roster = [1001, 1002, 1003] # omit to accept any student id
//! ```

use rombel_core::{RombelError, StudentId, StudentRoster};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "rombel.toml";

pub const DEFAULT_DATABASE: &str = "rombel.db";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum config file size (1 MB).
const MAX_CONFIG_SIZE: u64 = 1024 * 1024;

// =============================================================================
// BACKEND
// =============================================================================

/// Where enrollment state lives between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// ACID redb database; every command commits to disk.
    #[default]
    Redb,
    /// Snapshot file, loaded at start and rewritten after each mutation.
    File,
    /// Volatile; state is lost when the process exits.
    Memory,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Redb => "redb",
            Self::File => "file",
            Self::Memory => "memory",
        })
    }
}

// =============================================================================
// FILE FORMAT
// =============================================================================

/// Contents of `rombel.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub server: ServerSection,
    pub students: StudentsSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudentsSection {
    /// Known student ids. `None` accepts every id.
    pub roster: Option<Vec<u64>>,
}

impl FileConfig {
    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, RombelError> {
        toml::from_str(text)
            .map_err(|e| RombelError::InvalidRequest(format!("Invalid configuration: {}", e)))
    }

    /// Read a config file.
    pub fn load(path: &Path) -> Result<Self, RombelError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            RombelError::Storage(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_SIZE {
            return Err(RombelError::InvalidRequest(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            RombelError::Storage(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load `explicit` if given, else `rombel.toml` if it exists, else defaults.
    ///
    /// A missing explicit file is an error; a missing default file is not.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, RombelError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

// =============================================================================
// RESOLVED SETTINGS
// =============================================================================

/// Values given on the command line; `None` defers to the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<PathBuf>,
    pub backend: Option<Backend>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Fully resolved settings used by the CLI and the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub backend: Backend,
    pub host: String,
    pub port: u16,
    pub roster: Option<Vec<StudentId>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::resolve(FileConfig::default(), Overrides::default())
    }
}

impl Settings {
    /// Merge file values under CLI overrides.
    #[must_use]
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Self {
        Self {
            database: overrides
                .database
                .or(file.database)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            backend: overrides.backend.or(file.backend).unwrap_or_default(),
            host: overrides
                .host
                .or(file.server.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(file.server.port).unwrap_or(DEFAULT_PORT),
            roster: file
                .students
                .roster
                .map(|ids| ids.into_iter().map(StudentId).collect()),
        }
    }

    /// The configured student roster, if one was given.
    #[must_use]
    pub fn student_roster(&self) -> Option<StudentRoster> {
        self.roster
            .as_ref()
            .map(|ids| ids.iter().copied().collect())
    }

    /// `host:port` for binding the HTTP listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// TESTS
// =============================================================================
