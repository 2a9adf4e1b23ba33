//! `depot.toml` configuration and the on-disk storage layout.

use crate::descriptor::RepoDescriptor;
use crate::error::{DepotError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file under the storage root.
pub const CONFIG_FILE: &str = "depot.toml";

/// Complete configuration of one storage root.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Binary storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Garbage collection settings.
    #[serde(default)]
    pub gc: GcSettings,

    /// Repository definitions. Virtual repositories refer to the others by key.
    #[serde(default)]
    pub repositories: Vec<RepoDescriptor>,
}

impl Config {
    /// Loads `depot.toml` from `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| DepotError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DepotError::Config(format!("failed to parse config: {}", e)))
    }

    /// Writes `depot.toml` under `root`.
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = root.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)
            .map_err(|e| DepotError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(&path, content)
            .map_err(|e| DepotError::Config(format!("failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }
}

/// Binary storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Reject an upload whose staged length differs from the bytes read
    /// (default: true). When false the mismatch is only logged.
    pub reject_length_mismatch: bool,

    /// fsync staged files and shard directories before reporting success
    /// (default: true).
    pub fsync: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            reject_length_mismatch: true,
            fsync: true,
        }
    }
}

/// Garbage collection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GcSettings {
    /// Blobs and staging files younger than this are never collected
    /// (default: one hour).
    pub grace_period_secs: u64,
}

impl GcSettings {
    /// The grace period as a [`Duration`].
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for GcSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: 60 * 60,
        }
    }
}

/// Paths derived from a storage root.
///
/// ```text
/// <root>/
///   depot.toml
///   items.redb
///   filestore/
///     .gc.lock
///     _pre/          staging, same filesystem as the blobs
///     ab/abcdef...   blobs sharded by the first SHA-1 byte
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `depot.toml`.
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// The redb item database.
    pub fn items_db(&self) -> PathBuf {
        self.root.join("items.redb")
    }

    /// Directory holding the sharded blobs.
    pub fn filestore_dir(&self) -> PathBuf {
        self.root.join("filestore")
    }

    /// Staging directory for uploads in flight. Lives inside the filestore
    /// so the final move is a same-filesystem rename.
    pub fn staging_dir(&self) -> PathBuf {
        self.filestore_dir().join(crate::binary_store::STAGING_DIR_NAME)
    }
}
