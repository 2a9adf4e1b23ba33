//! Error types for depot_core operations.

use crate::repo_path::RepoPath;
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for depot_core operations.
#[derive(Error, Debug)]
pub enum DepotError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// A repository key does not name any configured repository.
    #[error("unknown repository: {0}")]
    UnknownRepository(String),

    /// Two repositories were configured with the same key.
    #[error("duplicate repository key: {0}")]
    DuplicateRepository(String),

    /// A virtual repository was expected but the key names a real one.
    #[error("repository {0} is not a virtual repository")]
    NotVirtual(String),

    /// The target repository cannot accept a deploy of this path.
    #[error("cannot deploy to {repo}: {reason}")]
    NotDeployable {
        /// Target repository key
        repo: String,
        /// Why the deploy was refused
        reason: String,
    },

    /// Storage root has already been initialised.
    #[error("depot already initialized at {}", .0.display())]
    AlreadyInitialized(PathBuf),

    /// Storage root has not been initialised.
    #[error("no depot found at {}", .0.display())]
    NotInitialized(PathBuf),

    /// Lock bookkeeping was asked to act on state it never recorded.
    #[error("locking error on {path}: {reason}")]
    Locking {
        /// Path the operation targeted
        path: RepoPath,
        /// What went wrong
        reason: String,
    },

    /// The staged file length disagrees with the number of bytes hashed.
    #[error("length mismatch: hashed {expected} bytes but staging file holds {actual}")]
    LengthMismatch {
        /// Bytes observed by the checksum reader
        expected: u64,
        /// Bytes found on disk
        actual: u64,
    },

    /// No binary is stored under the given checksum.
    #[error("binary not found: {0}")]
    BinaryNotFound(String),

    /// A stored binary does not hash to its file name.
    #[error("corrupted binary at {}: {}", path.display(), reason)]
    CorruptedBinary {
        /// Path to the corrupted blob
        path: PathBuf,
        /// Description of the corruption
        reason: String,
    },

    /// Invalid hex text for a checksum.
    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    /// Invalid `repo:path` text.
    #[error("invalid repository path: {0}")]
    InvalidRepoPath(String),

    /// Invalid include/exclude pattern on a repository.
    #[error("invalid path pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Parser message
        reason: String,
    },

    /// Serialization error while encoding item metadata.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error while decoding item metadata.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Item store (redb) failure.
    #[error("item store error: {0}")]
    Database(String),

    /// Item store schema does not match this build.
    #[error("item store schema version mismatch: found {found}, expected {expected}")]
    SchemaMismatch {
        /// Version found on disk
        found: u32,
        /// Version this build writes
        expected: u32,
    },

    /// Another process holds the garbage collection lock.
    #[error("garbage collection already running (lock held at {})", .0.display())]
    GcLocked(PathBuf),
}

impl DepotError {
    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::UnknownRepository(_) | Self::NotVirtual(_) | Self::DuplicateRepository(_) => {
                Some("Check the [[repositories]] entries in depot.toml, then run 'depot check'.")
            }
            Self::Config(_) => Some("Fix depot.toml or remove it to fall back to defaults."),
            Self::NotDeployable { .. } => {
                Some("Deploy to a local repository whose include/exclude patterns admit the path.")
            }
            Self::NotInitialized(_) => Some("Run 'depot init' first, or pass --root."),
            Self::CorruptedBinary { .. } => {
                Some("Run 'depot verify' to list corrupted binaries and redeploy the affected items.")
            }
            Self::LengthMismatch { .. } => {
                Some("The upload was truncated or the disk is failing. Retry the deploy.")
            }
            Self::SchemaMismatch { .. } => {
                Some("The item store was written by a different depot version.")
            }
            Self::GcLocked(_) => {
                Some("Wait for the running collection to finish, or remove the lock file if no depot process is alive.")
            }
            Self::Locking { .. } => {
                Some("This is a bug in the caller: a lock was reacquired without being taken first.")
            }
            _ => None,
        }
    }
}

/// Convenience Result type for depot_core operations.
pub type Result<T> = std::result::Result<T, DepotError>;
