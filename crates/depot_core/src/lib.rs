//! Depot Core Library
//!
//! Storage core of an artifact repository manager:
//! - Virtual repository resolution over a graph of local, remote and
//!   virtual repositories
//! - Session-scoped read/write lock bookkeeping for stored items
//! - Content-addressed binary storage with atomic deduplication
//! - Garbage collection of binaries no item refers to
//!
//! # Quick Start
//!
//! ```
//! use depot_core::BinaryStore;
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let store = BinaryStore::new(tmp.path().join("filestore"));
//!
//! // Same content = same record, one file on disk
//! let first = store.add_stream(&b"artifact bytes"[..]).unwrap();
//! let second = store.add_stream(&b"artifact bytes"[..]).unwrap();
//! assert_eq!(first, second);
//! assert_eq!(store.list_all().unwrap().len(), 1);
//! ```
//!
//! # Features
//!
//! ## Virtual Repositories
//!
//! A virtual repository aggregates members, which may themselves be virtual.
//! Resolution flattens the graph into a search order with local repositories
//! ahead of remote ones:
//!
//! ```
//! use depot_core::Config;
//! use depot_core::RepoGraph;
//!
//! let config = Config::from_toml(r#"
//! [[repositories]]
//! type = "remote"
//! key = "central"
//! url = "https://repo1.maven.org/maven2"
//!
//! [[repositories]]
//! type = "local"
//! key = "releases"
//!
//! [[repositories]]
//! type = "virtual"
//! key = "libs"
//! members = ["central", "releases"]
//! "#).unwrap();
//!
//! let graph = RepoGraph::new(config.repositories).unwrap();
//! let resolved = graph.resolve("libs").unwrap();
//! assert_eq!(resolved.ordered_keys(), vec!["releases", "central"]);
//! assert!(!resolved.has_cycle());
//! ```
//!
//! ## Transactions
//!
//! Items are locked through a [`Transaction`], changed in memory and written
//! on commit:
//!
//! ```
//! use depot_core::{BinaryStore, ItemStore, RepoPath, Transaction};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! let binaries = BinaryStore::new(tmp.path().join("filestore"));
//! let items = ItemStore::create(tmp.path().join("items.redb")).unwrap();
//!
//! let record = binaries.add_stream(&b"jar"[..]).unwrap();
//! let path = RepoPath::new("releases", "org/acme/app-1.0.jar");
//!
//! let mut txn = Transaction::begin();
//! txn.write_item(&items, &path).unwrap().set_binary(record, Some("ci"));
//! txn.commit().unwrap();
//!
//! assert_eq!(items.get(&path).unwrap().unwrap().binary, Some(record));
//! ```

mod binary_store;
mod checksum;
mod config;
mod depot;
mod descriptor;
mod error;
mod gc;
mod item_store;
mod lock;
mod repo_path;
mod resolver;
mod transaction;
mod verify;

pub use binary_store::{BinaryRecord, BinaryStore, BlobEntry, PinnedBlob, STAGING_DIR_NAME};
pub use checksum::{ChecksumReader, Md5, Sha1};
pub use config::{Config, GcSettings, StorageConfig, StorageLayout, CONFIG_FILE};
pub use depot::Depot;
pub use descriptor::{
    LocalRepoDescriptor, RealRepo, RemoteRepoDescriptor, RepoDescriptor, RepoGraph,
    VirtualRepoDescriptor,
};
pub use error::{DepotError, Result};
pub use gc::{gc, GcConfig, GcProgressCallback, PruneReport, ReferenceIndex};
pub use item_store::{ItemMetadata, ItemStore, StoredItem, ITEM_SCHEMA_VERSION};
pub use lock::{FsItem, FsItemHandle, LockManager, LockState, SessionLockEntry};
pub use repo_path::RepoPath;
pub use resolver::VirtualRepoResolver;
pub use transaction::Transaction;
pub use verify::{verify, CorruptedBlob, VerifyConfig, VerifyReport};
