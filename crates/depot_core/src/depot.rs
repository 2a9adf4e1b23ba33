//! A storage root opened as one unit: configuration, repository graph,
//! binary store and item store.

use crate::binary_store::{BinaryStore, PinnedBlob};
use crate::config::{Config, StorageLayout};
use crate::descriptor::{RealRepo, RepoDescriptor, RepoGraph};
use crate::error::{DepotError, Result};
use crate::gc::{GcConfig, GcProgressCallback, PruneReport};
use crate::item_store::{ItemMetadata, ItemStore};
use crate::repo_path::RepoPath;
use crate::resolver::VirtualRepoResolver;
use crate::transaction::Transaction;
use crate::verify::{self, VerifyConfig, VerifyReport};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An opened storage root.
///
/// # Examples
///
/// ```
/// use depot_core::{Config, Depot, LocalRepoDescriptor, RepoDescriptor};
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let config = Config {
///     repositories: vec![RepoDescriptor::Local(LocalRepoDescriptor {
///         key: "libs".into(),
///         description: None,
///         includes: vec![],
///         excludes: vec![],
///     })],
///     ..Config::default()
/// };
/// let depot = Depot::init_with_config(tmp.path(), config).unwrap();
///
/// let item = depot.deploy("libs", "a/b.jar", &b"bytes"[..], None).unwrap();
/// assert_eq!(item.size(), 5);
/// ```
#[derive(Debug)]
pub struct Depot {
    layout: StorageLayout,
    config: Config,
    graph: RepoGraph,
    binaries: BinaryStore,
    items: ItemStore,
}

impl Depot {
    /// Initialises a new storage root with default configuration.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` when `root` already holds a depot.
    pub fn init(root: impl AsRef<Path>) -> Result<Self> {
        Self::init_with_config(root, Config::default())
    }

    /// Initialises a new storage root and writes `config` as its `depot.toml`.
    pub fn init_with_config(root: impl AsRef<Path>, config: Config) -> Result<Self> {
        let layout = StorageLayout::new(root.as_ref());
        if layout.items_db().exists() {
            return Err(DepotError::AlreadyInitialized(layout.root().to_path_buf()));
        }

        let graph = RepoGraph::new(config.repositories.clone())?;
        fs::create_dir_all(layout.staging_dir())?;
        config.save(layout.root())?;
        let items = ItemStore::create(layout.items_db())?;
        let binaries = BinaryStore::with_config(layout.filestore_dir(), &config.storage);

        info!(root = %layout.root().display(), repositories = graph.len(), "initialized depot");
        Ok(Self {
            layout,
            config,
            graph,
            binaries,
            items,
        })
    }

    /// Opens an existing storage root.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` when `root` holds no item store, and
    /// configuration errors from `depot.toml` or the repository graph.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let layout = StorageLayout::new(root.as_ref());
        if !layout.items_db().exists() {
            return Err(DepotError::NotInitialized(layout.root().to_path_buf()));
        }

        let config = Config::load(layout.root())?;
        let graph = RepoGraph::new(config.repositories.clone())?;
        let items = ItemStore::open(layout.items_db())?;
        let binaries = BinaryStore::with_config(layout.filestore_dir(), &config.storage);

        debug!(root = %layout.root().display(), repositories = graph.len(), "opened depot");
        Ok(Self {
            layout,
            config,
            graph,
            binaries,
            items,
        })
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Derived storage paths.
    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The repository graph built from the configuration.
    pub fn graph(&self) -> &RepoGraph {
        &self.graph
    }

    /// The binary store.
    pub fn binary_store(&self) -> &BinaryStore {
        &self.binaries
    }

    /// The item store.
    pub fn item_store(&self) -> &ItemStore {
        &self.items
    }

    /// Resolves a virtual repository into its search path.
    pub fn resolve(&self, virtual_key: &str) -> Result<VirtualRepoResolver<'_>> {
        self.graph.resolve(virtual_key)
    }

    /// Keys of virtual repositories whose member graph has a cycle.
    pub fn check(&self) -> Result<Vec<String>> {
        self.graph.validate()
    }

    /// Stores `content` and points the item at `repo_key:path` to it.
    ///
    /// The item is written inside its own transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRepository` for an unknown key and `NotDeployable` when
    /// the repository is not local or its patterns reject the path.
    pub fn deploy<R: Read>(
        &self,
        repo_key: &str,
        path: &str,
        content: R,
        modified_by: Option<&str>,
    ) -> Result<ItemMetadata> {
        let repo_path = RepoPath::new(repo_key, path);
        self.check_deployable(&repo_path)?;

        let record = self.binaries.add_stream(content)?;

        let mut txn = Transaction::begin();
        let item = txn.write_item(&self.items, &repo_path)?;
        item.set_binary(record, modified_by);
        txn.commit()?;

        info!(path = %repo_path, sha1 = %record.sha1, length = record.length, "deployed");
        Ok(item.metadata())
    }

    fn check_deployable(&self, repo_path: &RepoPath) -> Result<()> {
        let key = repo_path.repo_key();
        let refuse = |reason: &str| DepotError::NotDeployable {
            repo: key.to_string(),
            reason: reason.to_string(),
        };

        let descriptor = self
            .graph
            .get(key)
            .ok_or_else(|| DepotError::UnknownRepository(key.to_string()))?;
        let RepoDescriptor::Local(local) = descriptor else {
            return Err(refuse(&format!("{} repositories do not accept deploys", descriptor.kind())));
        };
        if repo_path.is_root() {
            return Err(refuse("path must not be empty"));
        }
        if !RealRepo::Local(local).accepts(repo_path.path()) {
            return Err(refuse(&format!(
                "path {} is rejected by the include/exclude patterns",
                repo_path.path()
            )));
        }
        Ok(())
    }

    /// Stored metadata of one item.
    pub fn info(&self, repo_path: &RepoPath) -> Result<Option<ItemMetadata>> {
        self.items.get(repo_path)
    }

    /// Looks `path` up through a virtual repository.
    ///
    /// Local members are consulted in search order and the first stored
    /// item wins. Remote members are skipped since nothing is cached for
    /// them locally.
    pub fn find(&self, virtual_key: &str, path: &str) -> Result<Option<ItemMetadata>> {
        let resolved = self.resolve(virtual_key)?;
        for repo in resolved.search_order(path) {
            if !repo.is_local() {
                continue;
            }
            if let Some(item) = self.items.get(&RepoPath::new(repo.key(), path))? {
                debug!(virtual_key, found_in = repo.key(), path, "virtual lookup hit");
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// Opens the binary an item points at.
    ///
    /// # Errors
    ///
    /// Returns `BinaryNotFound` when the item has no binary or the blob is
    /// missing.
    pub fn open_binary(&self, item: &ItemMetadata) -> Result<PinnedBlob> {
        let sha1 = item
            .sha1()
            .ok_or_else(|| DepotError::BinaryNotFound(item.repo_path.to_string()))?;
        self.binaries.open(sha1)
    }

    /// Collects unreferenced binaries using the item store as the index.
    pub fn gc(
        &self,
        config: &GcConfig,
        progress: Option<&GcProgressCallback<'_>>,
    ) -> Result<PruneReport> {
        self.binaries.gc(&self.items, config, progress)
    }

    /// GC settings from `depot.toml`.
    pub fn gc_config(&self) -> GcConfig {
        GcConfig::from_settings(&self.config.gc)
    }

    /// Verifies the filestore and the items pointing into it.
    pub fn verify(&self, config: &VerifyConfig) -> Result<VerifyReport> {
        verify::verify(&self.binaries, Some(&self.items), config)
    }

    /// Path of `depot.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.layout.config_file()
    }
}
