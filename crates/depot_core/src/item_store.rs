//! Persistent item metadata, the backing store behind the lock manager.
//!
//! Each item is one row in a redb table keyed by its `repo:path` text and
//! holding a postcard-encoded [`ItemMetadata`]. Items are loaded into
//! [`StoredItem`] handles, mutated in memory, and written back when the
//! owning transaction saves.

use crate::binary_store::BinaryRecord;
use crate::checksum::Sha1;
use crate::error::{DepotError, Result};
use crate::gc::ReferenceIndex;
use crate::lock::FsItem;
use crate::repo_path::{check_repo_key, RepoPath};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Item store schema version.
pub const ITEM_SCHEMA_VERSION: u32 = 1;

const METADATA_TABLE: TableDefinition<&str, u32> = TableDefinition::new("metadata");
const ITEMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("items");

fn db_err<E: fmt::Display>(context: &'static str) -> impl Fn(E) -> DepotError {
    move |e| DepotError::Database(format!("{}: {}", context, e))
}

fn encode(metadata: &ItemMetadata) -> Result<Vec<u8>> {
    postcard::to_allocvec(metadata).map_err(|e| DepotError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<ItemMetadata> {
    postcard::from_bytes(bytes).map_err(|e| DepotError::Deserialization(e.to_string()))
}

fn row_key(repo_path: &RepoPath) -> Result<String> {
    check_repo_key(repo_path.repo_key())?;
    Ok(repo_path.to_string())
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Persisted state of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Where the item lives.
    pub repo_path: RepoPath,
    /// The binary deployed at this path, if any.
    pub binary: Option<BinaryRecord>,
    /// Unix timestamp of creation.
    pub created: i64,
    /// Unix timestamp of the last change.
    pub last_modified: i64,
    /// Who made the last change.
    pub modified_by: Option<String>,
}

impl ItemMetadata {
    fn new(repo_path: RepoPath) -> Self {
        let now = unix_now();
        Self {
            repo_path,
            binary: None,
            created: now,
            last_modified: now,
            modified_by: None,
        }
    }

    /// SHA-1 of the deployed binary.
    pub fn sha1(&self) -> Option<&Sha1> {
        self.binary.as_ref().map(|b| &b.sha1)
    }

    /// Size of the deployed binary, zero for an empty item.
    pub fn size(&self) -> u64 {
        self.binary.map(|b| b.length).unwrap_or(0)
    }
}

/// redb-backed item store.
///
/// # Examples
///
/// ```
/// use depot_core::{BinaryStore, FsItem, ItemStore, RepoPath};
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let items = ItemStore::create(tmp.path().join("items.redb")).unwrap();
/// let binaries = BinaryStore::new(tmp.path().join("filestore"));
///
/// let path = RepoPath::new("libs", "org/acme/app-1.0.jar");
/// let record = binaries.add_stream(&b"jar bytes"[..]).unwrap();
///
/// let item = items.load(&path).unwrap();
/// item.set_binary(record, Some("ci"));
/// item.save().unwrap();
///
/// let stored = items.get(&path).unwrap().unwrap();
/// assert_eq!(stored.binary, Some(record));
/// ```
pub struct ItemStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl ItemStore {
    /// Opens an existing item database.
    ///
    /// # Errors
    ///
    /// Returns `Database` when the file is missing or unreadable and
    /// `SchemaMismatch` when it was written by another schema version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(DepotError::Database(format!(
                "item store not found at {}",
                path.display()
            )));
        }
        let db = Database::open(&path).map_err(db_err("failed to open item store"))?;
        let store = Self {
            db: Arc::new(db),
            path,
        };
        store.check_schema()?;
        Ok(store)
    }

    /// Creates the item database, or opens it if it already exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&path).map_err(db_err("failed to create item store"))?;
        let write_txn = db
            .begin_write()
            .map_err(db_err("failed to begin write transaction"))?;
        {
            let mut meta = write_txn
                .open_table(METADATA_TABLE)
                .map_err(db_err("failed to open metadata table"))?;
            let existing = meta
                .get("version")
                .map_err(db_err("failed to read schema version"))?
                .map(|v| v.value());
            match existing {
                Some(found) if found != ITEM_SCHEMA_VERSION => {
                    return Err(DepotError::SchemaMismatch {
                        found,
                        expected: ITEM_SCHEMA_VERSION,
                    })
                }
                Some(_) => {}
                None => {
                    meta.insert("version", ITEM_SCHEMA_VERSION)
                        .map_err(db_err("failed to write schema version"))?;
                }
            }
            write_txn
                .open_table(ITEMS_TABLE)
                .map_err(db_err("failed to open items table"))?;
        }
        write_txn.commit().map_err(db_err("failed to commit"))?;

        debug!(path = %path.display(), "item store ready");
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_schema(&self) -> Result<()> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("failed to begin read transaction"))?;
        let table = read_txn
            .open_table(METADATA_TABLE)
            .map_err(db_err("failed to open metadata table"))?;
        let found = table
            .get("version")
            .map_err(db_err("failed to read schema version"))?
            .map(|v| v.value())
            .unwrap_or(0);
        if found != ITEM_SCHEMA_VERSION {
            return Err(DepotError::SchemaMismatch {
                found,
                expected: ITEM_SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    /// Loads a handle for `repo_path`.
    ///
    /// A path with no stored row yields a new, empty item that is written on
    /// its first save.
    pub fn load(&self, repo_path: &RepoPath) -> Result<Arc<StoredItem>> {
        let (metadata, persisted) = match self.get(repo_path)? {
            Some(metadata) => (metadata, true),
            None => (ItemMetadata::new(repo_path.clone()), false),
        };
        Ok(Arc::new(StoredItem {
            repo_path: repo_path.clone(),
            db: Arc::clone(&self.db),
            state: Mutex::new(ItemState {
                metadata,
                persisted,
            }),
        }))
    }

    /// Reads the stored metadata of `repo_path`.
    pub fn get(&self, repo_path: &RepoPath) -> Result<Option<ItemMetadata>> {
        let key = row_key(repo_path)?;
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("failed to begin read transaction"))?;
        let table = read_txn
            .open_table(ITEMS_TABLE)
            .map_err(db_err("failed to open items table"))?;
        let row = table
            .get(key.as_str())
            .map_err(db_err("failed to read item"))?;
        row.map(|guard| decode(guard.value())).transpose()
    }

    /// Deletes the row of `repo_path`. Returns whether one existed.
    pub fn delete(&self, repo_path: &RepoPath) -> Result<bool> {
        let key = row_key(repo_path)?;
        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("failed to begin write transaction"))?;
        let removed = {
            let mut table = write_txn
                .open_table(ITEMS_TABLE)
                .map_err(db_err("failed to open items table"))?;
            let removed = table
                .remove(key.as_str())
                .map_err(db_err("failed to delete item"))?
                .is_some();
            removed
        };
        write_txn.commit().map_err(db_err("failed to commit"))?;
        debug!(path = %repo_path, removed, "item deleted");
        Ok(removed)
    }

    /// All items of one repository, ordered by path.
    pub fn list(&self, repo_key: &str) -> Result<Vec<ItemMetadata>> {
        check_repo_key(repo_key)?;
        let prefix = format!("{}:", repo_key);
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("failed to begin read transaction"))?;
        let table = read_txn
            .open_table(ITEMS_TABLE)
            .map_err(db_err("failed to open items table"))?;

        let mut items = Vec::new();
        for row in table
            .range(prefix.as_str()..)
            .map_err(db_err("failed to scan items"))?
        {
            let (key, value) = row.map_err(db_err("failed to read item"))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            items.push(decode(value.value())?);
        }
        Ok(items)
    }

    /// Every stored item, ordered by `repo:path`.
    pub fn all(&self) -> Result<Vec<ItemMetadata>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("failed to begin read transaction"))?;
        let table = read_txn
            .open_table(ITEMS_TABLE)
            .map_err(db_err("failed to open items table"))?;

        let mut items = Vec::new();
        for row in table.iter().map_err(db_err("failed to scan items"))? {
            let (_, value) = row.map_err(db_err("failed to read item"))?;
            items.push(decode(value.value())?);
        }
        Ok(items)
    }

    /// Number of stored items.
    pub fn len(&self) -> Result<u64> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("failed to begin read transaction"))?;
        let table = read_txn
            .open_table(ITEMS_TABLE)
            .map_err(db_err("failed to open items table"))?;
        table.len().map_err(db_err("failed to count items"))
    }

    /// True when no item is stored.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl ReferenceIndex for ItemStore {
    fn referenced(&self, candidates: &[Sha1]) -> Result<HashSet<Sha1>> {
        let wanted: HashSet<&Sha1> = candidates.iter().collect();
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("failed to begin read transaction"))?;
        let table = read_txn
            .open_table(ITEMS_TABLE)
            .map_err(db_err("failed to open items table"))?;

        let mut referenced = HashSet::new();
        for row in table.iter().map_err(db_err("failed to scan items"))? {
            let (_, value) = row.map_err(db_err("failed to read item"))?;
            let metadata = decode(value.value())?;
            if let Some(sha1) = metadata.sha1() {
                if wanted.contains(sha1) {
                    referenced.insert(*sha1);
                }
            }
        }
        Ok(referenced)
    }
}

impl fmt::Debug for ItemStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemStore").field("path", &self.path).finish()
    }
}

struct ItemState {
    metadata: ItemMetadata,
    persisted: bool,
}

/// In-memory handle to one item, shared between a transaction's lock
/// entries and the caller.
pub struct StoredItem {
    repo_path: RepoPath,
    db: Arc<Database>,
    state: Mutex<ItemState>,
}

impl StoredItem {
    fn state(&self) -> MutexGuard<'_, ItemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current in-memory metadata.
    pub fn metadata(&self) -> ItemMetadata {
        self.state().metadata.clone()
    }

    /// True until the item has been saved once.
    pub fn is_new(&self) -> bool {
        !self.state().persisted
    }

    /// Points the item at a stored binary. Not persisted until saved.
    pub fn set_binary(&self, record: BinaryRecord, modified_by: Option<&str>) {
        let mut state = self.state();
        state.metadata.binary = Some(record);
        state.metadata.last_modified = unix_now();
        state.metadata.modified_by = modified_by.map(str::to_string);
    }

    /// Drops the binary reference. Not persisted until saved.
    pub fn clear_binary(&self) {
        let mut state = self.state();
        state.metadata.binary = None;
        state.metadata.last_modified = unix_now();
    }
}

impl FsItem for StoredItem {
    fn repo_path(&self) -> &RepoPath {
        &self.repo_path
    }

    fn save(&self) -> Result<()> {
        let mut state = self.state();
        let bytes = encode(&state.metadata)?;
        let key = row_key(&self.repo_path)?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("failed to begin write transaction"))?;
        {
            let mut table = write_txn
                .open_table(ITEMS_TABLE)
                .map_err(db_err("failed to open items table"))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(db_err("failed to write item"))?;
        }
        write_txn.commit().map_err(db_err("failed to commit"))?;

        state.persisted = true;
        debug!(path = %self.repo_path, "item saved");
        Ok(())
    }
}

impl fmt::Debug for StoredItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredItem")
            .field("repo_path", &self.repo_path)
            .finish_non_exhaustive()
    }
}
