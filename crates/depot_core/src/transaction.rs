//! Explicit session context owning one lock manager.

use crate::error::Result;
use crate::item_store::{ItemStore, StoredItem};
use crate::lock::LockManager;
use crate::repo_path::RepoPath;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A unit of work against the item store.
///
/// Items are locked through the transaction, mutated in memory, and flushed
/// together by [`commit`](Self::commit). Every exit path releases the
/// transaction's locks: commit, rollback, and drop.
///
/// # Examples
///
/// ```
/// use depot_core::{ItemStore, RepoPath, Transaction};
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let items = ItemStore::create(tmp.path().join("items.redb")).unwrap();
/// let path = RepoPath::new("libs", "a.jar");
///
/// let mut txn = Transaction::begin();
/// let item = txn.write_item(&items, &path).unwrap();
/// item.clear_binary();
/// assert_eq!(txn.commit().unwrap(), 1);
///
/// assert!(items.get(&path).unwrap().is_some());
/// ```
#[derive(Debug)]
pub struct Transaction {
    id: Uuid,
    locks: LockManager<StoredItem>,
}

impl Transaction {
    /// Starts a transaction with a fresh id and no locks.
    pub fn begin() -> Self {
        let id = Uuid::new_v4();
        debug!(txn = %id, "transaction started");
        Self {
            id,
            locks: LockManager::new(),
        }
    }

    /// Transaction id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The lock bookkeeping of this transaction.
    pub fn lock_manager(&self) -> &LockManager<StoredItem> {
        &self.locks
    }

    /// Mutable lock bookkeeping, for callers managing locks directly.
    pub fn lock_manager_mut(&mut self) -> &mut LockManager<StoredItem> {
        &mut self.locks
    }

    /// Read-locks `path`, loading it from `store` on first access.
    pub fn read_item(&mut self, store: &ItemStore, path: &RepoPath) -> Result<Arc<StoredItem>> {
        self.locks.read_lock(path, |p| store.load(p))
    }

    /// Write-locks `path`, loading it from `store` on first access.
    ///
    /// Changes made through the returned handle are written on commit.
    pub fn write_item(&mut self, store: &ItemStore, path: &RepoPath) -> Result<Arc<StoredItem>> {
        self.locks.write_lock(path, |p| store.load(p))
    }

    /// True when commit would write something.
    pub fn has_pending_changes(&self) -> bool {
        self.locks.has_pending_changes()
    }

    /// Flushes every write-locked item, then releases all locks.
    ///
    /// Returns the number of items written.
    ///
    /// # Errors
    ///
    /// Returns the first item save failure. Locks are released either way;
    /// items saved before the failure stay written.
    pub fn commit(mut self) -> Result<usize> {
        let result = self.locks.save();
        self.locks.release_resources();
        match &result {
            Ok(saved) => debug!(txn = %self.id, saved, "transaction committed"),
            Err(e) => warn!(txn = %self.id, error = %e, "transaction commit failed"),
        }
        result
    }

    /// Discards pending changes and releases all locks.
    pub fn rollback(mut self) {
        self.locks.release_resources();
        debug!(txn = %self.id, "transaction rolled back");
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.locks.has_pending_changes() {
            warn!(txn = %self.id, "transaction dropped with uncommitted changes");
        }
        self.locks.release_resources();
    }
}
