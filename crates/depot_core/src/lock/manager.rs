//! Registry of the lock entries held by one session.

use super::entry::{LockState, SessionLockEntry};
use super::FsItem;
use crate::error::{DepotError, Result};
use crate::repo_path::RepoPath;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Session-local lock bookkeeping, keyed by [`RepoPath`].
///
/// Generic over the item type so that a caller working with one concrete
/// backing store keeps typed handles; the default is `dyn FsItem`.
///
/// Holds at most one [`SessionLockEntry`] per path. Acquisition never
/// blocks: it always succeeds against this session's own entry, and real
/// contention between sessions is settled by the backing store when the
/// transaction commits.
///
/// A manager lives for one transaction: populated lazily, then either
/// flushed with [`save`](Self::save) or discarded, and always finished
/// with [`release_resources`](Self::release_resources).
///
/// # Examples
///
/// ```
/// use depot_core::{FsItem, LockManager, RepoPath, Result};
/// use std::sync::Arc;
///
/// struct Item(RepoPath);
///
/// impl FsItem for Item {
///     fn repo_path(&self) -> &RepoPath { &self.0 }
///     fn save(&self) -> Result<()> { Ok(()) }
/// }
///
/// let mut locks: LockManager<Item> = LockManager::new();
/// let path = RepoPath::new("libs", "a.jar");
///
/// locks.read_lock(&path, |p| Ok(Arc::new(Item(p.clone())))).unwrap();
/// assert!(locks.release_read_lock(&path));
/// assert!(!locks.release_read_lock(&path));
/// ```
pub struct LockManager<I: ?Sized = dyn FsItem> {
    entries: HashMap<RepoPath, SessionLockEntry<I>>,
}

impl<I: FsItem + ?Sized> Default for LockManager<I> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<I: FsItem + ?Sized> fmt::Debug for LockManager<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("entries", &self.entries.len())
            .field("pending_changes", &self.has_pending_changes())
            .finish()
    }
}

impl<I: FsItem + ?Sized> LockManager<I> {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a read hold on `path`.
    ///
    /// `supplier` loads the item and runs only when this session has no entry
    /// for the path yet. Repeated calls stack read holds.
    ///
    /// # Errors
    ///
    /// Propagates the supplier's error; no entry is recorded in that case.
    pub fn read_lock<F>(&mut self, path: &RepoPath, supplier: F) -> Result<Arc<I>>
    where
        F: FnOnce(&RepoPath) -> Result<Arc<I>>,
    {
        let entry = self.get_or_create(path, supplier)?;
        entry.acquire_read_lock();
        debug!(path = %path, holds = entry.read_holds(), "read lock acquired");
        Ok(entry.item().clone())
    }

    /// Takes the write lock on `path`, creating the entry if needed.
    ///
    /// Write implies read: no prior [`read_lock`](Self::read_lock) is
    /// required, and an existing read hold is upgraded in place.
    ///
    /// # Errors
    ///
    /// Propagates the supplier's error; no entry is recorded in that case.
    pub fn write_lock<F>(&mut self, path: &RepoPath, supplier: F) -> Result<Arc<I>>
    where
        F: FnOnce(&RepoPath) -> Result<Arc<I>>,
    {
        let entry = self.get_or_create(path, supplier)?;
        let upgraded = entry.lock_state() == LockState::Read;
        entry.acquire_write_lock();
        debug!(path = %path, upgraded, "write lock acquired");
        Ok(entry.item().clone())
    }

    /// Gives back one read hold on `path`.
    ///
    /// Returns false, and logs, when the session has no entry for the path or
    /// holds no read lock on it.
    pub fn release_read_lock(&mut self, path: &RepoPath) -> bool {
        match self.entries.get_mut(path) {
            Some(entry) => {
                let released = entry.release_read_lock();
                if !released {
                    warn!(path = %path, "release of read lock that is not held");
                }
                released
            }
            None => {
                warn!(path = %path, "release of read lock on path not locked by this session");
                false
            }
        }
    }

    /// Re-establishes a read hold on a path this session already tracks.
    ///
    /// # Errors
    ///
    /// Returns `Locking` when the session has no entry for `path`: the caller
    /// lost track of an item it never locked.
    pub fn reacquire_read_lock(&mut self, path: &RepoPath) -> Result<Arc<I>> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| DepotError::Locking {
                path: path.clone(),
                reason: "no lock entry to reacquire".to_string(),
            })?;
        entry.acquire_read_lock();
        debug!(path = %path, holds = entry.read_holds(), "read lock reacquired");
        Ok(entry.item().clone())
    }

    /// Unlocks and forgets `path`. Pending changes on it are discarded.
    ///
    /// Returns false, and logs, when the path was not held by this session.
    pub fn remove_entry(&mut self, path: &RepoPath) -> bool {
        match self.entries.remove(path) {
            Some(mut entry) => {
                if entry.is_dirty() {
                    warn!(path = %path, "removing lock entry with unsaved changes");
                }
                entry.unlock();
                true
            }
            None => {
                warn!(path = %path, "remove of lock entry not held by this session");
                false
            }
        }
    }

    /// Drops the read holds of every entry in repository `repo_key`.
    ///
    /// Entries stay registered and write locks are kept. Returns how many
    /// entries had read holds released.
    pub fn unlock_all_read_locks(&mut self, repo_key: &str) -> usize {
        let mut released = 0;
        for entry in self.entries.values_mut() {
            if entry.repo_path().repo_key() == repo_key && entry.release_all_read_holds() {
                released += 1;
            }
        }
        debug!(repo_key, released, "released read locks for repository");
        released
    }

    /// True when any entry is write-locked by this session.
    pub fn has_pending_changes(&self) -> bool {
        self.entries.values().any(|e| e.is_write_locked())
    }

    /// Flushes every write-locked entry's item to the backing store.
    ///
    /// Read-only entries are not touched. Returns the number of items saved.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first item save failure.
    pub fn save(&mut self) -> Result<usize> {
        let mut saved = 0;
        for entry in self.entries.values_mut() {
            if entry.save()? {
                saved += 1;
            }
        }
        debug!(saved, "lock manager flushed");
        Ok(saved)
    }

    /// Unlocks and clears every entry. Safe to call more than once.
    pub fn release_resources(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let unsaved = self.entries.values().filter(|e| e.is_dirty()).count();
        if unsaved > 0 {
            debug!(unsaved, "discarding unsaved lock entries");
        }
        for entry in self.entries.values_mut() {
            entry.unlock();
        }
        self.entries.clear();
    }

    /// Returns the entry for `path`, if this session tracks it.
    pub fn get(&self, path: &RepoPath) -> Option<&SessionLockEntry<I>> {
        self.entries.get(path)
    }

    /// Lock state of `path`, `Unlocked` when untracked.
    pub fn lock_state(&self, path: &RepoPath) -> LockState {
        self.get(path)
            .map(|e| e.lock_state())
            .unwrap_or(LockState::Unlocked)
    }

    /// True when this session may read `path`.
    pub fn is_read_locked(&self, path: &RepoPath) -> bool {
        self.get(path).is_some_and(|e| e.is_read_locked())
    }

    /// True when this session holds the write lock on `path`.
    pub fn is_write_locked(&self, path: &RepoPath) -> bool {
        self.get(path).is_some_and(|e| e.is_write_locked())
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no paths are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked paths, sorted.
    pub fn paths(&self) -> Vec<&RepoPath> {
        let mut paths: Vec<_> = self.entries.keys().collect();
        paths.sort();
        paths
    }

    fn get_or_create<F>(&mut self, path: &RepoPath, supplier: F) -> Result<&mut SessionLockEntry<I>>
    where
        F: FnOnce(&RepoPath) -> Result<Arc<I>>,
    {
        match self.entries.entry(path.clone()) {
            Entry::Occupied(occupied) => Ok(occupied.into_mut()),
            Entry::Vacant(vacant) => {
                let item = supplier(path)?;
                Ok(vacant.insert(SessionLockEntry::new(path.clone(), item)))
            }
        }
    }
}
