//! Per-path lock record owned by one session.

use super::FsItem;
use crate::error::Result;
use crate::repo_path::RepoPath;
use std::fmt;
use std::sync::Arc;

/// Lock state of one path inside one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockState {
    /// No hold of any kind.
    Unlocked,
    /// At least one read hold, no write lock.
    Read,
    /// Write-locked. Implies read access.
    Write,
}

/// Lock and modification record for one item within one session.
///
/// Read holds are counted so that nested callers may lock the same path
/// repeatedly; each [`release_read_lock`](Self::release_read_lock) gives
/// back one hold. The write lock is independent of the read count: it is
/// granted without a prior read (write implies read) and survives the
/// release of every read hold.
pub struct SessionLockEntry<I: ?Sized = dyn FsItem> {
    repo_path: RepoPath,
    item: Arc<I>,
    read_holds: u32,
    write_locked: bool,
    dirty: bool,
}

impl<I: FsItem + ?Sized> SessionLockEntry<I> {
    pub(crate) fn new(repo_path: RepoPath, item: Arc<I>) -> Self {
        Self {
            repo_path,
            item,
            read_holds: 0,
            write_locked: false,
            dirty: false,
        }
    }

    /// The locked path.
    pub fn repo_path(&self) -> &RepoPath {
        &self.repo_path
    }

    /// The shared item handle.
    pub fn item(&self) -> &Arc<I> {
        &self.item
    }

    /// Current state.
    pub fn lock_state(&self) -> LockState {
        if self.write_locked {
            LockState::Write
        } else if self.read_holds > 0 {
            LockState::Read
        } else {
            LockState::Unlocked
        }
    }

    /// Number of outstanding read holds.
    pub fn read_holds(&self) -> u32 {
        self.read_holds
    }

    /// True when read access is held, directly or through the write lock.
    pub fn is_read_locked(&self) -> bool {
        self.read_holds > 0 || self.write_locked
    }

    /// True when this session holds the write lock.
    pub fn is_write_locked(&self) -> bool {
        self.write_locked
    }

    /// True when write-locked and not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn acquire_read_lock(&mut self) {
        self.read_holds = self.read_holds.saturating_add(1);
    }

    pub(crate) fn acquire_write_lock(&mut self) {
        self.write_locked = true;
        self.dirty = true;
    }

    /// Gives back one read hold. Returns false when none was held.
    pub(crate) fn release_read_lock(&mut self) -> bool {
        if self.read_holds == 0 {
            return false;
        }
        self.read_holds -= 1;
        true
    }

    /// Drops every read hold, keeping the write lock. Returns whether any
    /// hold was released.
    pub(crate) fn release_all_read_holds(&mut self) -> bool {
        let had_holds = self.read_holds > 0;
        self.read_holds = 0;
        had_holds
    }

    /// Flushes the item if this entry is write-locked, on every call. The
    /// item may have changed since an earlier flush.
    ///
    /// Returns whether a flush happened.
    pub(crate) fn save(&mut self) -> Result<bool> {
        if !self.write_locked {
            return Ok(false);
        }
        self.item.save()?;
        self.dirty = false;
        Ok(true)
    }

    pub(crate) fn unlock(&mut self) {
        self.read_holds = 0;
        self.write_locked = false;
        self.dirty = false;
    }
}

impl<I: FsItem + ?Sized> fmt::Debug for SessionLockEntry<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLockEntry")
            .field("repo_path", &self.repo_path)
            .field("item", &self.item.repo_path())
            .field("read_holds", &self.read_holds)
            .field("write_locked", &self.write_locked)
            .field("dirty", &self.dirty)
            .finish()
    }
}
