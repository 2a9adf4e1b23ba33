//! Session-scoped read/write lock bookkeeping for filesystem items.
//!
//! A [`LockManager`] belongs to exactly one transaction. It records which
//! items that transaction has read- or write-locked and flushes the
//! write-locked ones on [`LockManager::save`]. Mutual exclusion between
//! transactions is the backing store's job, not this module's.

mod entry;
mod manager;

pub use entry::{LockState, SessionLockEntry};
pub use manager::LockManager;

use crate::error::Result;
use crate::repo_path::RepoPath;
use std::sync::Arc;

/// A mutable item living in the backing store (a file or folder node).
///
/// Implementations own their in-memory state and decide how to persist it.
/// The lock manager only holds shared handles and calls [`FsItem::save`] on
/// the ones its transaction write-locked.
pub trait FsItem: Send + Sync {
    /// The path this item lives at.
    fn repo_path(&self) -> &RepoPath;

    /// Writes the item's pending in-memory mutations to the backing store.
    fn save(&self) -> Result<()>;
}

/// Shared handle to an item supplied by the backing store.
pub type FsItemHandle = Arc<dyn FsItem>;
