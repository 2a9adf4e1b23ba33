//! Garbage collection of unreferenced binaries.
//!
//! A blob is collectable when the [`ReferenceIndex`] no longer knows its
//! checksum, no reader has it pinned, and it is older than the grace period.
//! The grace period protects uploads whose item metadata has not been
//! committed yet.

use crate::binary_store::{BinaryStore, BlobEntry};
use crate::checksum::Sha1;
use crate::config::GcSettings;
use crate::error::{DepotError, Result};
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Progress callback for GC operations.
/// Called with (current, total, phase) where phase is "scan", "mark", "sweep",
/// "staging" or "done".
pub type GcProgressCallback<'a> = dyn Fn(usize, usize, &str) + 'a;

/// Answers which checksums are still referenced by stored items.
pub trait ReferenceIndex {
    /// Returns the subset of `candidates` that something still refers to.
    fn referenced(&self, candidates: &[Sha1]) -> Result<HashSet<Sha1>>;
}

impl ReferenceIndex for HashSet<Sha1> {
    fn referenced(&self, candidates: &[Sha1]) -> Result<HashSet<Sha1>> {
        Ok(candidates
            .iter()
            .filter(|sha1| self.contains(sha1))
            .copied()
            .collect())
    }
}

/// Configuration for a collection run.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Report what would be deleted without deleting anything.
    pub dry_run: bool,

    /// Keep unreferenced blobs and staging files younger than this.
    pub grace_period: Duration,

    /// Also remove abandoned staging files older than the grace period.
    pub clean_staging: bool,
}

impl GcConfig {
    /// Settings from `depot.toml`.
    pub fn from_settings(settings: &GcSettings) -> Self {
        Self {
            grace_period: settings.grace_period(),
            ..Self::default()
        }
    }

    /// Deletes every unreferenced blob regardless of age.
    pub fn immediate() -> Self {
        Self {
            grace_period: Duration::ZERO,
            clean_staging: false,
            ..Self::default()
        }
    }
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            grace_period: GcSettings::default().grace_period(),
            clean_staging: true,
        }
    }
}

/// Outcome of a collection run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PruneReport {
    /// Blobs examined.
    pub blobs_scanned: usize,

    /// Blobs kept because an item refers to them.
    pub blobs_referenced: usize,

    /// Blobs kept because a reader has them open.
    pub blobs_pinned: usize,

    /// Unreferenced blobs kept because they are inside the grace period.
    pub blobs_recent: usize,

    /// Blobs deleted (or that would be, in a dry run).
    pub blobs_deleted: usize,

    /// Bytes freed by deletion.
    pub bytes_freed: u64,

    /// Abandoned staging files removed.
    pub staging_removed: usize,

    /// Per-file failures. The sweep continues past them.
    pub errors: Vec<String>,
}

impl PruneReport {
    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "scanned {} blobs: {} referenced, {} pinned, {} recent, {} deleted ({} bytes), {} staging files removed",
            self.blobs_scanned,
            self.blobs_referenced,
            self.blobs_pinned,
            self.blobs_recent,
            self.blobs_deleted,
            self.bytes_freed,
            self.staging_removed,
        )
    }
}

/// Runs a full collection over every shard.
///
/// Takes an exclusive lock on `<filestore>/.gc.lock` for the duration, so
/// two collectors never sweep the same store at once.
///
/// # Errors
///
/// Returns `GcLocked` when another collection holds the lock, or the first
/// listing/index failure. Individual delete failures land in
/// [`PruneReport::errors`].
///
/// # Examples
///
/// ```
/// use depot_core::{gc, BinaryStore, GcConfig, Sha1};
/// use std::collections::HashSet;
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let store = BinaryStore::new(tmp.path());
/// let kept = store.add_stream(&b"kept"[..]).unwrap();
/// store.add_stream(&b"orphan"[..]).unwrap();
///
/// let index: HashSet<Sha1> = [kept.sha1].into_iter().collect();
/// let config = GcConfig { grace_period: Default::default(), ..GcConfig::default() };
/// let report = gc(&store, &index, &config, None).unwrap();
/// assert_eq!(report.blobs_deleted, 1);
/// assert!(store.exists(&kept.sha1));
/// ```
pub fn gc(
    store: &BinaryStore,
    index: &dyn ReferenceIndex,
    config: &GcConfig,
    progress: Option<&GcProgressCallback<'_>>,
) -> Result<PruneReport> {
    fs::create_dir_all(store.root())?;
    let _lock = GcLock::acquire(&store.gc_lock_path())?;

    if let Some(cb) = progress {
        cb(0, 1, "scan");
    }
    let blobs = store.list_all()?;

    let mut report = sweep(store, blobs, index, config, progress)?;

    if config.clean_staging {
        clean_staging(store, config, &mut report, progress)?;
    }

    if let Some(cb) = progress {
        cb(1, 1, "done");
    }

    info!(
        scanned = report.blobs_scanned,
        deleted = report.blobs_deleted,
        bytes_freed = report.bytes_freed,
        dry_run = config.dry_run,
        errors = report.errors.len(),
        "garbage collection finished"
    );
    Ok(report)
}

/// Deletes the collectable blobs among `blobs`.
pub(crate) fn sweep(
    store: &BinaryStore,
    blobs: Vec<BlobEntry>,
    index: &dyn ReferenceIndex,
    config: &GcConfig,
    progress: Option<&GcProgressCallback<'_>>,
) -> Result<PruneReport> {
    let mut report = PruneReport {
        blobs_scanned: blobs.len(),
        ..PruneReport::default()
    };

    if let Some(cb) = progress {
        cb(0, blobs.len(), "mark");
    }
    let candidates: Vec<Sha1> = blobs.iter().map(|b| b.sha1).collect();
    let referenced = index.referenced(&candidates)?;

    let cutoff = cutoff_time(config.grace_period);
    let total = blobs.len();

    for (idx, blob) in blobs.into_iter().enumerate() {
        if let Some(cb) = progress {
            if idx % 100 == 0 || idx + 1 == total {
                cb(idx + 1, total, "sweep");
            }
        }

        if referenced.contains(&blob.sha1) {
            report.blobs_referenced += 1;
            continue;
        }
        if store.is_pinned(&blob.sha1) {
            report.blobs_pinned += 1;
            continue;
        }
        if blob.modified > cutoff {
            report.blobs_recent += 1;
            continue;
        }

        if config.dry_run {
            report.blobs_deleted += 1;
            report.bytes_freed += blob.size;
            continue;
        }

        match store.delete_unpinned(&blob.sha1) {
            Ok(true) => {
                debug!(sha1 = %blob.sha1, size = blob.size, "deleted unreferenced binary");
                report.blobs_deleted += 1;
                report.bytes_freed += blob.size;
            }
            Ok(false) => report.blobs_pinned += 1,
            Err(e) => {
                warn!(sha1 = %blob.sha1, error = %e, "failed to delete binary");
                report
                    .errors
                    .push(format!("failed to delete {}: {}", blob.sha1.as_hex(), e));
            }
        }
    }

    Ok(report)
}

fn clean_staging(
    store: &BinaryStore,
    config: &GcConfig,
    report: &mut PruneReport,
    progress: Option<&GcProgressCallback<'_>>,
) -> Result<()> {
    let files = store.staging_files()?;
    if let Some(cb) = progress {
        cb(0, files.len(), "staging");
    }

    let cutoff = cutoff_time(config.grace_period);
    for (path, _size, mtime) in files {
        if mtime > cutoff {
            continue;
        }
        if config.dry_run {
            report.staging_removed += 1;
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => report.staging_removed += 1,
            Err(e) => report
                .errors
                .push(format!("failed to delete staging file {}: {}", path.display(), e)),
        }
    }
    Ok(())
}

fn cutoff_time(grace_period: Duration) -> SystemTime {
    let now = SystemTime::now();
    now.checked_sub(grace_period).unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Exclusive advisory lock held for one collection run.
struct GcLock {
    file: File,
    path: PathBuf,
}

impl GcLock {
    fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| DepotError::GcLocked(path.to_path_buf()))?;
        debug!(path = %path.display(), "acquired gc lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for GcLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release gc lock");
        }
    }
}
