//! Filestore integrity checks.

use crate::binary_store::{parse_blob_name, BinaryStore, GC_LOCK_NAME, STAGING_DIR_NAME};
use crate::checksum::{ChecksumReader, Sha1};
use crate::error::Result;
use crate::item_store::ItemStore;
use crate::repo_path::RepoPath;
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Configuration for verification.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// Re-hash every blob and compare with its file name (slow).
    pub check_content: bool,

    /// Check that every item's binary exists in the filestore.
    pub check_items: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            check_content: true,
            check_items: true,
        }
    }
}

/// A blob whose content does not hash to its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptedBlob {
    /// The name the blob is stored under.
    pub expected: Sha1,
    /// What the content actually hashes to, when it could be read.
    pub actual: Option<Sha1>,
    /// Path on disk.
    pub path: PathBuf,
}

/// Report from verification.
#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Blobs checked.
    pub blobs_checked: usize,

    /// Blobs whose content does not match their name.
    pub corrupted: Vec<CorruptedBlob>,

    /// Files or directories in the filestore that are not blobs.
    pub strays: Vec<PathBuf>,

    /// Items checked.
    pub items_checked: usize,

    /// Items pointing at a binary that is not stored.
    pub dangling_items: Vec<RepoPath>,
}

impl VerifyReport {
    /// Returns true if any issues were found.
    pub fn has_issues(&self) -> bool {
        !self.corrupted.is_empty() || !self.strays.is_empty() || !self.dangling_items.is_empty()
    }

    /// Returns a summary message.
    pub fn summary(&self) -> String {
        if !self.has_issues() {
            return "Filestore is healthy. No issues found.".to_string();
        }
        let mut issues = Vec::new();
        if !self.corrupted.is_empty() {
            issues.push(format!("{} corrupted binaries", self.corrupted.len()));
        }
        if !self.strays.is_empty() {
            issues.push(format!("{} stray files", self.strays.len()));
        }
        if !self.dangling_items.is_empty() {
            issues.push(format!("{} items with missing binaries", self.dangling_items.len()));
        }
        format!("Filestore has issues: {}", issues.join(", "))
    }
}

/// Verifies the filestore, and optionally the items pointing into it.
///
/// # Examples
///
/// ```
/// use depot_core::{verify, BinaryStore, VerifyConfig};
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let store = BinaryStore::new(tmp.path());
/// store.add_stream(&b"content"[..]).unwrap();
///
/// let report = verify(&store, None, &VerifyConfig::default()).unwrap();
/// assert!(!report.has_issues(), "{}", report.summary());
/// ```
pub fn verify(
    store: &BinaryStore,
    items: Option<&ItemStore>,
    config: &VerifyConfig,
) -> Result<VerifyReport> {
    let mut report = VerifyReport::default();

    find_strays(store, &mut report)?;

    for shard in store.shards()? {
        for blob in store.list_shard(&shard)? {
            report.blobs_checked += 1;
            if config.check_content {
                check_blob(store, &blob.sha1, &mut report);
            }
        }
    }

    if config.check_items {
        if let Some(items) = items {
            check_items(store, items, &mut report)?;
        }
    }

    debug!(
        blobs = report.blobs_checked,
        items = report.items_checked,
        issues = report.has_issues(),
        "verification finished"
    );
    Ok(report)
}

fn find_strays(store: &BinaryStore, report: &mut VerifyReport) -> Result<()> {
    if !store.root().is_dir() {
        return Ok(());
    }

    let shards = store.shards()?;
    for entry in fs::read_dir(store.root())? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_dir = entry.file_type()?.is_dir();

        if (is_dir && name == STAGING_DIR_NAME) || (!is_dir && name == GC_LOCK_NAME) {
            continue;
        }
        if !is_dir || !shards.iter().any(|s| s.as_str() == name) {
            report.strays.push(entry.path());
            continue;
        }

        for inner in fs::read_dir(entry.path())? {
            let inner = inner?;
            let belongs = inner.file_type()?.is_file()
                && inner
                    .file_name()
                    .to_str()
                    .and_then(|n| parse_blob_name(n, &name))
                    .is_some();
            if !belongs {
                report.strays.push(inner.path());
            }
        }
    }
    Ok(())
}

fn check_blob(store: &BinaryStore, expected: &Sha1, report: &mut VerifyReport) {
    let path = store.blob_path(expected);
    let actual = File::open(&path).and_then(|file| {
        let mut reader = ChecksumReader::new(file);
        io::copy(&mut reader, &mut io::sink())?;
        Ok(reader.finish().0)
    });

    match actual {
        Ok(actual) if actual == *expected => {}
        Ok(actual) => {
            warn!(expected = %expected, actual = %actual, "binary content does not match its name");
            report.corrupted.push(CorruptedBlob {
                expected: *expected,
                actual: Some(actual),
                path,
            });
        }
        Err(e) => {
            warn!(expected = %expected, error = %e, "binary could not be read");
            report.corrupted.push(CorruptedBlob {
                expected: *expected,
                actual: None,
                path,
            });
        }
    }
}

fn check_items(store: &BinaryStore, items: &ItemStore, report: &mut VerifyReport) -> Result<()> {
    for metadata in items.all()? {
        report.items_checked += 1;
        if let Some(sha1) = metadata.sha1() {
            if !store.exists(sha1) {
                report.dangling_items.push(metadata.repo_path.clone());
            }
        }
    }
    Ok(())
}
