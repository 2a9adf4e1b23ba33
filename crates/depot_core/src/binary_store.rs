//! Content-addressed binary storage keyed by SHA-1.
//!
//! Uploads are streamed into a staging file while their checksums are
//! computed, then moved into `<filestore>/<first byte hex>/<sha1 hex>` with a
//! no-clobber rename. Two uploads of the same content race only on that
//! rename, and the loser simply discards its staging copy.

use crate::checksum::{ChecksumReader, Md5, Sha1};
use crate::config::StorageConfig;
use crate::error::{DepotError, Result};
use crate::gc::{self, GcConfig, PruneReport, ReferenceIndex};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

/// Name of the staging directory inside the filestore.
pub const STAGING_DIR_NAME: &str = "_pre";

/// File name of the collection lock inside the filestore.
pub const GC_LOCK_NAME: &str = ".gc.lock";

/// Checksums and length of one stored binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinaryRecord {
    /// SHA-1 of the content; also its storage key.
    pub sha1: Sha1,
    /// MD5 of the content.
    pub md5: Md5,
    /// Content length in bytes.
    pub length: u64,
}

/// A blob found on disk by a filestore listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    /// Storage key.
    pub sha1: Sha1,
    /// Size on disk.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

type PinTable = Arc<Mutex<HashMap<Sha1, usize>>>;

fn lock_pins(pins: &Mutex<HashMap<Sha1, usize>>) -> MutexGuard<'_, HashMap<Sha1, usize>> {
    // The table holds plain counters; a panic elsewhere cannot leave it torn.
    pins.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Content-addressed binary store.
///
/// `BinaryStore` is `Send + Sync` and every operation takes `&self`, so one
/// instance can serve concurrent uploads and readers.
///
/// # Examples
///
/// ```
/// use depot_core::{BinaryStore, Sha1};
/// use std::io::Read;
/// use tempfile::TempDir;
///
/// let tmp = TempDir::new().unwrap();
/// let store = BinaryStore::new(tmp.path().join("filestore"));
///
/// let record = store.add_stream(&b"hello world"[..]).unwrap();
/// assert_eq!(record.sha1, Sha1::digest(b"hello world"));
/// assert_eq!(record.length, 11);
///
/// let mut blob = store.open(&record.sha1).unwrap();
/// let mut content = String::new();
/// blob.read_to_string(&mut content).unwrap();
/// assert_eq!(content, "hello world");
/// ```
#[derive(Debug)]
pub struct BinaryStore {
    root: PathBuf,
    staging: PathBuf,
    reject_length_mismatch: bool,
    fsync: bool,
    pins: PinTable,
}

impl BinaryStore {
    /// Creates a store rooted at `root` with default storage settings.
    ///
    /// Directories are created lazily on first write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_config(root, &StorageConfig::default())
    }

    /// Creates a store rooted at `root` with explicit settings.
    pub fn with_config(root: impl AsRef<Path>, config: &StorageConfig) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            staging: root.join(STAGING_DIR_NAME),
            root,
            reject_length_mismatch: config.reject_length_mismatch,
            fsync: config.fsync,
            pins: Arc::default(),
        }
    }

    /// The filestore root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding uploads in flight.
    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    /// Path of the collection lock file.
    pub fn gc_lock_path(&self) -> PathBuf {
        self.root.join(GC_LOCK_NAME)
    }

    /// Storage path for `sha1`, whether or not the blob exists.
    pub fn blob_path(&self, sha1: &Sha1) -> PathBuf {
        self.root.join(sha1.shard()).join(sha1.as_hex())
    }

    /// True when a blob with this checksum is stored.
    pub fn exists(&self, sha1: &Sha1) -> bool {
        self.blob_path(sha1).is_file()
    }

    /// Streams `input` into the store and returns its checksums.
    ///
    /// The content is never buffered in memory. Storing content that is
    /// already present, including content a concurrent call stores first,
    /// succeeds with the same record and leaves exactly one file on disk.
    ///
    /// # Errors
    ///
    /// I/O errors while staging are returned and the staging file is removed.
    /// Returns `LengthMismatch` when the staged file's length differs from
    /// the bytes hashed, unless the store was configured to tolerate it.
    pub fn add_stream<R: Read>(&self, input: R) -> Result<BinaryRecord> {
        fs::create_dir_all(&self.staging)?;
        let mut staged = StagingFile::create(&self.staging)?;

        let mut reader = ChecksumReader::new(input);
        io::copy(&mut reader, staged.handle()?)?;
        let (sha1, md5, length) = reader.finish();

        staged.flush(self.fsync)?;
        self.check_length(length, staged.len()?)?;

        let record = BinaryRecord { sha1, md5, length };
        let target = self.blob_path(&sha1);

        if target.exists() {
            debug!(sha1 = %sha1, length, "binary already stored");
            refresh_mtime(&target);
            return Ok(record);
        }

        let shard_dir = self.root.join(sha1.shard());
        fs::create_dir_all(&shard_dir)?;

        if staged.persist_noclobber(&target)? {
            if self.fsync {
                sync_dir(&shard_dir);
            }
            debug!(sha1 = %sha1, length, "binary stored");
        } else {
            debug!(sha1 = %sha1, "concurrent upload stored binary first");
            refresh_mtime(&target);
        }

        Ok(record)
    }

    /// Opens a stored blob for reading and pins it against collection.
    ///
    /// The pin is held until the returned [`PinnedBlob`] is dropped.
    ///
    /// # Errors
    ///
    /// Returns `BinaryNotFound` when no blob has this checksum.
    pub fn open(&self, sha1: &Sha1) -> Result<PinnedBlob> {
        let pin = Pin::acquire(&self.pins, *sha1);
        let file = match File::open(self.blob_path(sha1)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(DepotError::BinaryNotFound(sha1.as_hex()))
            }
            Err(e) => return Err(e.into()),
        };
        let length = file.metadata()?.len();
        Ok(PinnedBlob {
            sha1: *sha1,
            length,
            file,
            _pin: pin,
        })
    }

    /// True while at least one reader holds `sha1` open.
    pub fn is_pinned(&self, sha1: &Sha1) -> bool {
        lock_pins(&self.pins).contains_key(sha1)
    }

    /// Names of the shard directories present on disk, sorted.
    pub fn shards(&self) -> Result<Vec<String>> {
        let mut shards = Vec::new();
        if !self.root.exists() {
            return Ok(shards);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_shard_name(name) {
                    shards.push(name.to_string());
                }
            }
        }
        shards.sort();
        Ok(shards)
    }

    /// Lists the blobs of one shard.
    ///
    /// Files whose name is not a SHA-1 belonging to the shard are skipped;
    /// `verify` reports them.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChecksum` when `shard` is not two lowercase hex digits.
    pub fn list_shard(&self, shard: &str) -> Result<Vec<BlobEntry>> {
        if !is_shard_name(shard) {
            return Err(DepotError::InvalidChecksum(format!("invalid shard name: {}", shard)));
        }

        let mut blobs = Vec::new();
        let dir = self.root.join(shard);
        if !dir.is_dir() {
            return Ok(blobs);
        }

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let parsed = entry
                .file_name()
                .to_str()
                .and_then(|name| parse_blob_name(name, shard));
            let Some(sha1) = parsed else {
                debug!(path = %entry.path().display(), "skipping non-blob file in filestore");
                continue;
            };
            blobs.push(BlobEntry {
                sha1,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or_else(|_| SystemTime::now()),
            });
        }

        blobs.sort_by(|a, b| a.sha1.cmp(&b.sha1));
        Ok(blobs)
    }

    /// Lists every blob in the store, ordered by checksum.
    pub fn list_all(&self) -> Result<Vec<BlobEntry>> {
        let mut blobs = Vec::new();
        for shard in self.shards()? {
            blobs.extend(self.list_shard(&shard)?);
        }
        Ok(blobs)
    }

    /// Deletes the unreferenced, unpinned blobs of one shard.
    ///
    /// Per-file delete failures are collected in the report and the sweep
    /// continues. No grace period applies; use [`gc`](Self::gc) for a full,
    /// locked collection.
    ///
    /// # Errors
    ///
    /// Fails when the shard cannot be listed or the index cannot be queried.
    pub fn prune_files(&self, shard: &str, index: &dyn ReferenceIndex) -> Result<PruneReport> {
        let blobs = self.list_shard(shard)?;
        gc::sweep(self, blobs, index, &GcConfig::immediate(), None)
    }

    /// Collects every unreferenced blob under the exclusive collection lock.
    ///
    /// See [`gc`](fn@crate::gc).
    pub fn gc(
        &self,
        index: &dyn ReferenceIndex,
        config: &GcConfig,
        progress: Option<&gc::GcProgressCallback<'_>>,
    ) -> Result<PruneReport> {
        gc::gc(self, index, config, progress)
    }

    /// Files left in the staging directory, with size and mtime.
    pub(crate) fn staging_files(&self) -> Result<Vec<(PathBuf, u64, SystemTime)>> {
        let mut files = Vec::new();
        if !self.staging.is_dir() {
            return Ok(files);
        }
        for entry in fs::read_dir(&self.staging)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                let mtime = metadata.modified().unwrap_or_else(|_| SystemTime::now());
                files.push((entry.path(), metadata.len(), mtime));
            }
        }
        Ok(files)
    }

    /// Removes a blob unless a reader has it pinned.
    ///
    /// Returns false when the blob was pinned and left alone. The pin table
    /// stays locked across the removal so no reader can pin it halfway.
    pub(crate) fn delete_unpinned(&self, sha1: &Sha1) -> Result<bool> {
        let pins = lock_pins(&self.pins);
        if pins.contains_key(sha1) {
            return Ok(false);
        }
        fs::remove_file(self.blob_path(sha1))?;
        drop(pins);
        Ok(true)
    }

    fn check_length(&self, hashed: u64, on_disk: u64) -> Result<()> {
        if hashed == on_disk {
            return Ok(());
        }
        error!(
            hashed,
            on_disk, "staged binary length does not match the bytes read"
        );
        if self.reject_length_mismatch {
            Err(DepotError::LengthMismatch {
                expected: hashed,
                actual: on_disk,
            })
        } else {
            Ok(())
        }
    }
}

/// Parses a blob file name. Only the lowercase hex of a checksum that
/// belongs in `shard` names a blob.
pub(crate) fn parse_blob_name(name: &str, shard: &str) -> Option<Sha1> {
    Sha1::from_hex(name)
        .ok()
        .filter(|sha1| sha1.as_hex() == name && sha1.shard() == shard)
}

fn is_shard_name(name: &str) -> bool {
    name.len() == 2
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Bumps a deduplicated blob's mtime so the collection grace period covers
/// the upload that just referenced it.
fn refresh_mtime(path: &Path) {
    let result = File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(SystemTime::now()));
    if let Err(e) = result {
        debug!(path = %path.display(), error = %e, "could not refresh blob mtime");
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    let result = File::open(dir).and_then(|dir_file| dir_file.sync_all());
    if let Err(e) = result {
        warn!(dir = %dir.display(), error = %e, "failed to sync filestore directory");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// A staging file that deletes itself unless it was moved into place.
struct StagingFile {
    file: Option<NamedTempFile>,
}

impl StagingFile {
    fn create(dir: &Path) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        Ok(Self { file: Some(file) })
    }

    fn handle(&mut self) -> io::Result<&mut NamedTempFile> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("staging file already moved"))
    }

    fn flush(&mut self, fsync: bool) -> io::Result<()> {
        let file = self.handle()?;
        file.flush()?;
        if fsync {
            file.as_file().sync_all()?;
        }
        Ok(())
    }

    fn len(&mut self) -> io::Result<u64> {
        Ok(self.handle()?.as_file().metadata()?.len())
    }

    /// Moves the file to `target` unless something is already there.
    ///
    /// Returns false when `target` already existed; the staging file is then
    /// deleted on drop.
    fn persist_noclobber(mut self, target: &Path) -> Result<bool> {
        let Some(file) = self.file.take() else {
            return Err(io::Error::other("staging file already moved").into());
        };
        match file.persist_noclobber(target) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                self.file = Some(e.file);
                Ok(false)
            }
            Err(e) => {
                self.file = Some(e.file);
                Err(e.error.into())
            }
        }
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                warn!(path = %path.display(), error = %e, "failed to delete staging file");
            }
        }
    }
}

/// Reader registration that keeps one blob alive until dropped.
#[derive(Debug)]
struct Pin {
    pins: PinTable,
    sha1: Sha1,
}

impl Pin {
    fn acquire(pins: &PinTable, sha1: Sha1) -> Self {
        *lock_pins(pins).entry(sha1).or_insert(0) += 1;
        Self {
            pins: Arc::clone(pins),
            sha1,
        }
    }
}

impl Drop for Pin {
    fn drop(&mut self) {
        let mut pins = lock_pins(&self.pins);
        if let Entry::Occupied(mut count) = pins.entry(self.sha1) {
            *count.get_mut() -= 1;
            if *count.get() == 0 {
                count.remove();
            }
        }
    }
}

/// An open blob. Collection skips it while this handle is alive.
#[derive(Debug)]
pub struct PinnedBlob {
    sha1: Sha1,
    length: u64,
    file: File,
    _pin: Pin,
}

impl PinnedBlob {
    /// Checksum of the open blob.
    pub fn sha1(&self) -> &Sha1 {
        &self.sha1
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        self.length
    }

    /// True for the empty blob.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl Read for PinnedBlob {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}
