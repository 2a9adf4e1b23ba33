use anyhow::{bail, Context, Result};
use depot_core::{Config, Depot};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A storage root in a temporary directory, removed on drop
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// A workspace with nothing in it
    pub fn empty() -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp directory")?;
        Ok(Self { dir })
    }

    /// A workspace seeded with the files of `fixtures/<name>`
    pub fn from_fixture(name: &str) -> Result<Self> {
        let source = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("fixtures")
            .join(name);
        if !source.is_dir() {
            bail!("Fixture not found: {}", source.display());
        }

        let workspace = Self::empty()?;
        for entry in fs::read_dir(&source)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::copy(entry.path(), workspace.path().join(entry.file_name()))
                    .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
            }
        }
        Ok(workspace)
    }

    /// Storage root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Initialize a depot from the workspace's depot.toml, if any
    pub fn init_depot(&self) -> Result<Depot> {
        let config = Config::load(self.path())?;
        Ok(Depot::init_with_config(self.path(), config)?)
    }

    /// Open the depot created by `init_depot`
    pub fn open_depot(&self) -> Result<Depot> {
        Ok(Depot::open(self.path())?)
    }

    /// Write a file relative to the storage root
    pub fn write_file(&self, name: &str, content: &[u8]) -> Result<()> {
        let target = self.path().join(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content).with_context(|| format!("Failed to write {}", name))
    }
}
