//! Initialize a new storage root.

use anyhow::{Context, Result};
use depot_core::Depot;
use std::path::Path;
use std::process::ExitCode;

/// Initialize a storage root at `root`.
pub fn run(root: &Path) -> Result<ExitCode> {
    let depot = Depot::init(root)
        .with_context(|| format!("Failed to initialize depot at {}", root.display()))?;
    let layout = depot.layout();

    println!("Initialized depot in {}", root.display());
    println!();
    println!("Directory structure:");
    println!("  {}  - Repository configuration", layout.config_file().display());
    println!("  {}  - Item metadata", layout.items_db().display());
    println!("  {}  - Content-addressed binaries", layout.filestore_dir().display());
    println!();
    println!("Add [[repositories]] entries to depot.toml, then run 'depot check'.");

    Ok(ExitCode::SUCCESS)
}
