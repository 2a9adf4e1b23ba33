//! Deploy command.

use anyhow::{Context, Result};
use console::style;
use depot_core::Depot;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::ExitCode;

/// Upload `file` to `repo:path`.
pub fn run(
    root: &Path,
    repo: &str,
    path: &str,
    file: &Path,
    user: Option<&str>,
) -> Result<ExitCode> {
    let depot = Depot::open(root)?;
    let input = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;

    let item = depot.deploy(repo, path, BufReader::new(input), user)?;

    println!("{} Deployed {}", style("✓").green(), item.repo_path);
    if let Some(binary) = &item.binary {
        println!("  SHA-1:  {}", style(binary.sha1).cyan());
        println!("  MD5:    {}", binary.md5);
        println!("  Size:   {} bytes", binary.length);
    }

    Ok(ExitCode::SUCCESS)
}
