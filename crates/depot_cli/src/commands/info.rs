//! Item information command.

use anyhow::{bail, Result};
use chrono::DateTime;
use console::style;
use depot_core::{Depot, ItemMetadata, RepoDescriptor, RepoPath};
use serde_json::json;
use std::path::Path;
use std::process::ExitCode;

/// Show metadata of `repo:path`. A virtual `repo` is searched through its members.
pub fn run(root: &Path, repo: &str, path: &str, format: &str) -> Result<ExitCode> {
    let depot = Depot::open(root)?;

    let item = match depot.graph().get(repo) {
        Some(RepoDescriptor::Virtual(_)) => depot.find(repo, path)?,
        _ => depot.info(&RepoPath::new(repo, path))?,
    };

    let Some(item) = item else {
        println!("{} {}:{} not found", style("×").red(), repo, path);
        return Ok(ExitCode::FAILURE);
    };

    match format {
        "json" => {
            let output = json!({
                "repo": item.repo_path.repo_key(),
                "path": item.repo_path.path(),
                "sha1": item.sha1().map(|s| s.as_hex()),
                "md5": item.binary.map(|b| b.md5.as_hex()),
                "size": item.size(),
                "created": item.created,
                "last_modified": item.last_modified,
                "modified_by": &item.modified_by,
                "stored": item.sha1().map(|s| depot.binary_store().exists(s)),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "text" => print_text(&depot, &item),
        other => bail!("Unsupported format: {}. Use 'json' or 'text'.", other),
    }

    Ok(ExitCode::SUCCESS)
}

fn print_text(depot: &Depot, item: &ItemMetadata) {
    println!("{}", style(&item.repo_path).bold());
    match &item.binary {
        Some(binary) => {
            let stored = depot.binary_store().exists(&binary.sha1);
            println!("  SHA-1:          {}", style(binary.sha1).cyan());
            println!("  MD5:            {}", binary.md5);
            println!("  Size:           {} bytes", binary.length);
            if !stored {
                println!(
                    "  {} binary is missing from the filestore",
                    style("⚠").yellow()
                );
            }
        }
        None => println!("  (no binary)"),
    }
    println!("  Created:        {}", timestamp(item.created));
    println!("  Last modified:  {}", timestamp(item.last_modified));
    if let Some(by) = &item.modified_by {
        println!("  Modified by:    {}", by);
    }
}

fn timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}
