//! Virtual repository resolution command.

use anyhow::{bail, Result};
use console::style;
use depot_core::{Depot, RealRepo};
use serde_json::json;
use std::path::Path;
use std::process::ExitCode;

/// Print the search order of `virtual_key`.
pub fn run(root: &Path, virtual_key: &str, path: Option<&str>, format: &str) -> Result<ExitCode> {
    let depot = Depot::open(root)?;
    let resolved = depot.resolve(virtual_key)?;

    let repos = match path {
        Some(path) => resolved.search_order(path),
        None => resolved.ordered_repos(),
    };

    match format {
        "json" => {
            let output = json!({
                "virtual": virtual_key,
                "path": path,
                "has_cycle": resolved.has_cycle(),
                "virtual_repos": resolved.virtual_repos().iter().map(|v| &v.key).collect::<Vec<_>>(),
                "search_order": repos.iter().map(|r| json!({
                    "key": r.key(),
                    "kind": kind(r),
                })).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "text" => {
            println!("{}", style(format!("Search order for {}:", virtual_key)).bold());
            if repos.is_empty() {
                println!("  (no repository admits this path)");
            }
            for (i, repo) in repos.iter().enumerate() {
                println!("  {:>2}. {} ({})", i + 1, style(repo.key()).cyan(), kind(repo));
            }
            if resolved.has_cycle() {
                println!();
                println!(
                    "{} Membership graph contains a cycle. Run {} for details.",
                    style("⚠").yellow(),
                    style("depot check").cyan()
                );
            }
        }
        other => bail!("Unsupported format: {}. Use 'json' or 'text'.", other),
    }

    Ok(ExitCode::SUCCESS)
}

fn kind(repo: &RealRepo<'_>) -> &'static str {
    match repo {
        RealRepo::Local(_) => "local",
        RealRepo::Remote(_) => "remote",
    }
}
