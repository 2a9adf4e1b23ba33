//! Filestore verification command.

use anyhow::Result;
use console::style;
use depot_core::{Depot, VerifyConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

/// Verify filestore integrity.
pub fn run(root: &Path, quick: bool) -> Result<ExitCode> {
    let depot = Depot::open(root)?;

    let config = VerifyConfig {
        check_content: !quick,
        ..VerifyConfig::default()
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message(if quick {
        "Verifying filestore layout..."
    } else {
        "Verifying binary integrity..."
    });
    spinner.enable_steady_tick(Duration::from_millis(100));

    let report = depot.verify(&config)?;

    spinner.finish_and_clear();

    println!();
    println!("{}", style("Verification Report:").bold());
    println!("  Binaries checked:   {}", style(report.blobs_checked).cyan());
    if !report.corrupted.is_empty() {
        println!("  Corrupted:          {}", style(report.corrupted.len()).red());
        for blob in &report.corrupted {
            match &blob.actual {
                Some(actual) => println!(
                    "    {} {} (content hashes to {})",
                    style("×").red(),
                    blob.expected,
                    actual
                ),
                None => println!("    {} {} (unreadable)", style("×").red(), blob.expected),
            }
        }
    }
    if !report.strays.is_empty() {
        println!("  Stray files:        {}", style(report.strays.len()).yellow());
        for path in &report.strays {
            println!("    {} {}", style("⚠").yellow(), path.display());
        }
    }

    println!("  Items checked:      {}", style(report.items_checked).cyan());
    if !report.dangling_items.is_empty() {
        println!(
            "  Missing binaries:   {}",
            style(report.dangling_items.len()).red()
        );
        for path in &report.dangling_items {
            println!("    {} {}", style("×").red(), path);
        }
    }

    println!();
    if !report.has_issues() {
        println!("{} {}", style("✓").green(), style(report.summary()).green());
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", style(report.summary()).yellow().bold());
    println!();
    println!("{}", style("Recommendations:").bold());
    if !report.corrupted.is_empty() || !report.dangling_items.is_empty() {
        println!(
            "  {} Redeploy the affected items, then run {}",
            style("→").cyan(),
            style("depot gc").cyan()
        );
    }
    if !report.strays.is_empty() {
        println!(
            "  {} Stray files are never touched by GC and can be removed by hand",
            style("→").cyan()
        );
    }
    Ok(ExitCode::FAILURE)
}
