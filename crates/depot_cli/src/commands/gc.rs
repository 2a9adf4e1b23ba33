//! Garbage collection command.

use anyhow::Result;
use console::style;
use depot_core::{Depot, GcConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

/// Run garbage collection.
pub fn run(root: &Path, dry_run: bool, aggressive: bool, yes: bool) -> Result<ExitCode> {
    let depot = Depot::open(root)?;

    let mut config = GcConfig {
        dry_run,
        ..depot.gc_config()
    };
    if aggressive {
        config.grace_period = Duration::ZERO;
    }

    if dry_run {
        println!(
            "{} Running GC in dry-run mode (no binaries will be deleted)...",
            style("→").cyan()
        );
    } else {
        println!();
        println!(
            "{} {}",
            style("⚠").yellow().bold(),
            style("WARNING:").yellow().bold()
        );
        println!("  Garbage collection permanently deletes binaries no item refers to.");
        if aggressive {
            println!(
                "  {} mode: no grace period, recent uploads may be deleted mid-deploy.",
                style("Aggressive").red()
            );
        } else {
            println!(
                "  Grace period: {}s. Newer binaries are kept.",
                config.grace_period.as_secs()
            );
        }
        println!(
            "  {} Run with {} first to see what would be deleted.",
            style("Tip:").cyan(),
            style("--dry-run").cyan()
        );
        println!();

        if !yes && !confirm("Continue with garbage collection? [y/N]: ")? {
            println!("{} Garbage collection cancelled.", style("✓").green());
            return Ok(ExitCode::SUCCESS);
        }
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg:20} [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("█▓▒░  "),
    );

    let pb_clone = pb.clone();
    let progress = move |current: usize, total: usize, phase: &str| {
        pb_clone.set_length(total as u64);
        pb_clone.set_position(current as u64);
        pb_clone.set_message(format!("Phase: {}", phase));
    };
    let report = depot.gc(&config, Some(&progress))?;

    pb.finish_and_clear();

    println!();
    println!("{}", style("Garbage Collection Report:").bold());
    println!("  Binaries scanned:    {}", style(report.blobs_scanned).cyan());
    println!("  Referenced:          {}", style(report.blobs_referenced).green());
    println!("  Pinned by readers:   {}", style(report.blobs_pinned).green());
    println!("  In grace period:     {}", style(report.blobs_recent).green());
    println!(
        "  Deleted:             {}",
        if report.blobs_deleted > 0 {
            style(report.blobs_deleted).yellow()
        } else {
            style(report.blobs_deleted).green()
        }
    );
    println!(
        "  Bytes freed:         {} ({:.2} MB)",
        style(report.bytes_freed).cyan(),
        report.bytes_freed as f64 / 1_048_576.0
    );
    if report.staging_removed > 0 {
        println!("  Staging files:       {}", style(report.staging_removed).yellow());
    }

    if !report.errors.is_empty() {
        println!();
        println!("{}", style("Errors encountered:").red().bold());
        for error in &report.errors {
            println!("  {} {}", style("×").red(), error);
        }
    }

    if dry_run && report.blobs_deleted > 0 {
        println!();
        println!("This was a dry run. To actually delete binaries, run:");
        println!("  {}", style("depot gc").cyan());
    } else if !dry_run && report.blobs_deleted > 0 {
        println!();
        println!(
            "{} Successfully freed {:.2} MB",
            style("✓").green(),
            report.bytes_freed as f64 / 1_048_576.0
        );
    }

    Ok(if report.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
