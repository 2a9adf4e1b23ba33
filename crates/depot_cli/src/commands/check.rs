//! Configuration check command.

use anyhow::Result;
use console::style;
use depot_core::Depot;
use std::path::Path;
use std::process::ExitCode;

/// Resolve every virtual repository and report cycles.
pub fn run(root: &Path) -> Result<ExitCode> {
    let depot = Depot::open(root)?;
    let cyclic = depot.check()?;

    println!(
        "{} {} repositories configured",
        style("→").cyan(),
        depot.graph().len()
    );

    if cyclic.is_empty() {
        println!("{} No cycles between virtual repositories", style("✓").green());
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{} {}",
        style("⚠").yellow().bold(),
        style("Virtual repositories with cyclic membership:").yellow()
    );
    for key in &cyclic {
        println!("  {} {}", style("⚠").yellow(), key);
    }
    println!("  Cycles are cut during resolution, but the membership is likely a mistake.");
    Ok(ExitCode::SUCCESS)
}
