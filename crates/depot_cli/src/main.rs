//! Depot CLI - Command-line interface for a depot storage root.

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use depot_core::DepotError;
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;

#[derive(Parser)]
#[command(name = "depot")]
#[command(about = "Artifact storage with virtual repositories", long_about = None)]
#[command(version)]
struct Cli {
    /// Storage root
    #[arg(long, global = true, env = "DEPOT_ROOT", default_value = ".depot")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new storage root
    Init,
    /// Show the search order of a virtual repository
    Resolve {
        /// Virtual repository key
        virtual_key: String,
        /// Only list repositories whose patterns admit this path
        #[arg(long)]
        path: Option<String>,
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Store a file at a path in a local repository
    Deploy {
        /// Target local repository
        repo: String,
        /// Path inside the repository
        path: String,
        /// File to upload
        file: PathBuf,
        /// Recorded as the author of the change
        #[arg(long)]
        user: Option<String>,
    },
    /// Show stored metadata of an item
    Info {
        /// Repository key (a virtual key searches its members)
        repo: String,
        /// Path inside the repository
        path: String,
        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Delete binaries no item refers to
    Gc {
        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
        /// Ignore the grace period
        #[arg(long)]
        aggressive: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Check filestore and item integrity
    Verify {
        /// Skip re-hashing blob content
        #[arg(long)]
        quick: bool,
    },
    /// Validate the repository configuration
    Check,
}

fn main() -> ExitCode {
    // Respects RUST_LOG environment variable (e.g., RUST_LOG=depot_core=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let root = cli.root.as_path();
    match cli.command {
        Commands::Init => commands::init::run(root),
        Commands::Resolve {
            virtual_key,
            path,
            format,
        } => commands::resolve::run(root, &virtual_key, path.as_deref(), &format),
        Commands::Deploy {
            repo,
            path,
            file,
            user,
        } => commands::deploy::run(root, &repo, &path, &file, user.as_deref()),
        Commands::Info { repo, path, format } => commands::info::run(root, &repo, &path, &format),
        Commands::Gc {
            dry_run,
            aggressive,
            yes,
        } => commands::gc::run(root, dry_run, aggressive, yes),
        Commands::Verify { quick } => commands::verify::run(root, quick),
        Commands::Check => commands::check::run(root),
    }
}

fn report_error(error: &anyhow::Error) {
    eprintln!("{} {:#}", style("error:").red().bold(), error);
    if let Some(suggestion) = error
        .downcast_ref::<DepotError>()
        .and_then(DepotError::recovery_suggestion)
    {
        eprintln!("  {} {}", style("hint:").cyan(), suggestion);
    }
}
