//! unitmirror CLI
//!
//! Command-line publisher and mirror.
//!
//! # Commands
//!
//! - `publish` - Publish units as a repository under a destination root
//! - `sync` - Sync one local mirror from a manifest URL
//! - `reconcile` - Converge local mirrors toward a set of bindings
//! - `inspect` - List local mirrors and store usage
//! - `verify` - Re-hash local objects and report orphans
//!
//! Reports are printed as JSON on stdout; logs go to stderr.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use unitmirror_protocol::ReconcileOptions;

/// Content repository publisher and mirror.
#[derive(Parser)]
#[command(name = "unitmirror")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Destination root (publish) or local mirror root (everything else)
    #[arg(global = true, short, long)]
    root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish units as a repository
    Publish {
        /// Repository id
        #[arg(long)]
        repo: String,

        /// JSON file holding an array of content units
        #[arg(short, long)]
        units: PathBuf,

        /// Base URL the destination root is served under
        #[arg(long)]
        base_url: Option<String>,

        /// Advertise HTTPS to consumers
        #[arg(long)]
        https: bool,

        /// Host advertised to consumers
        #[arg(long)]
        host: Option<String>,

        /// Expose objects through symlinks instead of hard links
        #[arg(long)]
        symlink: bool,
    },

    /// Sync one mirror from its manifest
    Sync {
        /// Repository id
        #[arg(long)]
        repo: String,

        /// URL of the repository's units.json
        #[arg(short, long)]
        manifest_url: String,

        /// Content objects fetched in parallel
        #[arg(long)]
        fetch_concurrency: Option<usize>,

        /// Transport timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Converge local mirrors toward a set of bindings
    Reconcile {
        /// JSON file holding an array of bindings
        #[arg(short, long)]
        bindings: PathBuf,

        /// Reconcile every binding
        #[arg(short, long, conflicts_with = "repo")]
        all: bool,

        /// Reconcile only these repositories
        #[arg(long)]
        repo: Vec<String>,

        /// Repositories reconciled in parallel
        #[arg(short, long)]
        workers: Option<usize>,

        /// Content objects fetched in parallel per repository
        #[arg(long)]
        fetch_concurrency: Option<usize>,

        /// Transport timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// List local mirrors and store usage
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Re-hash every local object
    Verify {
        /// Delete objects no mirror references
        #[arg(short, long)]
        sweep: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Publish {
            repo,
            units,
            base_url,
            https,
            host,
            symlink,
        } => {
            let root = cli.root.ok_or("Destination root required for publish")?;
            let args = commands::publish::PublishArgs {
                base_url,
                https,
                host,
                symlink,
            };
            commands::publish::run(&root, &repo, &units, args)?;
        }
        Commands::Sync {
            repo,
            manifest_url,
            fetch_concurrency,
            timeout,
        } => {
            let root = cli.root.ok_or("Local root required for sync")?;
            let config = commands::engine_config(None, fetch_concurrency, timeout);
            commands::sync::run(&root, &repo, &manifest_url, config)?;
        }
        Commands::Reconcile {
            bindings,
            all,
            repo,
            workers,
            fetch_concurrency,
            timeout,
        } => {
            let root = cli.root.ok_or("Local root required for reconcile")?;
            let options = if repo.is_empty() {
                ReconcileOptions { all, repo_ids: None }
            } else {
                ReconcileOptions::only(repo)
            };
            let config = commands::engine_config(workers, fetch_concurrency, timeout);
            commands::reconcile::run(&root, &bindings, options, config)?;
        }
        Commands::Inspect { format } => {
            let root = cli.root.ok_or("Local root required for inspect")?;
            commands::inspect::run(&root, &format)?;
        }
        Commands::Verify { sweep } => {
            let root = cli.root.ok_or("Local root required for verify")?;
            commands::verify::run(&root, sweep)?;
        }
        Commands::Version => {
            println!("unitmirror v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn reconcile_rejects_all_with_repo() {
        let parsed = Cli::try_parse_from([
            "unitmirror", "--root", "/tmp/m", "reconcile", "--bindings", "b.json", "--all",
            "--repo", "base",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn sync_arguments() {
        let cli = Cli::try_parse_from([
            "unitmirror",
            "sync",
            "--root",
            "/tmp/m",
            "--repo",
            "base",
            "--manifest-url",
            "file:///srv/base/units.json",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/m")));
        match cli.command {
            Commands::Sync { repo, timeout, .. } => {
                assert_eq!(repo, "base");
                assert_eq!(timeout, None);
            }
            _ => panic!("expected sync"),
        }
    }
}
