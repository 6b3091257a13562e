//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// syncer - declarative sync of monitoring resources
#[derive(Parser, Debug)]
#[command(name = "syncer")]
#[command(version)]
#[command(about = "Keeps declared monitoring resources in sync with a remote management API")]
pub struct Cli {
    /// Log filter, overriding the configured level (RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reconcile continuously until Ctrl+C
    Run {
        /// Configuration file
        #[arg(short, long, default_value = "syncer.toml")]
        config: PathBuf,
    },

    /// Print the action the next pass would take for each resource
    Plan {
        /// Configuration file
        #[arg(short, long, default_value = "syncer.toml")]
        config: PathBuf,

        /// Treat every created resource as due for a forced resync
        #[arg(long, default_value_t = false)]
        force_sync: bool,
    },

    /// Print the spec hash of each resource in a manifest
    Hash {
        /// Manifest file
        manifest: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_global_log_level() {
        let cli = Cli::try_parse_from(["syncer", "run", "--config", "a.toml", "--log-level", "debug"]);
        assert!(cli.is_ok());
        if let Ok(cli) = cli {
            assert_eq!(cli.log_level.as_deref(), Some("debug"));
            assert!(matches!(cli.command, Commands::Run { ref config } if config == &PathBuf::from("a.toml")));
        }
    }

    #[test]
    fn test_hash_requires_manifest() {
        assert!(Cli::try_parse_from(["syncer", "hash"]).is_err());
    }
}
