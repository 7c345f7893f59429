//! CLI command definitions for the `tabula` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod inspect;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::state::ConfigOverrides;

/// Clean tabular data by talking to it.
#[derive(Parser)]
#[command(name = "tabula", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// Failed attempts allowed per request before giving up.
    #[arg(long, global = true, env = "TABULA_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Model used by the proposal generator.
    #[arg(long, global = true, env = "TABULA_MODEL")]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default tracing filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,tabula=debug",
            _ => "trace",
        }
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            max_retries: self.max_retries,
            model: self.model.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start an interactive cleaning session on a CSV file.
    Chat {
        /// Dataset to load.
        file: PathBuf,
    },

    /// Print column statistics for a CSV file.
    Inspect {
        /// Dataset to summarize.
        file: PathBuf,
    },

    /// Start the HTTP/WebSocket server.
    Serve {
        /// Port to listen on.
        #[arg(long, env = "TABULA_PORT")]
        port: Option<u16>,

        /// Host to bind to.
        #[arg(long, env = "TABULA_HOST")]
        host: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_parse_chat_with_overrides() {
        let cli = Cli::try_parse_from(["tabula", "chat", "titanic.csv", "--max-retries", "5"]).unwrap();
        assert!(matches!(&cli.command, Commands::Chat { file } if file == &PathBuf::from("titanic.csv")));
        assert_eq!(cli.overrides().max_retries, Some(5));
    }

    #[test]
    fn test_log_filter_follows_verbosity() {
        let quiet = Cli::try_parse_from(["tabula", "--quiet", "inspect", "a.csv"]).unwrap();
        assert_eq!(quiet.log_filter(), "error");
        let verbose = Cli::try_parse_from(["tabula", "-vv", "inspect", "a.csv"]).unwrap();
        assert_eq!(verbose.log_filter(), "trace");
    }

    #[test]
    fn test_parse_serve_port() {
        let cli = Cli::try_parse_from(["tabula", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { port: Some(9000), .. }));
    }
}
