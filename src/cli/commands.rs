//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stacklift - declarative, idempotent provisioning for serverless HTTP APIs.
#[derive(Parser, Debug)]
#[command(name = "stacklift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the request file.
    #[arg(short, long, global = true, env = "STACKLIFT_REQUEST")]
    pub request: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new stacklift project.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the provisioning request.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Compute and display the provisioning plan without touching anything.
    Plan {
        /// Show per-node parameters.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Provision the stack.
    Provision {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// AWS region to provision into (defaults to the CLI's region).
        #[arg(long, env = "STACKLIFT_REGION")]
        region: Option<String>,
    },

    /// Roll back the resources recorded by the last failed run.
    Rollback {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// AWS region the resources live in.
        #[arg(long, env = "STACKLIFT_REGION")]
        region: Option<String>,
    },

    /// Inspect persisted run state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// Run-state subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show the persisted run state.
    Show,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_provision() {
        let cli = Cli::try_parse_from(["stacklift", "provision", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::Provision { yes: true, .. }));
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "stacklift",
            "--output",
            "json",
            "plan",
            "--detailed",
        ])
        .unwrap();
        assert!(matches!(cli.output, OutputFormat::Json));
        assert!(matches!(cli.command, Commands::Plan { detailed: true }));
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["stacklift", "teleport"]).is_err());
    }
}
