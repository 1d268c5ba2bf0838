use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `cogito` - operator tools for the LLM reliability layer.
#[derive(Parser, Debug)]
#[command(name = "cogito")]
#[command(version = "0.1.0")]
#[command(about = "Inspect completions and read the reasoning log.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read the per-session reasoning log
    Log {
        #[command(subcommand)]
        log_command: LogCommands,
    },

    /// Run a completion through the validator and print the verdict as JSON
    Check {
        /// Read the completion from a file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum LogCommands {
    /// Print an entry (1 = latest)
    Show {
        #[arg(default_value = "1")]
        index: usize,

        /// Session id, e.g. `qq:group:123`
        #[arg(short, long)]
        session: String,
    },

    /// Ask the configured provider to summarize an entry
    Summarize {
        #[arg(default_value = "1")]
        index: usize,

        #[arg(short, long)]
        session: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the configuration after env overrides, as TOML
    Show,
}
