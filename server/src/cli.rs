use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "assistant", about = "Autonomous email triage service", version)]
pub struct Cli {
    /// Path to the config file (default: config/config.yaml, or
    /// ASSISTANT_CONFIG_PATH)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate the configuration file and exit
    ValidateConfig,

    /// Start the review API server and background triage scheduler
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },

    /// Run initial taxonomy discovery over recent mail
    Bootstrap {
        /// Number of days of mail to analyze
        #[arg(long, default_value_t = 90)]
        days: u32,
    },

    /// Classify recent mail without persisting suggestions
    DryRun {
        /// Number of days of mail to analyze
        #[arg(long, default_value_t = 90)]
        days: u32,
        /// Number of sample classifications to print
        #[arg(long, default_value_t = 20)]
        sample: usize,
        /// Maximum emails to process
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run the triage engine
    Triage {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
        /// Don't create suggestions
        #[arg(long)]
        dry_run: bool,
    },
}
