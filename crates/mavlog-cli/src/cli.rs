//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Data directory holding logs and settings
    #[arg(short, long)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List captured logs
    List,
    /// Upload logs to the configured collector
    Upload {
        /// Log names to upload
        names: Vec<String>,
        /// Upload every log not uploaded yet
        #[arg(short, long, conflicts_with = "names")]
        all: bool,
    },
    /// Delete logs and their uploaded markers
    Delete {
        /// Log names to delete
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Show or change upload settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective settings and paths
    Show,
    /// Change one setting
    Set {
        /// One of: email, description, upload-url, auto-upload, auto-start, delete-after-upload
        key: String,
        value: String,
    },
}
