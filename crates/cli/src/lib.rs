use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "peermatch")]
#[command(about = "PeerMatch - Difficulty-based matchmaking for peer coding sessions")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the matchmaking service with the given configuration
    Start {
        /// Path to the configuration file
        #[arg(short, long, default_value = "master_config/peermatch.yaml")]
        config: PathBuf,

        /// Override the matching domain
        #[arg(long)]
        domain: Option<String>,

        /// Override the metrics port
        #[arg(long)]
        metrics_port: Option<u16>,

        /// Do not start the background queue worker
        #[arg(long)]
        no_worker: bool,
    },

    /// Validate configuration without starting the service
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "master_config/peermatch.yaml")]
        config: PathBuf,
    },

    /// Initialize a new configuration file with all defaults
    Init {
        /// Output path for the new configuration file
        #[arg(short, long, default_value = "peermatch.yaml")]
        output: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
