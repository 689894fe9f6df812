//! Command-line argument parsing, grounded on the
//! ferron's `clap`-derive `FerronArgs`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use certcentral_core::config::{DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH, ENV_STATE_DIR};

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Loads and validates configuration, then exits without starting the
    /// daemon. Useful for pre-deploy CI checks.
    Validate,
}

/// Centralized ACME certificate lifecycle daemon.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "certcentral", about, long_about = None)]
pub struct CertcentralArgs {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = ENV_CONFIG_PATH, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Overrides `store.base_path` from the configuration file.
    #[arg(long, env = ENV_STATE_DIR)]
    pub state_dir: Option<PathBuf>,

    /// Emits structured JSON log lines instead of the human-readable format.
    #[arg(long)]
    pub json_logs: bool,

    /// Seconds to wait for in-flight ACME orders to finish on shutdown
    /// before the process exits anyway.
    #[arg(long, default_value_t = 30)]
    pub shutdown_grace_secs: u64,

    #[command(subcommand)]
    pub command: Option<Command>,
}
