//! Entry point for the `certcentral` daemon binary.
//!
//! Mirrors ferron's `main`/`before_starting_server` split
//! (`ferron/src/main.rs`): argument parsing and logging setup live here,
//! the actual engine lifecycle lives in [`daemon::run`]. Unlike the
//! reference binary, reload never re-execs `before_starting_server` in a
//! loop — it calls [`certcentral_core::Engine::reconcile`] on the already
//! running engine instead, since in-flight ACME orders must survive a
//! SIGHUP.

mod cli;
mod daemon;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use cli::{Command, CertcentralArgs};

/// Process exit codes.
const EXIT_OK: u8 = 0;
const EXIT_CONFIG_INVALID: u8 = 64;
const EXIT_STORE_UNWRITABLE: u8 = 69;
const EXIT_INTERNAL: u8 = 70;

fn main() -> ExitCode {
    let args = CertcentralArgs::parse();

    let config = match certcentral_core::config::load_from_file(&args.config, args.state_dir.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(EXIT_CONFIG_INVALID);
        }
    };

    if args.command == Some(Command::Validate) {
        println!("configuration at {} is valid", args.config.display());
        return ExitCode::from(EXIT_OK);
    }

    logging::init(args.json_logs);

    if let Err(e) = daemon::check_store_writable(&config.store.base_path) {
        error!(path = %config.store.base_path.display(), error = %e, "store path is not writable");
        return ExitCode::from(EXIT_STORE_UNWRITABLE);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(EXIT_INTERNAL);
        }
    };

    match runtime.block_on(daemon::run(args, config)) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            error!(error = %e, "daemon exited with an error");
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}
