//! Daemon lifecycle: engine startup, SIGHUP reload, and graceful shutdown.
//!
//! Grounded on `ferron/src/server.rs`'s signal-handling block: a dedicated
//! task for `SIGHUP` and another for `ctrl_c`/`SIGTERM`, both racing a
//! shared [`CancellationToken`]. Ferron resolves a reload
//! by breaking out of its event loop and having `main` call
//! `before_starting_server` again from scratch; this daemon instead calls
//! [`certcentral_core::Engine::reconcile`] on the live engine so in-flight
//! ACME orders are never interrupted by a reload.

use std::path::Path;
use std::sync::Arc;

use certcentral_core::{Config, Engine};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::CertcentralArgs;

/// Fails if `base_path` cannot be created and written to. Kept out of
/// `certcentral-core` because it is purely a startup preflight for this
/// binary's exit-code contract rather than a property the
/// library itself needs to enforce on every call.
pub fn check_store_writable(base_path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(base_path)?;
    let probe = base_path.join(".certcentral-write-probe");
    std::fs::write(&probe, b"ok")?;
    std::fs::remove_file(&probe)?;
    Ok(())
}

pub async fn run(args: CertcentralArgs, config: Config) -> anyhow::Result<()> {
    let engine = Arc::new(Engine::new(config).await?);
    let cancellation = CancellationToken::new();

    let run_handle = {
        let engine = engine.clone();
        let cancellation = cancellation.clone();
        tokio::spawn(async move { engine.run(cancellation).await })
    };

    let reload_config_path = args.config.clone();
    let reload_state_dir = args.state_dir.clone();

    #[cfg(unix)]
    {
        let engine = engine.clone();
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            let Ok(mut hangup) = signal::unix::signal(signal::unix::SignalKind::hangup()) else {
                warn!("failed to install SIGHUP handler, reload-on-signal is unavailable");
                return;
            };
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    signalled = hangup.recv() => {
                        if signalled.is_none() {
                            return;
                        }
                        info!("received SIGHUP, reloading configuration");
                        match certcentral_core::config::load_from_file(&reload_config_path, reload_state_dir.as_deref()) {
                            Ok(new_config) => engine.reconcile(new_config).await,
                            Err(e) => warn!(error = %e, "reload failed, continuing with the previous configuration"),
                        }
                    }
                }
            }
        });
    }

    let shutdown_signal = {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                let Ok(mut terminate) = signal::unix::signal(signal::unix::SignalKind::terminate()) else {
                    let _ = signal::ctrl_c().await;
                    cancellation.cancel();
                    return;
                };
                tokio::select! {
                    _ = signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                    _ = cancellation.cancelled() => {}
                }
            }
            #[cfg(not(unix))]
            {
                tokio::select! {
                    _ = signal::ctrl_c() => {}
                    _ = cancellation.cancelled() => {}
                }
            }
            info!("received shutdown signal, waiting for in-flight orders to finish");
            cancellation.cancel();
        })
    };

    // Blocks until ctrl_c/SIGTERM fires and the listener task cancels the
    // token; an unexpected join failure there is not fatal, since the
    // token may already have been cancelled some other way.
    let _ = shutdown_signal.await;

    let grace = std::time::Duration::from_secs(args.shutdown_grace_secs);
    match tokio::time::timeout(grace, run_handle).await {
        Ok(join_result) => join_result?,
        Err(_) => {
            warn!(grace_secs = args.shutdown_grace_secs, "shutdown grace period elapsed with orders still in flight, exiting anyway");
        }
    }

    Ok(())
}
