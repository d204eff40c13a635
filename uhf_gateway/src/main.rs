// src/main.rs
mod commands;
mod config;
mod downlink;
mod errors;
mod health;
mod logging;
mod net;
mod radio;
mod state;
mod supervisor;

use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::radio::UdpRadio;
use crate::state::{LinkState, RunFlag};
use crate::supervisor::Supervisor;

/// How often main looks for a worker-initiated stop.
const RUN_FLAG_POLL: Duration = Duration::from_millis(200);

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let code = match run().await {
        Ok(flag) => flag.exit_code(),
        Err(e) => {
            eprintln!("uhf_gateway: {e:#}");
            RunFlag::FatalFault.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<RunFlag> {
    // -------- config + logging ----------
    let cfg = config::Cli::parse_and_build_config()?;
    // dropping the guard flushes the file log, so it lives until run() returns
    let _log_guard = logging::init(cfg.log_dir.as_deref());
    if let Some(path) = &cfg.frame_log {
        if let Err(e) = logging::frames::init(path) {
            warn!(error = %e, path = %path.display(), "frame log disabled");
        }
    }
    info!(?cfg, "UHF gateway starting");

    // -------- radio + workers ----------
    let radio = radio::shared(UdpRadio::from_config(&cfg));
    let sup = Supervisor::start(&cfg, radio)?;
    let state = sup.state();

    wait_for_stop(&state).await;

    // -------- graceful shutdown ----------
    let flag = match tokio::task::spawn_blocking(move || sup.shutdown()).await? {
        Ok(flag) => flag,
        Err(e) => {
            error!(error = %e, "unclean shutdown");
            state.run_flag()
        }
    };
    Ok(flag)
}

/// Resolve on Ctrl+C or once a worker takes the gateway out of `Running`.
async fn wait_for_stop(state: &LinkState) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut signals = true;
    let mut tick = tokio::time::interval(RUN_FLAG_POLL);

    loop {
        tokio::select! {
            res = &mut ctrl_c, if signals => match res {
                Ok(()) => {
                    info!("shutdown signal received");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "failed to install Ctrl+C handler");
                    signals = false;
                }
            },
            _ = tick.tick() => {
                if !state.is_running() {
                    info!(flag = ?state.run_flag(), "worker requested stop");
                    return;
                }
            }
        }
    }
}
