// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! lsf-agent: discovers, tails, batches, and ships local log files to a
//! remote collector over a mutually-authenticated TLS stream.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod cli;
mod config;
mod logging;
mod profile;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use lsf_core::WorkerError;
use lsf_engine::pipeline::PipelineConfig;
use lsf_engine::Pipeline;
use std::path::Path;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const DEFAULT_REGISTRY_FILENAME: &str = ".logstash-forwarder";
const SCAN_PERIOD: Duration = Duration::from_secs(10);
const WORKER_ERROR_CHANNEL_CAPACITY: usize = 16;
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_to_syslog);
    let _profile_guard = profile::start(cli.cpuprofile.as_deref());

    // Installed once, ahead of the Publisher's own defensive call, so the
    // provider is in place for the whole process rather than only once a
    // Publisher happens to initialize first.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let agent_config = config::load(&cli.config).context("loading configuration")?;
    let hostname = local_hostname();

    info!(
        config = %cli.config.display(),
        hostname,
        spool_size = cli.spool_size,
        idle_flush_time_secs = cli.idle_flush_time,
        harvest_size = cli.harvest_size,
        log_to_syslog = cli.log_to_syslog,
        from_beginning = cli.from_beginning,
        servers = ?agent_config.network.servers,
        "options"
    );

    let pipeline_config = PipelineConfig {
        agent: agent_config,
        hostname,
        registry_path: Path::new(DEFAULT_REGISTRY_FILENAME).to_path_buf(),
        scan_period: SCAN_PERIOD,
        spool_max: cli.spool_size,
        spool_idle: Duration::from_secs(cli.idle_flush_time),
        harvest_size: cli.harvest_size,
        from_beginning: cli.from_beginning,
    };

    let pipeline = Pipeline::initialize(pipeline_config).context("initializing pipeline")?;

    let (err_tx, mut err_rx) = mpsc::channel::<WorkerError>(WORKER_ERROR_CHANNEL_CAPACITY);
    let handle = pipeline.run(err_tx);

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;

    info!("pipeline running");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
            error = err_rx.recv() => {
                match error {
                    Some(e) if e.is_init() => {
                        error!(error = %e, "fatal worker error, shutting down");
                        break;
                    }
                    Some(e) => {
                        warn!(error = %e, "worker reported an error");
                    }
                    None => {
                        info!("all workers have exited");
                        break;
                    }
                }
            }
        }
    }

    handle.shutdown(SHUTDOWN_WAIT).await;
    info!("stopped");
    Ok(())
}

/// `os.Hostname()`-equivalent lookup: no hostname crate is in the
/// workspace, so this reads the usual Linux sources directly rather than
/// shelling out or reaching for `libc` (which would need `unsafe`, denied
/// workspace-wide).
fn local_hostname() -> String {
    if let Ok(name) = std::fs::read_to_string("/etc/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
