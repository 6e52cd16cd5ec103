// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-line flags.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lsf-agent", version, about = "Ships local log files to a remote collector")]
pub struct Cli {
    /// Configuration file path.
    #[arg(long)]
    pub config: PathBuf,

    /// Enable CPU profiling, writing a pprof-style profile to this file.
    #[arg(long)]
    pub cpuprofile: Option<PathBuf>,

    /// Events per batch before the Spooler flushes early.
    #[arg(long = "spool-size", default_value_t = 1024)]
    pub spool_size: usize,

    /// Seconds of inactivity before the Spooler flushes a partial batch.
    #[arg(long = "idle-flush-time", default_value_t = 5)]
    pub idle_flush_time: u64,

    /// Harvester read-buffer size, in bytes.
    #[arg(long = "harvest-size", default_value_t = 16 << 10)]
    pub harvest_size: usize,

    /// Redirect logging to syslog instead of stdout.
    #[arg(long = "log-to-syslog")]
    pub log_to_syslog: bool,

    /// Seek newly-discovered files to their start instead of their end.
    #[arg(long = "from-beginning")]
    pub from_beginning: bool,
}
