// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lsf-core: shared types for the log-shipping agent pipeline.
//!
//! Holds the wire-independent data model (Record, Batch, FileState,
//! Registry, FileIdentity), the error taxonomy shared by every worker,
//! and the worker lifecycle contract that every pipeline stage
//! implements.

pub mod config;
pub mod error;
pub mod identity;
pub mod record;
pub mod registry;
pub mod worker;

pub use config::{AgentConfig, FileConfig, NetworkConfig};
pub use error::WorkerError;
pub use identity::FileIdentity;
pub use record::{Batch, Record, SeekMode};
pub use registry::{FileState, Registry};
pub use worker::{send_tiered, send_with_deadline, WorkerBase, WorkerHandle};

/// Path that designates the process's standard input stream.
pub const STDIN_PATH: &str = "-";
