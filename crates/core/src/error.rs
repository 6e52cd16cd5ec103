// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by every worker in the pipeline.

use std::fmt;
use thiserror::Error;

/// Errors a worker's `Work` loop can report on its error sink.
///
/// Every worker funnels its failures through this type so the pipeline's
/// supervisor can reason about shutdown and retry semantics in one place
/// rather than per component.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Unrecoverable setup failure. Fatal to the worker, and to the
    /// process if raised during pipeline initialization.
    #[error("{worker}: init failed: {message}")]
    Init {
        worker: String,
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A deadline (EOF grace, send deadline, shutdown ack) elapsed.
    #[error("{worker}: timeout: {message}")]
    Timeout { worker: String, message: String },

    /// Read/write/network failure.
    #[error("{worker}: io error: {message}")]
    Io {
        worker: String,
        message: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The downstream channel did not accept a send within its deadline.
    #[error("{worker}: send blocked: {message}")]
    SendBlock { worker: String, message: String },

    /// An unexpected fault was caught and converted into an error instead
    /// of unwinding the worker's task.
    #[error("{worker}: recovered panic: {message}")]
    RecoveredPanic { worker: String, message: String },
}

impl WorkerError {
    pub fn init(worker: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Init {
            worker: worker.to_string(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn init_with_cause(
        worker: impl fmt::Display,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Init {
            worker: worker.to_string(),
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn timeout(worker: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Timeout {
            worker: worker.to_string(),
            message: message.into(),
        }
    }

    pub fn io(worker: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Io {
            worker: worker.to_string(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn io_with_cause(
        worker: impl fmt::Display,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io {
            worker: worker.to_string(),
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn send_block(worker: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::SendBlock {
            worker: worker.to_string(),
            message: message.into(),
        }
    }

    pub fn recovered_panic(worker: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::RecoveredPanic {
            worker: worker.to_string(),
            message: message.into(),
        }
    }

    /// The worker name this error originated from.
    pub fn worker_name(&self) -> &str {
        match self {
            Self::Init { worker, .. }
            | Self::Timeout { worker, .. }
            | Self::Io { worker, .. }
            | Self::SendBlock { worker, .. }
            | Self::RecoveredPanic { worker, .. } => worker,
        }
    }

    /// True if this error is fatal to the whole process (only init
    /// failures raised before the pipeline is running qualify; callers
    /// decide that context, this just flags the category).
    pub fn is_init(&self) -> bool {
        matches!(self, Self::Init { .. })
    }
}
