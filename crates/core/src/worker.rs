// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uniform worker lifecycle: initialize, run, interrupt, acknowledge-exit.
//!
//! Every pipeline stage (Prospector, Harvester, Spooler, Publisher,
//! Registrar) embeds a [`WorkerBase`] and is driven through the
//! [`WorkerHandle`] its constructor hands back to the supervisor. This is
//! the one place the send/shutdown/error-reporting contract lives, so
//! every worker's failure semantics can be reasoned about identically.

use crate::error::WorkerError;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Supervisor-facing half of a worker: request shutdown, wait for ack.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    ctl_tx: oneshot::Sender<()>,
    ack_rx: oneshot::Receiver<()>,
}

impl WorkerHandle {
    /// Signal the control channel, then wait up to `max_wait` for the
    /// worker's acknowledgement channel to close. Returns `Timeout` if
    /// either step exceeds the budget.
    pub async fn shutdown(self, max_wait: Duration) -> Result<(), WorkerError> {
        let WorkerHandle {
            name,
            ctl_tx,
            ack_rx,
        } = self;

        // A send failure means the worker's task already exited (its
        // ctl_rx was dropped), which is not itself an error.
        if ctl_tx.send(()).is_err() {
            return Ok(());
        }

        match tokio::time::timeout(max_wait, ack_rx).await {
            Ok(_) => Ok(()),
            Err(_) => Err(WorkerError::timeout(
                name,
                "sig_ch ack for shutdown timed out",
            )),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Worker-facing half: the control receiver a `Work` loop selects on, and
/// an ack guard that closes the acknowledgement channel whenever the
/// worker's task ends, by any path (normal return, early `return` on
/// error, or an abandoned future being dropped).
#[derive(Debug)]
pub struct WorkerBase {
    name: String,
    ctl_rx: oneshot::Receiver<()>,
    _ack_guard: AckGuard,
}

#[derive(Debug)]
struct AckGuard(Option<oneshot::Sender<()>>);

impl Drop for AckGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

impl WorkerBase {
    /// Create a worker/handle pair. The worker keeps `WorkerBase`
    /// embedded as a field of its concrete type; the supervisor keeps the
    /// returned `WorkerHandle`.
    pub fn new(name: impl Into<String>) -> (Self, WorkerHandle) {
        let name = name.into();
        let (ctl_tx, ctl_rx) = oneshot::channel();
        let (ack_tx, ack_rx) = oneshot::channel();
        (
            Self {
                name: name.clone(),
                ctl_rx,
                _ack_guard: AckGuard(Some(ack_tx)),
            },
            WorkerHandle {
                name,
                ctl_tx,
                ack_rx,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The control receiver, for use in `tokio::select! { _ = &mut base.ctl_rx() => ... }`.
    pub fn ctl_rx(&mut self) -> &mut oneshot::Receiver<()> {
        &mut self.ctl_rx
    }
}

/// Enqueue `value` on `out`: try an immediate, non-blocking send first; if
/// the channel is momentarily full, escalate to a send bounded by one
/// second. Returns `SendBlock` if the channel is closed or the bounded
/// send times out.
pub async fn send_tiered<T: Send>(
    worker: &str,
    out: &mpsc::Sender<T>,
    value: T,
) -> Result<(), WorkerError> {
    use tokio::sync::mpsc::error::TrySendError;

    let value = match out.try_send(value) {
        Ok(()) => return Ok(()),
        Err(TrySendError::Full(v)) => v,
        Err(TrySendError::Closed(_)) => {
            return Err(WorkerError::send_block(worker, "output channel closed"));
        }
    };

    send_with_deadline(worker, out, value, Duration::from_secs(1)).await
}

/// Enqueue `value` on `out`, bounded by `deadline`. Returns `SendBlock` on
/// timeout or if the channel has been closed.
pub async fn send_with_deadline<T: Send>(
    worker: &str,
    out: &mpsc::Sender<T>,
    value: T,
    deadline: Duration,
) -> Result<(), WorkerError> {
    match tokio::time::timeout(deadline, out.send(value)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err(WorkerError::send_block(worker, "output channel closed")),
        Err(_) => Err(WorkerError::send_block(
            worker,
            "timed out sending to output channel",
        )),
    }
}
