// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spooler: size- and time-bounded batching of Records.

use lsf_core::{send_with_deadline, Batch, Record, WorkerBase, WorkerError, WorkerHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

const FLUSH_SEND_DEADLINE: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct Spooler {
    base: WorkerBase,
    spool_max: usize,
    spool_idle: Duration,
}

impl Spooler {
    pub fn new(spool_max: usize, spool_idle: Duration) -> (Self, WorkerHandle) {
        let (base, handle) = WorkerBase::new("spooler");
        (
            Self {
                base,
                spool_max,
                spool_idle,
            },
            handle,
        )
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub async fn work(
        mut self,
        mut inbound: mpsc::Receiver<Record>,
        out: mpsc::Sender<Batch>,
        err_tx: mpsc::Sender<WorkerError>,
    ) {
        info!(spool_max = self.spool_max, "spooler working");
        let mut buffer: Vec<Record> = Vec::with_capacity(self.spool_max);
        let mut idle = tokio::time::interval(self.spool_idle);
        idle.tick().await; // consume the immediate first tick

        loop {
            let mut flush = false;

            tokio::select! {
                _ = self.base.ctl_rx() => {
                    debug!("spooler shutdown requested, dropping partial buffer");
                    return;
                }
                _ = idle.tick() => {
                    if !buffer.is_empty() {
                        flush = true;
                    }
                }
                record = inbound.recv() => {
                    match record {
                        Some(record) => {
                            buffer.push(record);
                            if buffer.len() >= self.spool_max {
                                flush = true;
                            }
                        }
                        None => {
                            debug!("inbound record channel closed, spooler exiting");
                            return;
                        }
                    }
                }
            }

            if flush {
                let batch = Batch::new(std::mem::take(&mut buffer));
                let count = batch.len();
                if let Err(e) =
                    send_with_deadline(self.name(), &out, batch, FLUSH_SEND_DEADLINE).await
                {
                    let _ = err_tx.send(e).await;
                    return;
                }
                debug!(count, "flushed batch");
                idle = tokio::time::interval(self.spool_idle);
                idle.tick().await;
            }
        }
    }
}
