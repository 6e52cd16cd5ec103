// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registrar: the pipeline's terminal sink. Updates the in-memory
//! Registry from each accepted batch and persists it atomically.

use lsf_core::{Batch, FileState, Registry, WorkerBase, WorkerError, WorkerHandle, STDIN_PATH};
use lsf_storage::RegistryStore;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Registrar {
    base: WorkerBase,
    store: RegistryStore,
}

impl Registrar {
    pub fn new(store: RegistryStore) -> (Self, WorkerHandle) {
        let (base, handle) = WorkerBase::new("registrar");
        (Self { base, store }, handle)
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub async fn work(mut self, mut inbound: mpsc::Receiver<Batch>, err_tx: mpsc::Sender<WorkerError>) {
        let mut registry = match self.store.load() {
            Ok(registry) => registry,
            Err(e) => {
                let _ = err_tx
                    .send(WorkerError::init_with_cause(self.name(), "load registry", e))
                    .await;
                return;
            }
        };
        info!(entries = registry.len(), "registrar working");

        loop {
            tokio::select! {
                _ = self.base.ctl_rx() => {
                    debug!("registrar shutdown requested");
                    return;
                }
                batch = inbound.recv() => {
                    let Some(batch) = batch else {
                        debug!("inbound batch channel closed, registrar exiting");
                        return;
                    };
                    if let Err(e) = self.apply(&mut registry, batch) {
                        let _ = err_tx.send(e).await;
                        return;
                    }
                }
            }
        }
    }

    fn apply(&self, registry: &mut Registry, batch: Batch) -> Result<(), WorkerError> {
        let mut dirty = false;
        for record in &batch.records {
            if &*record.source == STDIN_PATH {
                continue;
            }
            let state: FileState = FileState::after(record);
            if registry.set(record.source.to_string(), state) {
                dirty = true;
            }
        }

        if dirty {
            self.store
                .save(registry)
                .map_err(|e| WorkerError::io_with_cause(self.name(), "save registry", e))?;
            debug!("registry saved");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsf_core::FileIdentity;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record(source: &str, offset: i64, text: &str) -> lsf_core::Record {
        lsf_core::Record::new(
            source,
            offset,
            1,
            text,
            Arc::new(BTreeMap::new()),
            FileIdentity {
                inode: 3,
                device: 1,
                size: 0,
                mtime_secs: 0,
            },
        )
    }

    #[tokio::test]
    async fn persists_offsets_from_accepted_batch() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"));
        let (registrar, handle) = Registrar::new(store);
        let (in_tx, in_rx) = mpsc::channel(4);
        let (err_tx, mut err_rx) = mpsc::channel(4);
        let task = tokio::spawn(registrar.work(in_rx, err_tx));

        in_tx
            .send(Batch::new(vec![record("/tmp/a.log", 0, "hello")]))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        handle.shutdown(std::time::Duration::from_secs(1)).await.unwrap();
        task.await.unwrap();
        assert!(err_rx.try_recv().is_err());

        let reloaded = RegistryStore::new(dir.path().join("registry.json"))
            .load()
            .unwrap();
        assert_eq!(reloaded.get("/tmp/a.log").unwrap().offset, 5);
    }

    #[tokio::test]
    async fn ignores_stdin_source_records() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("registry.json"));
        let (registrar, handle) = Registrar::new(store);
        let (in_tx, in_rx) = mpsc::channel(4);
        let (err_tx, _err_rx) = mpsc::channel(4);
        let task = tokio::spawn(registrar.work(in_rx, err_tx));

        in_tx
            .send(Batch::new(vec![record(STDIN_PATH, 0, "hello")]))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        handle.shutdown(std::time::Duration::from_secs(1)).await.unwrap();
        task.await.unwrap();

        let reloaded = RegistryStore::new(dir.path().join("registry.json"))
            .load()
            .unwrap();
        assert!(reloaded.is_empty());
    }
}
