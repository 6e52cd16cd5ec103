// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline: builds every worker from configuration, wires their
//! channels together, and owns the strict shutdown order.

use crate::publisher::Publisher;
use crate::registrar::Registrar;
use crate::spooler::Spooler;
use lsf_adapters::Prospector;
use lsf_core::{AgentConfig, SeekMode, WorkerError, WorkerHandle};
use lsf_storage::RegistryStore;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Record channel capacity between Prospectors/Harvesters and the
/// Spooler: enough to absorb a short burst without a Harvester blocking.
const RECORD_CHANNEL_CAPACITY: usize = 16;
/// Batch channels are single-slot: the Spooler/Publisher only ever have
/// one outstanding batch in flight at a time.
const BATCH_CHANNEL_CAPACITY: usize = 1;

pub struct PipelineConfig {
    pub agent: AgentConfig,
    pub hostname: String,
    pub registry_path: PathBuf,
    pub scan_period: Duration,
    pub spool_max: usize,
    pub spool_idle: Duration,
    pub harvest_size: usize,
    pub from_beginning: bool,
}

/// Every worker, built and initialized but not yet running.
#[derive(Debug)]
pub struct Pipeline {
    prospectors: Vec<(Prospector, WorkerHandle)>,
    spooler: (Spooler, WorkerHandle),
    publisher: (Publisher, WorkerHandle),
    registrar: (Registrar, WorkerHandle),
}

impl Pipeline {
    /// Build and initialize every worker. Fatal on the first
    /// initialization failure, matching the original's fail-fast startup:
    /// a pipeline that can't resolve its TLS config or has nothing to
    /// watch should not come up halfway.
    pub fn initialize(config: PipelineConfig) -> Result<Self, WorkerError> {
        if config.agent.files.is_empty() {
            return Err(WorkerError::init(
                "pipeline",
                "no paths given, nothing configured to watch",
            ));
        }

        let store = RegistryStore::new(&config.registry_path);
        let registry = store
            .load()
            .map_err(|e| WorkerError::init_with_cause("pipeline", "load registry", e))?;
        info!(entries = registry.len(), path = %store.path().display(), "loaded registry");

        let new_file_seek = if config.from_beginning {
            SeekMode::Head
        } else {
            SeekMode::Tail
        };

        let mut prospectors = Vec::with_capacity(config.agent.files.len());
        for file_config in &config.agent.files {
            info!(paths = ?file_config.paths, "initialize prospector");
            let (mut prospector, handle) = Prospector::new(
                file_config.clone(),
                config.scan_period,
                registry.clone(),
                new_file_seek,
                config.harvest_size,
            );
            prospector.initialize()?;
            prospectors.push((prospector, handle));
        }

        info!("initialize spooler");
        let spooler = Spooler::new(config.spool_max, config.spool_idle);

        info!("initialize publisher");
        let (mut publisher, publisher_handle) =
            Publisher::new(config.agent.network.clone(), config.hostname.clone());
        publisher.initialize()?;

        info!("initialize registrar");
        let registrar = Registrar::new(store);

        Ok(Self {
            prospectors,
            spooler,
            publisher: (publisher, publisher_handle),
            registrar,
        })
    }

    /// Start every worker as its own task and wire their channels
    /// together: Prospectors -> Spooler -> Publisher -> Registrar.
    pub fn run(self, err_tx: mpsc::Sender<WorkerError>) -> PipelineHandle {
        let (record_tx, record_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (publish_tx, publish_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let (register_tx, register_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);

        let mut prospectors = Vec::with_capacity(self.prospectors.len());
        for (prospector, handle) in self.prospectors {
            let name = handle.name().to_string();
            let out = record_tx.clone();
            let err = err_tx.clone();
            let monitor_err = err_tx.clone();
            let join = spawn_monitored(name, monitor_err, async move {
                prospector.work(out, err).await
            });
            prospectors.push((handle, join));
        }
        // Drop our own clone so the Spooler's recv() observes channel
        // closure once every Prospector has exited.
        drop(record_tx);

        let (spooler, spooler_handle) = self.spooler;
        let name = spooler_handle.name().to_string();
        let err = err_tx.clone();
        let monitor_err = err_tx.clone();
        let spooler_join = spawn_monitored(name, monitor_err, async move {
            spooler.work(record_rx, publish_tx, err).await
        });

        let (publisher, publisher_handle) = self.publisher;
        let name = publisher_handle.name().to_string();
        let err = err_tx.clone();
        let monitor_err = err_tx.clone();
        let publisher_join = spawn_monitored(name, monitor_err, async move {
            publisher.work(publish_rx, register_tx, err).await
        });

        let (registrar, registrar_handle) = self.registrar;
        let name = registrar_handle.name().to_string();
        let monitor_err = err_tx.clone();
        let registrar_join = spawn_monitored(name, monitor_err, async move {
            registrar.work(register_rx, err_tx).await
        });

        info!("pipeline activated and working");

        PipelineHandle {
            prospectors,
            spooler: (spooler_handle, spooler_join),
            publisher: (publisher_handle, publisher_join),
            registrar: (registrar_handle, registrar_join),
        }
    }
}

/// The running pipeline's shutdown handle. Stages must stop in strict
/// reverse-dependency order: a Prospector still harvesting while the
/// Spooler is gone would just block forever on a full channel.
pub struct PipelineHandle {
    prospectors: Vec<(WorkerHandle, JoinHandle<()>)>,
    spooler: (WorkerHandle, JoinHandle<()>),
    publisher: (WorkerHandle, JoinHandle<()>),
    registrar: (WorkerHandle, JoinHandle<()>),
}

impl PipelineHandle {
    pub async fn shutdown(self, max_wait: Duration) {
        info!("shutting down");
        for (handle, join) in self.prospectors {
            shutdown_one(handle, join, max_wait).await;
        }
        let (handle, join) = self.spooler;
        shutdown_one(handle, join, max_wait).await;
        let (handle, join) = self.publisher;
        shutdown_one(handle, join, max_wait).await;
        let (handle, join) = self.registrar;
        shutdown_one(handle, join, max_wait).await;
    }
}

/// Spawn `fut` as a worker's task, then spawn a second task that owns its
/// `JoinHandle` and watches for a panic. A panic is wrapped into
/// `WorkerError::RecoveredPanic` and forwarded on `err_tx`, matching every
/// other worker fault. The returned handle is the watcher's own, so
/// `shutdown_one` still sees the worker as finished once its task (panicked
/// or not) has ended.
fn spawn_monitored<F>(name: String, err_tx: mpsc::Sender<WorkerError>, fut: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let inner = tokio::spawn(fut);
    tokio::spawn(async move {
        if let Err(join_err) = inner.await {
            if join_err.is_panic() {
                warn!(worker = name, error = %join_err, "worker task panicked");
                let _ = err_tx
                    .send(WorkerError::recovered_panic(&name, join_err.to_string()))
                    .await;
            }
        }
    })
}

async fn shutdown_one(handle: WorkerHandle, join: JoinHandle<()>, max_wait: Duration) {
    let name = handle.name().to_string();
    if let Err(e) = handle.shutdown(max_wait).await {
        warn!(worker = name, error = %e, "worker did not ack shutdown in time");
    }
    if let Err(e) = tokio::time::timeout(max_wait, join).await {
        warn!(worker = name, error = %e, "worker task did not finish within shutdown wait");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsf_core::{FileConfig, NetworkConfig};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn base_config(dir: &std::path::Path, paths: Vec<String>) -> PipelineConfig {
        PipelineConfig {
            agent: AgentConfig {
                network: NetworkConfig {
                    servers: vec!["collector.example.com:5043".to_string()],
                    ssl_certificate: None,
                    ssl_key: None,
                    ssl_ca: None,
                    timeout: 15,
                },
                files: vec![FileConfig {
                    paths,
                    fields: BTreeMap::new(),
                }],
            },
            hostname: "test-host".to_string(),
            registry_path: dir.join("registry.json"),
            scan_period: Duration::from_secs(10),
            spool_max: 1024,
            spool_idle: Duration::from_secs(5),
            harvest_size: 16384,
            from_beginning: false,
        }
    }

    #[test]
    fn initialize_rejects_empty_file_list() {
        let dir = tempdir().unwrap();
        let mut config = base_config(dir.path(), vec!["*.log".to_string()]);
        config.agent.files.clear();
        let err = Pipeline::initialize(config).unwrap_err();
        assert!(matches!(err, WorkerError::Init { .. }));
    }

    #[test]
    fn initialize_rejects_partial_tls_client_identity() {
        let dir = tempdir().unwrap();
        let mut config = base_config(dir.path(), vec![dir.path().join("*.log").to_string_lossy().into_owned()]);
        config.agent.network.ssl_certificate = Some("/cert.pem".to_string());
        let err = Pipeline::initialize(config).unwrap_err();
        assert!(matches!(err, WorkerError::Init { .. }));
    }

    #[test]
    fn initialize_succeeds_with_plaintext_network_config() {
        let dir = tempdir().unwrap();
        let config = base_config(dir.path(), vec![dir.path().join("*.log").to_string_lossy().into_owned()]);
        assert!(Pipeline::initialize(config).is_ok());
    }
}
