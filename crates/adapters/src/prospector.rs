// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prospector: discovers files by glob, classifies them against prior
//! scans, and launches or reuses Harvesters.

use crate::harvester::{Classification, Harvester};
use lsf_core::{FileConfig, FileIdentity, Record, Registry, SeekMode, WorkerBase, WorkerError, WorkerHandle, STDIN_PATH};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A file is skipped as "new" if its mtime is older than this.
const STALE_FILE_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const HARVESTER_SHUTDOWN_WAIT: Duration = Duration::from_secs(1);

/// Dedup key for live Harvesters: a rescan must not launch a second
/// reader for a file it already has open (see design notes on duplicate
/// harvesters).
type HarvesterKey = (String, u64, u64);

struct ActiveHarvester {
    handle: WorkerHandle,
    join: JoinHandle<()>,
    key: HarvesterKey,
}

#[derive(Debug)]
pub struct Prospector {
    base: WorkerBase,
    paths: Vec<String>,
    fields: Arc<BTreeMap<String, String>>,
    scan_period: Duration,
    initial_registry: Registry,
    known: HashMap<String, FileIdentity>,
    pending: Vec<(Harvester, WorkerHandle)>,
    new_file_seek: SeekMode,
    harvest_size: usize,
}

impl Prospector {
    pub fn new(
        config: FileConfig,
        scan_period: Duration,
        initial_registry: Registry,
        new_file_seek: SeekMode,
        harvest_size: usize,
    ) -> (Self, WorkerHandle) {
        let (base, handle) = WorkerBase::new("prospector");
        (
            Self {
                base,
                paths: config.paths,
                fields: Arc::new(config.fields),
                scan_period,
                initial_registry,
                known: HashMap::new(),
                pending: Vec::new(),
                new_file_seek,
                harvest_size,
            },
            handle,
        )
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// Extract the stdin path (at most one stream Harvester per
    /// Prospector) and resume history-known files whose current stat
    /// still matches the stored identity and whose path still matches a
    /// configured glob.
    pub fn initialize(&mut self) -> Result<(), WorkerError> {
        if let Some(pos) = self.paths.iter().position(|p| p == STDIN_PATH) {
            self.paths.remove(pos);
            let (harvester, handle) = Harvester::new(
                STDIN_PATH,
                0,
                self.fields.clone(),
                SeekMode::Stream,
                Classification::Stream,
                self.harvest_size,
            );
            self.pending.push((harvester, handle));
        }

        for (path, state) in self.initial_registry.iter() {
            let Ok(meta) = fs::metadata(path) else {
                continue;
            };
            let identity = FileIdentity::from_metadata(&meta);
            if !state.matches_identity(&identity) {
                continue;
            }
            if !self.paths.iter().any(|glob| glob_matches(glob, path)) {
                continue;
            }

            info!(path, offset = state.offset, "resuming harvester from history");
            self.known.insert(path.clone(), identity);
            let (harvester, handle) = Harvester::new(
                path.clone(),
                state.offset,
                self.fields.clone(),
                SeekMode::Continue,
                Classification::Known,
                self.harvest_size,
            );
            self.pending.push((harvester, handle));
        }

        Ok(())
    }

    pub async fn work(mut self, out: mpsc::Sender<Record>, err_tx: mpsc::Sender<WorkerError>) {
        let mut active: Vec<ActiveHarvester> = Vec::new();
        let mut active_keys: HashSet<HarvesterKey> = HashSet::new();

        for (harvester, handle) in self.pending.drain(..) {
            let key = (harvester.path().to_string(), 0, 0);
            active_keys.insert(key.clone());
            spawn_harvester(key, harvester, handle, &out, &err_tx, &mut active);
        }

        let mut ticker = tokio::time::interval(self.scan_period);
        ticker.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                _ = self.base.ctl_rx() => {
                    debug!("prospector shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    reap_finished(&mut active, &mut active_keys);
                    debug!("scanning");
                    for path in self.paths.clone() {
                        self.scan_path(&path, &out, &err_tx, &mut active, &mut active_keys).await;
                    }
                }
            }
        }

        for active in active {
            if let Err(e) = active.handle.shutdown(HARVESTER_SHUTDOWN_WAIT).await {
                let _ = err_tx.send(e).await;
            }
        }
    }

    async fn scan_path(
        &mut self,
        glob_pattern: &str,
        out: &mpsc::Sender<Record>,
        err_tx: &mpsc::Sender<WorkerError>,
        active: &mut Vec<ActiveHarvester>,
        active_keys: &mut HashSet<HarvesterKey>,
    ) {
        let matches = match glob::glob(glob_pattern) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(pattern = glob_pattern, error = %e, "invalid glob pattern");
                return;
            }
        };

        for entry in matches {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "glob entry error");
                    continue;
                }
            };
            let Ok(meta) = fs::metadata(&path) else {
                continue;
            };
            if meta.is_dir() {
                continue;
            }
            let path_str = path.to_string_lossy().into_owned();
            let identity = FileIdentity::from_metadata(&meta);

            let previous = self.known.insert(path_str.clone(), identity);
            match previous {
                None => {
                    let age = identity.age_secs(SystemTime::now());
                    if age > STALE_FILE_AGE.as_secs() as i64 {
                        debug!(path = path_str, age, "skipping stale file");
                        continue;
                    }
                    if self.known_by_identity(&identity, &path_str) {
                        debug!(path = path_str, "treating as rename of a known file");
                        continue;
                    }
                    let key = (path_str.clone(), identity.inode, identity.device);
                    if !active_keys.insert(key.clone()) {
                        continue;
                    }
                    info!(path = path_str, "new file, launching harvester");
                    let (harvester, handle) = Harvester::new(
                        path_str,
                        0,
                        self.fields.clone(),
                        self.new_file_seek,
                        Classification::New,
                        self.harvest_size,
                    );
                    spawn_harvester(key, harvester, handle, out, err_tx, active);
                }
                Some(old_identity) if identity.rotated_from(&old_identity) => {
                    let key = (path_str.clone(), identity.inode, identity.device);
                    if !active_keys.insert(key.clone()) {
                        continue;
                    }
                    info!(path = path_str, "rotation detected, launching harvester");
                    let (harvester, handle) = Harvester::new(
                        path_str,
                        0,
                        self.fields.clone(),
                        SeekMode::Head,
                        Classification::Rotated,
                        self.harvest_size,
                    );
                    spawn_harvester(key, harvester, handle, out, err_tx, active);
                }
                Some(_) => {}
            }
        }
    }

    fn known_by_identity(&self, identity: &FileIdentity, path: &str) -> bool {
        self.known
            .iter()
            .any(|(p, id)| p != path && id.same_file(identity))
    }
}

/// Spawn `harvester` as its own task and record it as active under
/// `key`. Callers are responsible for reserving `key` in `active_keys`
/// before calling, since the reservation itself is what prevents a
/// concurrent scan from launching a duplicate.
fn spawn_harvester(
    key: HarvesterKey,
    harvester: Harvester,
    handle: WorkerHandle,
    out: &mpsc::Sender<Record>,
    err_tx: &mpsc::Sender<WorkerError>,
    active: &mut Vec<ActiveHarvester>,
) {
    let out = out.clone();
    let err_tx = err_tx.clone();
    let join = tokio::spawn(async move {
        harvester.work(out, err_tx).await;
    });
    active.push(ActiveHarvester { handle, join, key });
}

fn reap_finished(active: &mut Vec<ActiveHarvester>, active_keys: &mut HashSet<HarvesterKey>) {
    active.retain(|a| {
        if a.join.is_finished() {
            active_keys.remove(&a.key);
            false
        } else {
            true
        }
    });
}

/// Minimal `fnmatch`-style glob match for a single path against a
/// pattern, used only to re-check a history path against the configured
/// globs (the live scan uses the `glob` crate directly on the pattern).
fn glob_matches(pattern: &str, path: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(path))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsf_core::FileState;
    use std::io::Write;
    use tempfile::tempdir;

    fn config(paths: Vec<String>) -> FileConfig {
        FileConfig {
            paths,
            fields: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn new_file_on_first_scan_launches_harvester() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "hello").unwrap();

        let glob_pattern = dir.path().join("*.log").to_string_lossy().into_owned();
        let (mut prospector, handle) = Prospector::new(
            config(vec![glob_pattern]),
            Duration::from_millis(30),
            Registry::new(),
            SeekMode::Head,
            16384,
        );
        prospector.initialize().unwrap();

        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::channel(8);
        let task = tokio::spawn(prospector.work(out_tx, err_tx));

        let record = tokio::time::timeout(Duration::from_secs(2), out_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&*record.text, "hello");

        handle.shutdown(Duration::from_secs(1)).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stdin_path_is_extracted_from_glob_list() {
        let (mut prospector, _handle) = Prospector::new(
            config(vec![STDIN_PATH.to_string()]),
            Duration::from_secs(3600),
            Registry::new(),
            SeekMode::Tail,
            16384,
        );
        prospector.initialize().unwrap();
        assert!(prospector.paths.is_empty());
        assert_eq!(prospector.pending.len(), 1);
    }

    #[tokio::test]
    async fn history_resume_skipped_when_identity_does_not_match() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.log");
        std::fs::write(&path, "x").unwrap();

        let mut registry = Registry::new();
        registry.set(
            path.to_string_lossy().into_owned(),
            FileState {
                offset: 5,
                inode: u64::MAX,
                device: u64::MAX,
            },
        );

        let glob_pattern = dir.path().join("*.log").to_string_lossy().into_owned();
        let (mut prospector, _handle) = Prospector::new(
            config(vec![glob_pattern]),
            Duration::from_secs(3600),
            registry,
            SeekMode::Tail,
            16384,
        );
        prospector.initialize().unwrap();
        assert!(prospector.pending.is_empty());
    }
}
