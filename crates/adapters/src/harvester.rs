// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harvester: tails one open file (or stdin) and emits [`Record`]s with
//! byte offsets, following growth and detecting truncation.

use lsf_core::{send_tiered, FileIdentity, Record, SeekMode, WorkerBase, WorkerError, WorkerHandle};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const OPEN_RETRIES: u32 = 3;
const OPEN_WAIT: Duration = Duration::from_secs(5);
const READ_POLL: Duration = Duration::from_millis(1000);
const EOF_GRACE: Duration = Duration::from_secs(55);

/// What prompted this Harvester's launch, carried for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    Rotated,
    Known,
    Stream,
}

impl Classification {
    fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Rotated => "rotated",
            Self::Known => "known",
            Self::Stream => "stream",
        }
    }
}

enum Source {
    File(BufReader<File>),
    Stdin(BufReader<io::Stdin>),
}

impl Source {
    fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        match self {
            Self::File(r) => r.read_line(buf),
            Self::Stdin(r) => r.read_line(buf),
        }
    }

    /// Current byte position, for files only (stdin has none).
    fn position(&mut self) -> Option<u64> {
        match self {
            Self::File(r) => r.stream_position().ok(),
            Self::Stdin(_) => None,
        }
    }

    fn current_len(&self) -> Option<u64> {
        match self {
            Self::File(r) => r.get_ref().metadata().ok().map(|m| m.len()),
            Self::Stdin(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct Harvester {
    base: WorkerBase,
    path: String,
    fields: Arc<BTreeMap<String, String>>,
    offset: i64,
    mode: SeekMode,
    classification: Classification,
    buffer_size: usize,
}

impl Harvester {
    pub fn new(
        path: impl Into<String>,
        offset: i64,
        fields: Arc<BTreeMap<String, String>>,
        mode: SeekMode,
        classification: Classification,
        buffer_size: usize,
    ) -> (Self, WorkerHandle) {
        let path = path.into();
        let (base, handle) = WorkerBase::new(format!("harvester <{}>", truncated(&path)));
        (
            Self {
                base,
                path,
                fields,
                offset,
                mode,
                classification,
                buffer_size,
            },
            handle,
        )
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    async fn open(&mut self) -> Result<(Source, FileIdentity), WorkerError> {
        if self.mode == SeekMode::Stream {
            return Ok((
                Source::Stdin(BufReader::with_capacity(self.buffer_size, io::stdin())),
                FileIdentity {
                    inode: 0,
                    device: 0,
                    size: 0,
                    mtime_secs: 0,
                },
            ));
        }

        let mut last_err: Option<io::Error> = None;
        for attempt in 0..OPEN_RETRIES {
            match File::open(&self.path) {
                Ok(mut file) => {
                    let offset = match self.mode {
                        SeekMode::Head => file.seek(SeekFrom::Start(0)),
                        SeekMode::Tail => file.seek(SeekFrom::End(0)),
                        SeekMode::Continue => {
                            file.seek(SeekFrom::Start(self.offset.max(0) as u64))
                        }
                        SeekMode::Stream => unreachable!("handled above"),
                    }
                    .map_err(|e| WorkerError::init_with_cause(self.name(), "seek", e))?;
                    self.offset = offset as i64;

                    let meta = file
                        .metadata()
                        .map_err(|e| WorkerError::init_with_cause(self.name(), "stat", e))?;
                    let identity = FileIdentity::from_metadata(&meta);
                    return Ok((
                        Source::File(BufReader::with_capacity(self.buffer_size, file)),
                        identity,
                    ));
                }
                Err(e) => {
                    warn!(path = %self.path, attempt, error = %e, "failed to open harvested file");
                    last_err = Some(e);
                    if attempt + 1 < OPEN_RETRIES {
                        tokio::time::sleep(OPEN_WAIT).await;
                    }
                }
            }
        }
        Err(WorkerError::init_with_cause(
            self.name(),
            "open",
            last_err.unwrap_or_else(|| io::Error::other("open retries exhausted")),
        ))
    }

    /// Run the tail loop, emitting Records on `out` until shutdown,
    /// rotation-driven EOF-deadline expiry, or an unrecoverable error.
    /// Errors are reported on `err_tx` rather than returned; the caller
    /// only needs to know the task has ended.
    pub async fn work(mut self, out: mpsc::Sender<Record>, err_tx: mpsc::Sender<WorkerError>) {
        let (mut source, identity) = match self.open().await {
            Ok(opened) => opened,
            Err(e) => {
                let _ = err_tx.send(e).await;
                return;
            }
        };

        info!(
            path = %self.path,
            offset = self.offset,
            classification = self.classification.as_str(),
            "harvesting"
        );

        let mut deadline = Instant::now() + EOF_GRACE;
        let mut line_num: u64 = 0;
        let mut buf = String::new();

        loop {
            if self.base.ctl_rx().try_recv().is_ok() {
                debug!(path = %self.path, offset = self.offset, "harvester shutdown requested");
                return;
            }

            buf.clear();
            match source.read_line(&mut buf) {
                Ok(0) => {
                    if let Some(len) = source.current_len() {
                        if len < self.offset as u64 {
                            info!(path = %self.path, "truncation detected, resuming at 0");
                            self.offset = 0;
                            if let Source::File(r) = &mut source {
                                if r.seek(SeekFrom::Start(0)).is_err() {
                                    let _ = err_tx
                                        .send(WorkerError::io(self.name(), "seek after truncation"))
                                        .await;
                                    return;
                                }
                            }
                            deadline = Instant::now() + EOF_GRACE;
                            continue;
                        }
                    }

                    if Instant::now() >= deadline {
                        debug!(path = %self.path, offset = self.offset, "eof deadline expired");
                        let _ = err_tx
                            .send(WorkerError::timeout(self.name(), "eof deadline expired"))
                            .await;
                        return;
                    }
                    tokio::time::sleep(READ_POLL).await;
                }
                Ok(_) => {
                    let text = buf.trim_end_matches(['\n', '\r']).to_string();
                    line_num += 1;
                    let record = Record::new(
                        self.path.clone(),
                        self.offset,
                        line_num,
                        text,
                        self.fields.clone(),
                        identity,
                    );

                    if let Err(e) = send_tiered(self.name(), &out, record).await {
                        let _ = err_tx.send(e).await;
                        return;
                    }

                    // Re-read the real position to compensate for any
                    // terminator-eating by the line reader.
                    self.offset = source
                        .position()
                        .map(|p| p as i64)
                        .unwrap_or_else(|| self.offset + buf.len() as i64);
                    deadline = Instant::now() + EOF_GRACE;
                }
                Err(e) => {
                    let _ = err_tx
                        .send(WorkerError::io_with_cause(self.name(), "read_line", e))
                        .await;
                    return;
                }
            }
        }
    }
}

fn truncated(path: &str) -> &str {
    let max = 20;
    if path.len() > max {
        &path[..max]
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fields() -> Arc<BTreeMap<String, String>> {
        Arc::new(BTreeMap::new())
    }

    #[tokio::test]
    async fn emits_records_for_each_line_from_head() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "hello\nworld\n").unwrap();

        let (harvester, handle) = Harvester::new(
            file.path().to_str().unwrap(),
            0,
            fields(),
            SeekMode::Head,
            Classification::New,
            16384,
        );
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (err_tx, mut err_rx) = mpsc::channel(8);
        let task = tokio::spawn(harvester.work(out_tx, err_tx));

        let r1 = out_rx.recv().await.unwrap();
        assert_eq!(r1.offset, 0);
        assert_eq!(&*r1.text, "hello");
        let r2 = out_rx.recv().await.unwrap();
        assert_eq!(r2.offset, 6);
        assert_eq!(&*r2.text, "world");

        handle.shutdown(Duration::from_secs(1)).await.unwrap();
        task.await.unwrap();
        assert!(err_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn tail_mode_skips_existing_content() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "old line\n").unwrap();

        let (harvester, handle) = Harvester::new(
            file.path().to_str().unwrap(),
            0,
            fields(),
            SeekMode::Tail,
            Classification::New,
            16384,
        );
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::channel(8);
        let task = tokio::spawn(harvester.work(out_tx, err_tx));

        // give the harvester a moment to open and reach the read-poll loop
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(file.path())
            .unwrap();
        writeln!(file, "new line").unwrap();

        let record = out_rx.recv().await.unwrap();
        assert_eq!(&*record.text, "new line");

        handle.shutdown(Duration::from_secs(1)).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_during_eof_wait_exits_without_error() {
        let file = NamedTempFile::new().unwrap();
        let (harvester, handle) = Harvester::new(
            file.path().to_str().unwrap(),
            0,
            fields(),
            SeekMode::Head,
            Classification::New,
            16384,
        );
        let (out_tx, _out_rx) = mpsc::channel(8);
        let (err_tx, mut err_rx) = mpsc::channel(8);
        let task = tokio::spawn(harvester.work(out_tx, err_tx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown(Duration::from_secs(1)).await.unwrap();
        task.await.unwrap();
        assert!(err_rx.try_recv().is_err());
    }
}
