// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CPU profiling hook. No profiler crate is wired in; this documents
//! where one would attach (e.g. `pprof`'s guard-based API) without
//! pulling in a dependency nothing else in the workspace needs.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Held for the process lifetime when `--cpuprofile` is set. Dropping it
/// is where a real profiler would flush its collected samples to disk.
pub struct CpuProfileGuard {
    path: PathBuf,
}

pub fn start(path: Option<&Path>) -> Option<CpuProfileGuard> {
    let path = path?;
    warn!(
        path = %path.display(),
        "cpuprofile requested but no profiler is wired in, writing nothing"
    );
    Some(CpuProfileGuard {
        path: path.to_path_buf(),
    })
}

impl Drop for CpuProfileGuard {
    fn drop(&mut self) {
        warn!(path = %self.path.display(), "cpuprofile guard dropped, no profile written");
    }
}
