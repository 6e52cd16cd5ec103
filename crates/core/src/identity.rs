// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-identity snapshots used to detect rotation, truncation, and
//! rename across scans.

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::time::SystemTime;

/// A point-in-time snapshot of a file's identity and size, used to tell
/// rotation (inode/device changed) apart from ordinary growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIdentity {
    pub inode: u64,
    pub device: u64,
    pub size: u64,
    /// Modification time, seconds since the epoch.
    pub mtime_secs: i64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            inode: meta.ino(),
            device: meta.dev(),
            size: meta.len(),
            mtime_secs: meta.mtime(),
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let mtime_secs = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            inode: 0,
            device: 0,
            size: meta.len(),
            mtime_secs,
        }
    }

    /// True if `self` and `other` refer to the same (inode, device) pair.
    pub fn same_file(&self, other: &FileIdentity) -> bool {
        self.inode == other.inode && self.device == other.device
    }

    /// True if either inode or device changed, i.e. the path now points
    /// at a different underlying file (rotation).
    pub fn rotated_from(&self, previous: &FileIdentity) -> bool {
        !self.same_file(previous)
    }

    /// Age of this snapshot's mtime relative to `now`.
    pub fn age_secs(&self, now: SystemTime) -> i64 {
        let now_secs = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        now_secs - self.mtime_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(inode: u64, device: u64, size: u64) -> FileIdentity {
        FileIdentity {
            inode,
            device,
            size,
            mtime_secs: 0,
        }
    }

    #[test]
    fn same_file_requires_matching_inode_and_device() {
        let a = identity(1, 1, 10);
        let b = identity(1, 1, 20);
        assert!(a.same_file(&b));
    }

    #[test]
    fn rotated_from_true_when_inode_changes() {
        let old = identity(1, 1, 10);
        let new = identity(2, 1, 0);
        assert!(new.rotated_from(&old));
    }

    #[test]
    fn rotated_from_false_when_identity_unchanged() {
        let old = identity(1, 1, 10);
        let new = identity(1, 1, 15);
        assert!(!new.rotated_from(&old));
    }

    #[test]
    fn age_secs_is_difference_from_now() {
        let id = identity(1, 1, 0);
        let now = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(100);
        assert_eq!(id.age_secs(now), 100);
    }
}
