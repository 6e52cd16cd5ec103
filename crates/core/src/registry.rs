// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FileState and Registry: the Registrar's durable, in-memory state.

use crate::identity::FileIdentity;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Persisted per-source resume point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    /// Next byte offset to read from.
    #[serde(rename = "offset")]
    pub offset: i64,
    pub inode: u64,
    pub device: u64,
}

impl FileState {
    /// Derive the FileState that results from having delivered `record`,
    /// using offset = record.offset + length(text) (see design notes §9:
    /// this is the non-"+1" convention, matching the newer Harvester
    /// which re-reads the real file position after every line instead of
    /// assuming a single-byte terminator).
    pub fn after(record: &Record) -> Self {
        Self {
            offset: record.offset + record.text.len() as i64,
            inode: record.identity.inode,
            device: record.identity.device,
        }
    }

    pub fn matches_identity(&self, identity: &FileIdentity) -> bool {
        self.inode == identity.inode && self.device == identity.device
    }
}

/// Map from source path to FileState. The Registrar's entire durable
/// output; replayed on startup to resume each file at its last
/// acknowledged offset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry(HashMap<String, FileState>);

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&FileState> {
        self.0.get(path)
    }

    /// Insert or overwrite the state for `path`, returning true if the
    /// stored value actually changed (used to decide whether a flush to
    /// disk is warranted).
    pub fn set(&mut self, path: impl Into<String>, state: FileState) -> bool {
        let path = path.into();
        let changed = self.0.get(&path) != Some(&state);
        self.0.insert(path, state);
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileState)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn record(offset: i64, text: &str, inode: u64) -> Record {
        Record::new(
            "/tmp/a.log",
            offset,
            1,
            text,
            Arc::new(BTreeMap::new()),
            FileIdentity {
                inode,
                device: 1,
                size: 0,
                mtime_secs: 0,
            },
        )
    }

    #[test]
    fn after_computes_offset_without_terminator_bump() {
        let r = record(0, "hello", 7);
        let state = FileState::after(&r);
        assert_eq!(state.offset, 5);
        assert_eq!(state.inode, 7);
    }

    #[test]
    fn set_reports_whether_value_changed() {
        let mut reg = Registry::new();
        let state = FileState {
            offset: 5,
            inode: 1,
            device: 1,
        };
        assert!(reg.set("/tmp/a.log", state));
        assert!(!reg.set("/tmp/a.log", state));
        let state2 = FileState {
            offset: 6,
            ..state
        };
        assert!(reg.set("/tmp/a.log", state2));
    }

    #[test]
    fn matches_identity_checks_inode_and_device() {
        let state = FileState {
            offset: 0,
            inode: 1,
            device: 2,
        };
        let same = FileIdentity {
            inode: 1,
            device: 2,
            size: 0,
            mtime_secs: 0,
        };
        let different = FileIdentity {
            inode: 9,
            device: 2,
            size: 0,
            mtime_secs: 0,
        };
        assert!(state.matches_identity(&same));
        assert!(!state.matches_identity(&different));
    }

    proptest::proptest! {
        /// For any chain of records from the same harvester session, each
        /// starting where the previous one's `FileState::after` left off,
        /// offsets never go backwards and the chain's final offset equals
        /// the sum of every record's text length.
        #[test]
        fn after_is_monotonic_across_a_session(texts in proptest::collection::vec(".{0,40}", 0..20)) {
            let mut offset = 0i64;
            let mut total = 0i64;
            for text in &texts {
                let r = record(offset, text, 7);
                let state = FileState::after(&r);
                proptest::prop_assert!(state.offset >= offset);
                offset = state.offset;
                total += text.len() as i64;
            }
            proptest::prop_assert_eq!(offset, total);
        }
    }
}
