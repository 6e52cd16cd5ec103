// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loads and validates the agent's configuration document.

use anyhow::{bail, Context, Result};
use lsf_core::config::MAX_CONFIG_SIZE;
use lsf_core::AgentConfig;
use std::path::Path;

pub fn load(path: &Path) -> Result<AgentConfig> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("stat config file {}", path.display()))?;
    if meta.len() > MAX_CONFIG_SIZE {
        bail!(
            "config file {} is {} bytes, exceeds the {} byte limit",
            path.display(),
            meta.len(),
            MAX_CONFIG_SIZE
        );
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let config: AgentConfig =
        serde_json::from_str(&raw).with_context(|| format!("parse config file {}", path.display()))?;

    if config.files.is_empty() {
        bail!("config has no `files` entries, nothing to watch");
    }
    for entry in &config.files {
        if entry.paths.is_empty() {
            bail!("a `files` entry has no paths");
        }
    }
    if config.network.servers.is_empty() {
        bail!("config has no `network.servers` entries");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_config_missing_files_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"network": {{"servers": ["a:1"]}}, "files": []}}"#).unwrap();
        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().contains("no `files` entries"));
    }

    #[test]
    fn rejects_oversized_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let padding = "x".repeat((MAX_CONFIG_SIZE + 1) as usize);
        write!(file, r#"{{"padding": "{padding}"}}"#).unwrap();
        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn accepts_a_minimal_valid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"network": {{"servers": ["collector:5043"]}}, "files": [{{"paths": ["*.log"]}}]}}"#
        )
        .unwrap();
        let config = load(file.path()).unwrap();
        assert_eq!(config.network.servers, vec!["collector:5043".to_string()]);
        assert_eq!(config.files.len(), 1);
    }
}
