//! On-disk property store.
//!
//! Holds the durable state the pipeline needs across restarts: the
//! monotonic event sequence backing deduplication keys, the last build
//! version recorded per sender (backing SWUPDATE detection), and the
//! next uptime milestone cycle per sender.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PropertyData {
    event_seq: u64,
    #[serde(default)]
    build_versions: HashMap<String, String>,
    #[serde(default)]
    uptime_cycles: HashMap<String, u64>,
}

/// File-backed property store, flushed after every mutation.
#[derive(Debug)]
pub struct PropertyStore {
    path: PathBuf,
    data: PropertyData,
}

impl PropertyStore {
    /// Open (or create) the property store at `path`.
    ///
    /// Failure here is fatal for sender activation.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }

        let data = if path.exists() {
            let content = fs::read_to_string(path)
                .context(format!("Failed to read property store {}", path.display()))?;
            serde_json::from_str(&content)
                .context(format!("Failed to parse property store {}", path.display()))?
        } else {
            PropertyData::default()
        };

        Ok(PropertyStore {
            path: path.to_path_buf(),
            data,
        })
    }

    /// Advance and persist the monotonic event sequence.
    pub fn next_event_seq(&mut self) -> Result<u64> {
        self.data.event_seq += 1;
        self.flush()?;
        Ok(self.data.event_seq)
    }

    /// Record `current` as the build version seen by `sender` and report
    /// whether it differs from the previously recorded one.
    ///
    /// The very first observation is not a change.
    pub fn build_version_changed(&mut self, sender: &str, current: &str) -> Result<bool> {
        let previous = self
            .data
            .build_versions
            .insert(sender.to_string(), current.to_string());
        self.flush()?;

        Ok(match previous {
            Some(prev) => prev != current,
            None => false,
        })
    }

    /// Next uptime milestone cycle for `sender`. Starts at 1 so the
    /// first milestone fires once host uptime reaches one frequency
    /// interval.
    pub fn uptime_cycle(&self, sender: &str) -> u64 {
        self.data.uptime_cycles.get(sender).copied().unwrap_or(1)
    }

    /// Persist the next uptime milestone cycle for `sender`.
    pub fn set_uptime_cycle(&mut self, sender: &str, cycle: u64) -> Result<()> {
        self.data.uptime_cycles.insert(sender.to_string(), cycle);
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.data)
            .context("Failed to serialize property store")?;
        fs::write(&self.path, content)
            .context(format!("Failed to write property store {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn event_seq_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut store = PropertyStore::open(&path).unwrap();
        assert_eq!(store.next_event_seq().unwrap(), 1);
        assert_eq!(store.next_event_seq().unwrap(), 2);
        drop(store);

        let mut store = PropertyStore::open(&path).unwrap();
        assert_eq!(store.next_event_seq().unwrap(), 3);
    }

    #[test]
    fn build_version_change_detected_per_sender() {
        let dir = TempDir::new().unwrap();
        let mut store = PropertyStore::open(&dir.path().join("state.json")).unwrap();

        assert!(!store.build_version_changed("crashlog", "1.0").unwrap());
        assert!(!store.build_version_changed("crashlog", "1.0").unwrap());
        assert!(store.build_version_changed("crashlog", "1.1").unwrap());
        // independent tracking per sender
        assert!(!store.build_version_changed("telemd", "1.1").unwrap());
    }

    #[test]
    fn uptime_cycle_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut store = PropertyStore::open(&path).unwrap();
        assert_eq!(store.uptime_cycle("telemd"), 1);
        store.set_uptime_cycle("telemd", 6).unwrap();
        drop(store);

        let store = PropertyStore::open(&path).unwrap();
        assert_eq!(store.uptime_cycle("telemd"), 6);
        assert_eq!(store.uptime_cycle("other"), 1);
    }
}
