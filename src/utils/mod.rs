//! Filesystem and time helpers for the sender pipeline.
//!
//! These are the low-level primitives the collectors and senders are
//! built on: directory usage measurement, verbatim and tail copies,
//! device-node drains, and boot-relative uptime formatting.

pub mod fs;
pub mod time;

use std::fs as stdfs;
use std::path::Path;

use log::warn;

/// Read the startup reason recorded by the platform, if any.
///
/// The reason file is written by firmware/boot tooling outside this agent;
/// only its first whitespace-delimited token is meaningful.
pub fn startup_reason(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return "UNKNOWN".to_string();
    };

    match stdfs::read_to_string(path) {
        Ok(content) => content
            .split_whitespace()
            .next()
            .unwrap_or("UNKNOWN")
            .to_string(),
        Err(e) => {
            warn!("failed to read startup reason from {}: {}", path.display(), e);
            "UNKNOWN".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn startup_reason_reads_first_token() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reason");
        fs::write(&path, "WATCHDOG extra fields\n").unwrap();
        assert_eq!(startup_reason(Some(&path)), "WATCHDOG");
    }

    #[test]
    fn startup_reason_defaults_to_unknown() {
        assert_eq!(startup_reason(None), "UNKNOWN");
        let dir = TempDir::new().unwrap();
        assert_eq!(startup_reason(Some(&dir.path().join("missing"))), "UNKNOWN");
    }
}
