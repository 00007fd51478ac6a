//! Disk-quota gating for sender output directories.

use std::path::Path;

use log::debug;

use crate::utils::fs::dir_usage_bytes;

/// True while the sender's output directory is below its quota.
///
/// Collection must not proceed once this returns false; the caller
/// raises an informational over-quota event instead.
pub fn has_space(outdir: &Path, quota_bytes: u64) -> bool {
    let used = dir_usage_bytes(outdir);
    debug!(
        "quota check for {}: {} of {} bytes used",
        outdir.display(),
        used,
        quota_bytes
    );
    used < quota_bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn space_exhausted_at_quota_boundary() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("blob"), [0u8; 100]).unwrap();

        assert!(has_space(dir.path(), 101));
        assert!(!has_space(dir.path(), 100));
        assert!(!has_space(dir.path(), 50));
    }

    #[test]
    fn missing_directory_counts_as_empty() {
        let dir = TempDir::new().unwrap();
        assert!(has_space(&dir.path().join("missing"), 1));
    }
}
