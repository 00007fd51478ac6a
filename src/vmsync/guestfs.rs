use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Failure while extracting a guest directory.
///
/// `recovered` counts files already copied before the failure; a
/// missing source directory reports zero recovered and `missing`.
#[derive(Debug)]
pub struct ExtractError {
    pub recovered: usize,
    pub missing: bool,
    pub source: anyhow::Error,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "extraction failed after {} files: {:#}",
            self.recovered, self.source
        )
    }
}

/// Read access to a guest VM's data filesystem.
///
/// The handle is held for the duration of one synchronization pass and
/// released before the next begins.
pub trait GuestFs {
    /// Read the guest's event-history log, given relative to the
    /// filesystem root.
    fn read_event_log(&self, path: &Path) -> Result<String>;

    /// Extract a guest directory (relative to the filesystem root) into
    /// `dest`, returning the number of files recovered.
    fn extract_dir(&self, src: &Path, dest: &Path) -> std::result::Result<usize, ExtractError>;
}

/// Guest filesystem exposed as a host directory tree, e.g. a mounted
/// or shared guest data partition.
#[derive(Debug)]
pub struct DirImage {
    root: PathBuf,
}

impl DirImage {
    pub fn new(root: &Path) -> Self {
        DirImage {
            root: root.to_path_buf(),
        }
    }
}

impl GuestFs for DirImage {
    fn read_event_log(&self, path: &Path) -> Result<String> {
        let full = self.root.join(path);
        fs::read_to_string(&full)
            .context(format!("Failed to read guest event log {}", full.display()))
    }

    fn extract_dir(&self, src: &Path, dest: &Path) -> std::result::Result<usize, ExtractError> {
        let full = self.root.join(src);
        if !full.is_dir() {
            return Err(ExtractError {
                recovered: 0,
                missing: true,
                source: anyhow::anyhow!("guest directory {} does not exist", full.display()),
            });
        }

        let mut recovered = 0;
        for entry in WalkDir::new(&full).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    return Err(ExtractError {
                        recovered,
                        missing: false,
                        source: e.into(),
                    })
                }
            };

            let rel = entry
                .path()
                .strip_prefix(&full)
                .expect("walked entry is under its root");
            let target = dest.join(rel);

            let result = if entry.file_type().is_dir() {
                fs::create_dir_all(&target)
                    .context(format!("Failed to create {}", target.display()))
            } else {
                crate::utils::fs::copy_file(entry.path(), &target)
            };

            if let Err(e) = result {
                return Err(ExtractError {
                    recovered,
                    missing: false,
                    source: e,
                });
            }
            if entry.file_type().is_file() {
                recovered += 1;
            }
        }

        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn extract_copies_directory_tree() {
        let guest = TempDir::new().unwrap();
        fs::create_dir_all(guest.path().join("logs/crashlog0/sub")).unwrap();
        fs::write(guest.path().join("logs/crashlog0/a.txt"), "a").unwrap();
        fs::write(guest.path().join("logs/crashlog0/sub/b.txt"), "b").unwrap();

        let dest = TempDir::new().unwrap();
        let image = DirImage::new(guest.path());
        let recovered = image
            .extract_dir(Path::new("logs/crashlog0"), dest.path())
            .unwrap();

        assert_eq!(recovered, 2);
        assert_eq!(fs::read_to_string(dest.path().join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(dest.path().join("sub/b.txt")).unwrap(), "b");
    }

    #[test]
    fn missing_source_reports_zero_recovered() {
        let guest = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let image = DirImage::new(guest.path());

        let err = image
            .extract_dir(Path::new("logs/absent"), dest.path())
            .unwrap_err();
        assert!(err.missing);
        assert_eq!(err.recovered, 0);
    }
}
