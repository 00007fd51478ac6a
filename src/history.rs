//! Append-only structured record sink.
//!
//! Every archived or skipped event leaves one line in the history file;
//! the pipeline never reads it back.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::utils::time::uptime_string;

/// File-backed history store. Opened once at sender activation.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    /// Open (or create) the history file, writing a header on creation.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }

        if !path.exists() {
            let host = hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            let mut file = File::create(path)
                .context(format!("Failed to create history file {}", path.display()))?;
            writeln!(file, "#V1.0 {} {}", host, Utc::now().to_rfc3339())
                .context("Failed to write history header")?;
        }

        Ok(HistoryStore {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one structured event record.
    pub fn raise_event(
        &self,
        event_type: &str,
        class: &str,
        dir: Option<&Path>,
        extra: &str,
        key: &str,
    ) -> Result<()> {
        let dir = dir.map(|d| d.display().to_string()).unwrap_or_default();
        self.append(&format!(
            "{:<8}{:<22}{}  {} {} {}",
            event_type,
            key,
            Utc::now().to_rfc3339(),
            class,
            dir,
            extra
        ))
    }

    /// Append an informational error record, e.g. over-quota.
    pub fn raise_info_error(&self, code: &str) -> Result<()> {
        self.append(&format!(
            "{:<8}{:<22}{}  {}",
            "ERROR",
            "-",
            Utc::now().to_rfc3339(),
            code
        ))
    }

    /// Append an uptime milestone record.
    pub fn raise_uptime(&self, note: Option<&str>) -> Result<()> {
        self.append(&format!(
            "{:<8}{:<22}{}  {}",
            "UPTIME",
            "-",
            Utc::now().to_rfc3339(),
            note.unwrap_or(&uptime_string())
        ))
    }

    fn append(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .context(format!("Failed to open history file {}", self.path.display()))?;
        writeln!(file, "{}", line)
            .context(format!("Failed to append to {}", self.path.display()))?;
        Ok(())
    }
}
