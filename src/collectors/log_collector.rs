use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};

use crate::collectors::patterns;
use crate::config::{LogKind, LogSpec};
use crate::constants::SLOW_COLLECT_SECS;
use crate::utils::fs::{copy_file, copy_tail, drain_to_file};
use crate::utils::time::uptime_string;

/// Collect one log descriptor into `dest_dir`.
///
/// A failing artifact is logged and skipped; sibling collections are
/// unaffected. The whole step is timed and flagged at warn level when
/// it exceeds the slow-collection threshold.
pub fn collect(spec: &LogSpec, dest_dir: &Path) -> Result<()> {
    let start = Instant::now();

    if patterns::is_pattern(&spec.path) {
        let files = patterns::expand(&spec.path)
            .context(format!("Failed to expand pattern of log {}", spec.name))?;
        if files.is_empty() {
            warn!("no logs found for ({})", spec.name);
        }
        for file in files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| anyhow!("invalid path {} in log {}", file.display(), spec.name))?;
            let dest = dest_filename(dest_dir, spec, &name);
            if let Err(e) = collect_one(spec, &file, &dest) {
                warn!("collecting {} from {} failed: {:#}", spec.name, file.display(), e);
            }
        }
    } else {
        let dest = dest_filename(dest_dir, spec, &spec.name);
        collect_one(spec, Path::new(&spec.path), &dest)?;
    }

    let spent = start.elapsed().as_secs();
    if spent < SLOW_COLLECT_SECS {
        debug!("get ({}) spent {}s", spec.name, spent);
    } else {
        warn!("get ({}) spent {}s", spec.name, spent);
    }
    Ok(())
}

/// Destination file name for one collected artifact.
///
/// Command captures and tail extractions get a boot-uptime suffix so
/// repeated captures of the same class never overwrite each other.
pub fn dest_filename(dest_dir: &Path, spec: &LogSpec, base: &str) -> PathBuf {
    let needs_timestamp = spec.kind == LogKind::Cmd || spec.lines.is_some();
    if needs_timestamp {
        dest_dir.join(format!("{}_{}", base, uptime_string()))
    } else {
        dest_dir.join(base)
    }
}

fn collect_one(spec: &LogSpec, src: &Path, dest: &Path) -> Result<()> {
    match spec.kind {
        LogKind::File => match spec.lines {
            Some(lines) if lines > 0 => copy_tail(src, dest, lines),
            _ => copy_file(src, dest),
        },
        LogKind::Node => drain_to_file(src, dest),
        LogKind::Cmd => capture_command(&spec.path, dest),
    }
}

/// Execute a fixed command, never through a shell, and capture its
/// standard output.
fn capture_command(cmdline: &str, dest: &Path) -> Result<()> {
    let mut parts = cmdline.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| anyhow!("empty command line"))?;

    let output = Command::new(program)
        .args(parts)
        .output()
        .context(format!("Failed to execute {}", cmdline))?;

    if !output.status.success() {
        warn!("command ({}) returned {}", cmdline, output.status);
    }

    std::fs::write(dest, &output.stdout)
        .context(format!("Failed to write {}", dest.display()))?;
    Ok(())
}
