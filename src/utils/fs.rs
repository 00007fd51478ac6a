use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Total size in bytes of all regular files under `dir`.
///
/// A missing directory counts as empty; unreadable entries are skipped.
pub fn dir_usage_bytes(dir: &Path) -> u64 {
    if !dir.exists() {
        return 0;
    }

    WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .sum()
}

/// Copy a regular file verbatim.
pub fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .context(format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::copy(src, dest)
        .context(format!("Failed to copy {} to {}", src.display(), dest.display()))?;
    Ok(())
}

/// Count logical lines of a file. A trailing chunk without a final
/// newline still counts as a line.
pub fn count_lines(content: &[u8]) -> usize {
    if content.is_empty() {
        return 0;
    }
    let newlines = content.iter().filter(|&&b| b == b'\n').count();
    if content.ends_with(b"\n") {
        newlines
    } else {
        newlines + 1
    }
}

/// Copy the trailing `lines` logical lines of `src` to `dest`, verbatim.
///
/// The copy starts at line `max(total - lines, 0) + 1` (1-indexed) and
/// runs to end of file.
pub fn copy_tail(src: &Path, dest: &Path, lines: usize) -> Result<()> {
    let content = fs::read(src).context(format!("Failed to read {}", src.display()))?;

    let total = count_lines(&content);
    let skip = total.saturating_sub(lines);

    let mut offset = 0;
    let mut skipped = 0;
    while skipped < skip {
        match content[offset..].iter().position(|&b| b == b'\n') {
            Some(i) => {
                offset += i + 1;
                skipped += 1;
            }
            None => break,
        }
    }

    let mut out = File::create(dest)
        .context(format!("Failed to create {}", dest.display()))?;
    out.write_all(&content[offset..])
        .context(format!("Failed to write {}", dest.display()))?;
    Ok(())
}

/// Drain a device node or stream-like file to `dest` until end-of-stream.
pub fn drain_to_file(src: &Path, dest: &Path) -> Result<()> {
    let mut input = File::open(src).context(format!("Failed to open {}", src.display()))?;
    let mut out = File::create(dest)
        .context(format!("Failed to create {}", dest.display()))?;
    io::copy(&mut input, &mut out)
        .context(format!("Failed to drain {} to {}", src.display(), dest.display()))?;
    Ok(())
}

/// Find the first directory under `root` (up to `max_depth` levels down)
/// whose name contains `name` as a substring.
pub fn find_dir(root: &Path, name: &str, max_depth: usize) -> Result<Option<PathBuf>> {
    if !root.exists() {
        return Ok(None);
    }

    for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth) {
        let entry = entry.context(format!("Failed to walk {}", root.display()))?;
        if entry.file_type().is_dir()
            && entry.file_name().to_string_lossy().contains(name)
        {
            return Ok(Some(entry.into_path()));
        }
    }

    Ok(None)
}
