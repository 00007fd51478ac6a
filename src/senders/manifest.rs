use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::constants::MANIFEST_FILE;

/// Write the per-event manifest into an archived event directory.
///
/// Plain `KEY=value` lines: event type, deduplication key, class name,
/// and up to three auxiliary fields.
pub fn write(
    dir: &Path,
    event_type: &str,
    key: &str,
    class: &str,
    data: &[Option<String>; 3],
) -> Result<()> {
    let path = dir.join(MANIFEST_FILE);
    let mut file =
        File::create(&path).context(format!("Failed to create {}", path.display()))?;

    writeln!(file, "EVENT={}", event_type)?;
    writeln!(file, "ID={}", key)?;
    writeln!(file, "CLASS={}", class)?;
    for (i, field) in data.iter().enumerate() {
        if let Some(value) = field {
            writeln!(file, "DATA{}={}", i, value)?;
        }
    }
    Ok(())
}
