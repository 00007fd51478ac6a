//! Crash reclassification.
//!
//! A generic trigger crash can declare candidate subtypes, each matched
//! by substrings of the triggering artifact. The first matching
//! candidate wins and its data regexes extract up to three auxiliary
//! classification fields from the same file.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::debug;
use regex::Regex;

use crate::config::{CrashMatch, CrashSpec};

/// Result of reclassifying one crash event.
#[derive(Debug, Default)]
pub struct ReclassifyOutcome {
    /// Specific crash subtype name
    pub name: String,
    /// Auxiliary classification fields recorded in the manifest
    pub data: [Option<String>; 3],
}

/// Determine the specific subtype of a generic crash event.
///
/// Returns an error when the trigger file is unreadable or no candidate
/// matches; the caller aborts processing of this event for the current
/// sender.
pub fn reclassify(spec: &CrashSpec, trigger_file: Option<&Path>) -> Result<ReclassifyOutcome> {
    let reclassify = spec
        .reclassify
        .as_ref()
        .ok_or_else(|| anyhow!("crash class {} declares no reclassification", spec.name))?;

    let path = trigger_file
        .ok_or_else(|| anyhow!("crash class {} has no trigger file to inspect", spec.name))?;
    let content = fs::read_to_string(path)
        .context(format!("Failed to read trigger file {}", path.display()))?;

    for candidate in &reclassify.candidates {
        if candidate.content.iter().all(|needle| content.contains(needle)) {
            debug!("crash {} reclassified as {}", spec.name, candidate.name);
            return Ok(ReclassifyOutcome {
                name: candidate.name.clone(),
                data: extract_data(candidate, &content)?,
            });
        }
    }

    Err(anyhow!(
        "no reclassification candidate of {} matches {}",
        spec.name,
        path.display()
    ))
}

fn extract_data(candidate: &CrashMatch, content: &str) -> Result<[Option<String>; 3]> {
    let mut data: [Option<String>; 3] = Default::default();

    for (slot, pattern) in data.iter_mut().zip(candidate.data.iter()) {
        let re = Regex::new(pattern)
            .context(format!("Invalid data pattern regex: {}", pattern))?;
        *slot = re
            .captures(content)
            .and_then(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| m.as_str().to_string());
    }

    Ok(data)
}
