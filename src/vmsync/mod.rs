//! Guest-VM event synchronization.
//!
//! Each configured guest exposes an append-only event-history log. A
//! synchronization pass parses new lines into structured VM events and
//! hands each to the active sender; handled lines advance a persisted
//! per-VM read cursor, deferred lines are retried on the next pass.

mod guestfs;

pub use guestfs::{DirImage, ExtractError, GuestFs};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, warn};

use crate::config::VmConfig;
use crate::constants::GUEST_LOGS_MARKER;
use crate::models::SyncOutcome;

/// One guest event-history line, parsed.
///
/// The fixed grammar is five whitespace-delimited fields: event kind,
/// per-VM key, long-form timestamp, subtype, and a free-form remainder
/// that may embed a `/logs/...` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmEvent {
    pub kind: String,
    pub vm_key: String,
    pub timestamp: String,
    pub subtype: String,
    pub rest: String,
}

impl VmEvent {
    /// Parse one line; `None` means the line is permanently
    /// unparseable and skipping it is the only safe action.
    pub fn parse(line: &str) -> Option<VmEvent> {
        let mut offset = 0;
        let mut tokens = Vec::with_capacity(4);

        for _ in 0..4 {
            let rest = &line[offset..];
            let start = offset + rest.find(|c: char| !c.is_whitespace())?;
            let token_rest = &line[start..];
            let end = token_rest
                .find(char::is_whitespace)
                .map(|i| start + i)
                .unwrap_or(line.len());
            tokens.push(&line[start..end]);
            offset = end;
        }

        let rest = line[offset..].trim();
        if rest.is_empty() {
            return None;
        }

        Some(VmEvent {
            kind: tokens[0].to_string(),
            vm_key: tokens[1].to_string(),
            timestamp: tokens[2].to_string(),
            subtype: tokens[3].to_string(),
            rest: rest.to_string(),
        })
    }

    /// The embedded guest log-directory reference, starting at the
    /// `/logs/` marker, if the remainder carries one.
    pub fn logs_ref(&self) -> Option<&str> {
        self.rest
            .find(GUEST_LOGS_MARKER)
            .map(|i| &self.rest[i..])
    }
}

/// One configured guest VM at runtime.
pub struct VmRuntime {
    pub name: String,
    pub history_log: PathBuf,
    pub fs: Box<dyn GuestFs>,
}

impl VmRuntime {
    /// Build runtime state for a configured VM with a directory-backed
    /// guest filesystem.
    pub fn from_config(config: &VmConfig) -> Self {
        VmRuntime {
            name: config.name.clone(),
            history_log: config.history_log.clone(),
            fs: Box::new(DirImage::new(&config.image_root)),
        }
    }
}

/// Persisted per-VM read cursors for one sender.
#[derive(Debug)]
pub struct CursorStore {
    path: PathBuf,
    offsets: HashMap<String, u64>,
}

impl CursorStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }

        let offsets = if path.exists() {
            let content = fs::read_to_string(path)
                .context(format!("Failed to read cursor file {}", path.display()))?;
            serde_json::from_str(&content)
                .context(format!("Failed to parse cursor file {}", path.display()))?
        } else {
            HashMap::new()
        };

        Ok(CursorStore {
            path: path.to_path_buf(),
            offsets,
        })
    }

    pub fn get(&self, vm: &str) -> u64 {
        self.offsets.get(vm).copied().unwrap_or(0)
    }

    pub fn set(&mut self, vm: &str, offset: u64) {
        self.offsets.insert(vm.to_string(), offset);
    }

    pub fn flush(&self) -> Result<()> {
        let content =
            serde_json::to_string_pretty(&self.offsets).context("Failed to serialize cursors")?;
        fs::write(&self.path, content)
            .context(format!("Failed to write cursor file {}", self.path.display()))?;
        Ok(())
    }
}

/// One synchronization pass over every configured guest.
///
/// Complete lines past the cursor are parsed and handed to `handle`;
/// the cursor advances past handled lines and stops at the first
/// deferred one, leaving it for the next pass. Unparseable lines are
/// skipped permanently. Cursors are flushed at the end of the pass.
pub fn run_pass<F>(vms: &[VmRuntime], cursors: &mut CursorStore, mut handle: F) -> Result<()>
where
    F: FnMut(&VmRuntime, &VmEvent) -> SyncOutcome,
{
    for vm in vms {
        let text = match vm.fs.read_event_log(&vm.history_log) {
            Ok(text) => text,
            Err(e) => {
                warn!("reading event log of ({}) failed: {:#}", vm.name, e);
                continue;
            }
        };

        let mut pos = cursors.get(&vm.name) as usize;
        // a rewritten log can shrink or move the cursor inside a
        // multi-byte character; both invalidate the saved position
        if pos > text.len() || !text.is_char_boundary(pos) {
            warn!("event log of ({}) was rewritten, rescanning from the start", vm.name);
            pos = 0;
        }

        while pos < text.len() {
            // a line still being written stays for the next pass
            let Some(nl) = text[pos..].find('\n') else {
                break;
            };
            let line = &text[pos..pos + nl];
            let next = pos + nl + 1;

            let outcome = match VmEvent::parse(line) {
                Some(event) => handle(vm, &event),
                None => {
                    if !line.trim().is_empty() {
                        error!("got an invalid line from ({}), skip", vm.name);
                    }
                    SyncOutcome::Handled
                }
            };

            match outcome {
                SyncOutcome::Handled => {
                    pos = next;
                    cursors.set(&vm.name, pos as u64);
                }
                SyncOutcome::Deferred => break,
            }
        }
    }

    cursors.flush()
}
