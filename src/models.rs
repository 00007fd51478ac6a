use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{CrashSpec, InfoSpec};

/// Kind of a detected event, fixed at detection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Crash,
    Info,
    Uptime,
    Reboot,
    Vm,
}

impl EventKind {
    /// Label used in structured records and deduplication keys
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Crash => "CRASH",
            EventKind::Info => "INFO",
            EventKind::Uptime => "UPTIME",
            EventKind::Reboot => "REBOOT",
            EventKind::Vm => "VM",
        }
    }
}

/// Classification data attached to an event by the detector.
///
/// Replaced by the dispatcher when a crash gets reclassified, so that
/// senders running later see the specific subtype.
#[derive(Debug, Clone)]
pub enum EventClass {
    Crash(Arc<CrashSpec>),
    Info(Arc<InfoSpec>),
    None,
}

/// One detected event, owned by the dispatcher for the duration of a
/// single fan-out to all senders.
#[derive(Debug)]
pub struct Event {
    pub kind: EventKind,
    /// Detection channel, e.g. "inotify" or "timer"
    pub channel: String,
    /// Trigger file name relative to the trigger directory (may be empty
    /// for timer-driven events)
    pub path: String,
    /// Per-event output directory, assigned once a collection target exists
    pub dir: Option<PathBuf>,
    pub class: EventClass,
}

impl Event {
    pub fn new(kind: EventKind, channel: &str, path: &str, class: EventClass) -> Self {
        Event {
            kind,
            channel: channel.to_string(),
            path: path.to_string(),
            dir: None,
            class,
        }
    }
}

/// Outcome of processing one guest event-log line.
///
/// `Handled` lines are safe to advance the read cursor past; `Deferred`
/// lines are retried on the next synchronization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Handled,
    Deferred,
}
