//! Global constants for the hvprobe agent.
//!
//! This module centralizes hardcoded values shared across the sender
//! pipeline to improve maintainability.

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hvprobe/hvprobe.yaml";

/// Append-only structured record file, kept under the archive sender's outdir
pub const HISTORY_FILE: &str = "history_event";

/// Per-sender guest-log read cursor file, kept under the sender's outdir
pub const VM_RECORD_FILE: &str = "VM_eventsID.log";

/// Manifest file written into every archived event directory
pub const MANIFEST_FILE: &str = "crashfile";

/// Marker that introduces a guest log-directory reference in a VM event line
pub const GUEST_LOGS_MARKER: &str = "/logs/";

/// Event-directory prefixes, one per archival mode
pub const CRASH_DIR_PREFIX: &str = "crash";
pub const STATS_DIR_PREFIX: &str = "stats";
pub const VMEVENT_DIR_PREFIX: &str = "vmevent";

/// Length of a deduplication key in hex characters
pub const KEY_LEN: usize = 20;

/// Length of a telemetry event id in hex characters
pub const EVENT_ID_LEN: usize = 32;

/// A single log collection taking longer than this is flagged at warn level
pub const SLOW_COLLECT_SECS: u64 = 5;

/// Maximum directory depth searched when resolving an archived VM log dir
pub const VM_LOG_SEARCH_DEPTH: usize = 2;

/// Channel name assigned to events raised by file-watch detection
pub const CHANNEL_INOTIFY: &str = "inotify";

/// History code raised when a sender's output directory is over quota
pub const SPACE_FULL: &str = "SPACE_FULL";
