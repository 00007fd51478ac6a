use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::constants::VM_RECORD_FILE;

/// Collection strategy of a log descriptor. The kind fully determines
/// how the artifact is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Regular file; whole copy, or tail when `lines` is set
    File,
    /// Device/special file drained until end-of-stream
    Node,
    /// Fixed command whose standard output is captured
    Cmd,
}

/// One diagnostic artifact to collect and how to collect it.
///
/// Immutable once loaded; shared by reference across every crash/info
/// class that names it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSpec {
    pub name: String,
    pub kind: LogKind,
    /// Source path, file-name pattern, or command line depending on `kind`
    pub path: String,
    /// Collect only the trailing N logical lines of a `file` log
    #[serde(default)]
    pub lines: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Dir,
    File,
}

/// Filesystem trigger that raises events of a class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub path: PathBuf,
}

/// One reclassification candidate: the first candidate whose `content`
/// substrings all appear in the trigger file wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashMatch {
    pub name: String,
    #[serde(default)]
    pub content: Vec<String>,
    /// Up to three regexes whose first capture group becomes an
    /// auxiliary classification field
    #[serde(default)]
    pub data: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reclassify {
    pub candidates: Vec<CrashMatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    /// Local archival store
    Crashlog,
    /// Remote telemetry sink
    Telemetry,
}

/// Uptime milestone source watched by the detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimeSource {
    pub path: PathBuf,
    pub frequency_hours: u64,
}

/// One configured destination for processed events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    pub name: String,
    pub kind: SenderKind,
    pub outdir: PathBuf,
    pub quota_bytes: u64,
    #[serde(default)]
    pub uptime: Option<UptimeSource>,
    /// Class prefix for telemetry records, e.g. "hypervisor"
    #[serde(default)]
    pub class_prefix: Option<String>,
    /// Spool file for the JSON-lines telemetry transport; when absent
    /// the telemetry capability runs against the no-op transport
    #[serde(default)]
    pub spool_file: Option<PathBuf>,
}

impl SenderConfig {
    /// Guest-log read cursor file for this sender.
    pub fn vm_record_path(&self) -> PathBuf {
        self.outdir.join(VM_RECORD_FILE)
    }
}

/// One configured guest VM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmConfig {
    pub name: String,
    /// Root of the guest's data filesystem as exposed to the host
    pub image_root: PathBuf,
    /// Event-history log path relative to `image_root`
    pub history_log: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCrash {
    pub name: String,
    #[serde(default)]
    pub trigger: Option<Trigger>,
    /// Names into the top-level log descriptor table
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub reclassify: Option<Reclassify>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInfo {
    pub name: String,
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub logs: Vec<String>,
}

/// On-disk configuration document, resolved into `ProbeConfig` at load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawConfig {
    pub version: String,
    pub build_version: String,
    /// Durable property store backing key sequences and SWUPDATE detection
    pub state_file: PathBuf,
    #[serde(default)]
    pub reboot_reason_file: Option<PathBuf>,
    pub senders: Vec<SenderConfig>,
    #[serde(default)]
    pub logs: Vec<LogSpec>,
    #[serde(default)]
    pub crashes: Vec<RawCrash>,
    #[serde(default)]
    pub infos: Vec<RawInfo>,
    #[serde(default)]
    pub vms: Vec<VmConfig>,
}

impl RawConfig {
    /// Load a raw configuration document from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: RawConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML config")?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save this configuration to a YAML file.
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }
}

impl Default for RawConfig {
    fn default() -> Self {
        RawConfig {
            version: "1.0".to_string(),
            build_version: env!("CARGO_PKG_VERSION").to_string(),
            state_file: PathBuf::from("/var/lib/hvprobe/state.json"),
            reboot_reason_file: None,
            senders: vec![
                SenderConfig {
                    name: "crashlog".to_string(),
                    kind: SenderKind::Crashlog,
                    outdir: PathBuf::from("/var/log/crashlog"),
                    quota_bytes: 512 * 1024 * 1024,
                    uptime: Some(UptimeSource {
                        path: PathBuf::from("/var/log/crashlog/uptime"),
                        frequency_hours: 6,
                    }),
                    class_prefix: None,
                    spool_file: None,
                },
                SenderConfig {
                    name: "telemd".to_string(),
                    kind: SenderKind::Telemetry,
                    outdir: PathBuf::from("/var/spool/hvprobe"),
                    quota_bytes: 128 * 1024 * 1024,
                    uptime: Some(UptimeSource {
                        path: PathBuf::from("/var/spool/hvprobe/uptime"),
                        frequency_hours: 6,
                    }),
                    class_prefix: Some("hypervisor".to_string()),
                    spool_file: Some(PathBuf::from("/var/spool/hvprobe/records.jsonl")),
                },
            ],
            logs: vec![
                LogSpec {
                    name: "syslog".to_string(),
                    kind: LogKind::File,
                    path: "/var/log/messages".to_string(),
                    lines: Some(200),
                },
                LogSpec {
                    name: "dmesg".to_string(),
                    kind: LogKind::Cmd,
                    path: "dmesg".to_string(),
                    lines: None,
                },
            ],
            crashes: vec![RawCrash {
                name: "HVCRASH".to_string(),
                trigger: Some(Trigger {
                    kind: TriggerKind::Dir,
                    path: PathBuf::from("/var/log/crash"),
                }),
                logs: vec!["syslog".to_string(), "dmesg".to_string()],
                reclassify: None,
            }],
            infos: vec![],
            vms: vec![],
        }
    }
}
