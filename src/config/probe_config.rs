use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::info;

use crate::config::schema::{
    LogSpec, RawConfig, Reclassify, SenderConfig, SenderKind, Trigger, VmConfig,
};
use crate::constants::DEFAULT_CONFIG_PATH;

/// Configuration entry naming a crash class and its associated log
/// descriptors. Read-only during event processing.
#[derive(Debug)]
pub struct CrashSpec {
    pub name: String,
    pub trigger: Option<Trigger>,
    pub logs: Vec<Arc<LogSpec>>,
    pub reclassify: Option<Reclassify>,
}

impl CrashSpec {
    pub fn wants_collection(&self) -> bool {
        !self.logs.is_empty()
    }

    /// Derived subtype entry used when reclassification names a subtype
    /// that has no dedicated class entry of its own.
    pub fn renamed(&self, name: &str) -> CrashSpec {
        CrashSpec {
            name: name.to_string(),
            trigger: self.trigger.clone(),
            logs: self.logs.clone(),
            reclassify: None,
        }
    }
}

/// Configuration entry naming an informational event class.
#[derive(Debug)]
pub struct InfoSpec {
    pub name: String,
    pub trigger: Option<Trigger>,
    pub logs: Vec<Arc<LogSpec>>,
}

impl InfoSpec {
    pub fn wants_collection(&self) -> bool {
        !self.logs.is_empty()
    }
}

/// Immutable configuration value constructed once at startup and shared
/// by reference across dispatcher, collectors and senders.
#[derive(Debug)]
pub struct ProbeConfig {
    pub version: String,
    pub build_version: String,
    pub state_file: PathBuf,
    pub reboot_reason_file: Option<PathBuf>,
    pub senders: Vec<Arc<SenderConfig>>,
    pub logs: Vec<Arc<LogSpec>>,
    pub crashes: Vec<Arc<CrashSpec>>,
    pub infos: Vec<Arc<InfoSpec>>,
    pub vms: Vec<VmConfig>,
}

impl ProbeConfig {
    /// Load and resolve a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = RawConfig::from_yaml_file(path)?;
        Self::resolve(raw)
    }

    /// Resolve a raw document: log-name references become shared
    /// descriptors, preserving declaration order throughout.
    pub fn resolve(raw: RawConfig) -> Result<Self> {
        // senders run in declaration order, and the telemetry sender
        // locates artifacts the crashlog sender archived earlier in the
        // same fan-out; declaring them the other way around starves
        // every telemetry lookup
        let crashlog_pos = raw
            .senders
            .iter()
            .position(|s| s.kind == SenderKind::Crashlog);
        let telemetry_pos = raw
            .senders
            .iter()
            .position(|s| s.kind == SenderKind::Telemetry);
        if let (Some(crashlog), Some(telemetry)) = (crashlog_pos, telemetry_pos) {
            if telemetry < crashlog {
                return Err(anyhow!(
                    "sender {} must be declared after sender {}",
                    raw.senders[telemetry].name,
                    raw.senders[crashlog].name
                ));
            }
        }

        let logs: Vec<Arc<LogSpec>> = raw.logs.into_iter().map(Arc::new).collect();

        let lookup = |name: &str| -> Result<Arc<LogSpec>> {
            logs.iter()
                .find(|log| log.name == name)
                .cloned()
                .ok_or_else(|| anyhow!("unknown log descriptor: {}", name))
        };

        let mut crashes = Vec::with_capacity(raw.crashes.len());
        for crash in raw.crashes {
            let resolved = crash
                .logs
                .iter()
                .map(|name| lookup(name))
                .collect::<Result<Vec<_>>>()
                .context(format!("resolving logs of crash class {}", crash.name))?;
            crashes.push(Arc::new(CrashSpec {
                name: crash.name,
                trigger: crash.trigger,
                logs: resolved,
                reclassify: crash.reclassify,
            }));
        }

        let mut infos = Vec::with_capacity(raw.infos.len());
        for info in raw.infos {
            let resolved = info
                .logs
                .iter()
                .map(|name| lookup(name))
                .collect::<Result<Vec<_>>>()
                .context(format!("resolving logs of info class {}", info.name))?;
            infos.push(Arc::new(InfoSpec {
                name: info.name,
                trigger: info.trigger,
                logs: resolved,
            }));
        }

        Ok(ProbeConfig {
            version: raw.version,
            build_version: raw.build_version,
            state_file: raw.state_file,
            reboot_reason_file: raw.reboot_reason_file,
            senders: raw.senders.into_iter().map(Arc::new).collect(),
            logs,
            crashes,
            infos,
            vms: raw.vms,
        })
    }

    pub fn crash_by_name(&self, name: &str) -> Option<Arc<CrashSpec>> {
        self.crashes.iter().find(|c| c.name == name).cloned()
    }

    pub fn info_by_name(&self, name: &str) -> Option<Arc<InfoSpec>> {
        self.infos.iter().find(|i| i.name == name).cloned()
    }

    /// First configured local archive sender, the destination of VM log
    /// extraction and the search root for telemetry VM log lookup.
    pub fn crashlog_sender(&self) -> Option<Arc<SenderConfig>> {
        self.senders
            .iter()
            .find(|s| s.kind == SenderKind::Crashlog)
            .cloned()
    }
}

/// Load a configuration file or fall back to the built-in default.
///
/// A path given explicitly must exist; without one the default location
/// is tried before falling back.
pub fn load_or_default(config_path: Option<&Path>) -> Result<ProbeConfig> {
    match config_path {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!("Config file not found: {}", path.display()));
            }
            ProbeConfig::load(path)
        }
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                ProbeConfig::load(default)
            } else {
                info!("No config file found, using built-in defaults");
                ProbeConfig::resolve(RawConfig::default())
            }
        }
    }
}
