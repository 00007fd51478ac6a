use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, warn};

use crate::config::{LogSpec, SenderConfig};
use crate::constants::{CHANNEL_INOTIFY, GUEST_LOGS_MARKER, VM_LOG_SEARCH_DEPTH};
use crate::keygen;
use crate::models::{Event, EventClass, EventKind, SyncOutcome};
use crate::senders::crashlog::touch_uptime_source;
use crate::senders::{EventSender, Services};
use crate::telemetry::{self, TelemetryTransport, CRASH_SEVERITY, INFO_SEVERITY};
use crate::utils;
use crate::utils::time;
use crate::vmsync::{self, CursorStore, VmEvent, VmRuntime};

const DEFAULT_CLASS_PREFIX: &str = "hypervisor";

/// Remote telemetry sender: formats each processed event into one or
/// more records and submits them through the transport adapter.
pub struct TelemetrySender {
    cfg: Arc<SenderConfig>,
    transport: Box<dyn TelemetryTransport>,
    cursors: CursorStore,
}

impl TelemetrySender {
    /// Activate the sender. Failure here is fatal, like every sender
    /// activation.
    pub fn activate(
        cfg: Arc<SenderConfig>,
        transport: Box<dyn TelemetryTransport>,
    ) -> Result<Self> {
        fs::create_dir_all(&cfg.outdir)
            .context(format!("Failed to create outdir {}", cfg.outdir.display()))?;
        let cursors = CursorStore::open(&cfg.vm_record_path())?;
        touch_uptime_source(&cfg)?;

        Ok(TelemetrySender {
            cfg,
            transport,
            cursors,
        })
    }

    fn class_prefix(&self) -> &str {
        self.cfg
            .class_prefix
            .as_deref()
            .unwrap_or(DEFAULT_CLASS_PREFIX)
    }

    fn send_crash(&mut self, event: &Event) -> Result<()> {
        let EventClass::Crash(crash) = event.class.clone() else {
            warn!("crash event without crash classification data");
            return Ok(());
        };

        let class = format!("{}/crash/{}", self.class_prefix(), crash.name);
        let event_id = keygen::digest(&class);

        for log in &crash.logs {
            self.submit_log(event.dir.as_deref(), log, &event_id, CRASH_SEVERITY, &class);
        }

        if event.channel == CHANNEL_INOTIFY {
            self.submit_trigger(event, &crash.trigger, &event_id, &class);
        }
        Ok(())
    }

    /// Submit the trigger-file path, falling back to its original
    /// location when the archived copy is missing.
    fn submit_trigger(
        &mut self,
        event: &Event,
        trigger: &Option<crate::config::Trigger>,
        event_id: &str,
        class: &str,
    ) {
        let archived = event.dir.as_ref().map(|d| d.join(&event.path));
        match archived {
            Some(path) if path.exists() => {
                self.submit_path(&path, event_id, CRASH_SEVERITY, class);
            }
            _ => {
                let Some(trigger) = trigger else {
                    return;
                };
                let original = trigger.path.join(&event.path);
                warn!(
                    "archived trigger unavailable, trying the original path ({})",
                    original.display()
                );
                if original.exists() {
                    self.submit_path(&original, event_id, CRASH_SEVERITY, class);
                } else {
                    error!("original path ({}) is unavailable", original.display());
                }
            }
        }
    }

    fn send_info(&mut self, event: &Event) -> Result<()> {
        let EventClass::Info(info) = event.class.clone() else {
            warn!("info event without info classification data");
            return Ok(());
        };

        let class = format!("{}/info/{}", self.class_prefix(), info.name);
        let event_id = keygen::digest(&class);

        for log in &info.logs {
            self.submit_log(event.dir.as_deref(), log, &event_id, INFO_SEVERITY, &class);
        }
        Ok(())
    }

    fn send_uptime(&mut self, svc: &mut Services) -> Result<()> {
        let Some(uptime) = &self.cfg.uptime else {
            return Ok(());
        };
        if uptime.frequency_hours == 0 {
            return Ok(());
        }

        // the milestone cycle is durable so a restart never re-sends a
        // milestone that already fired in a previous invocation
        let hours = time::uptime_hours();
        let cycle = svc.props.uptime_cycle(&self.cfg.name);
        if milestone_reached(hours, uptime.frequency_hours, cycle) {
            let boot_time = time::uptime_string();
            let class = format!("{}/uptime/{}", self.class_prefix(), boot_time);
            let content = format!("system boot time: {}", boot_time);
            telemetry::submit(
                self.transport.as_mut(),
                &content,
                None,
                INFO_SEVERITY,
                &class,
            )?;
            svc.props
                .set_uptime_cycle(&self.cfg.name, hours / uptime.frequency_hours + 1)?;
        }
        Ok(())
    }

    fn send_reboot(&mut self, svc: &mut Services) -> Result<()> {
        let build_version = svc.config.build_version.clone();
        if svc
            .props
            .build_version_changed(&self.cfg.name, &build_version)?
        {
            let class = format!("{}/swupdate/-", self.class_prefix());
            let content = format!("system update to: {}", build_version);
            telemetry::submit(
                self.transport.as_mut(),
                &content,
                None,
                INFO_SEVERITY,
                &class,
            )?;
        }

        let reason = utils::startup_reason(svc.config.reboot_reason_file.as_deref());
        let class = format!("{}/reboot/{}", self.class_prefix(), reason);
        telemetry::submit(self.transport.as_mut(), "reboot", None, INFO_SEVERITY, &class)
    }

    fn sync_vms(&mut self, svc: &mut Services, vms: &[VmRuntime]) -> Result<()> {
        let Self {
            transport, cursors, ..
        } = self;
        vmsync::run_pass(vms, cursors, |vm, event| {
            Self::vm_line(transport.as_mut(), svc, vm, event)
        })
    }

    /// Process one guest event line: locate the already-archived log
    /// directory and submit one record per real entry, or a "no logs"
    /// placeholder. Any submission failure defers the whole line.
    fn vm_line(
        transport: &mut dyn TelemetryTransport,
        svc: &mut Services,
        vm: &VmRuntime,
        event: &VmEvent,
    ) -> SyncOutcome {
        let severity = if event.kind == "CRASH" {
            CRASH_SEVERITY
        } else {
            INFO_SEVERITY
        };

        let mut vmlogdir: Option<PathBuf> = None;
        if let Some(logs_ref) = event.logs_ref() {
            let dir_name = &logs_ref[GUEST_LOGS_MARKER.len()..];
            let Some(crashlog) = svc.config.crashlog_sender() else {
                return SyncOutcome::Handled;
            };
            match utils::fs::find_dir(&crashlog.outdir, dir_name, VM_LOG_SEARCH_DEPTH) {
                Ok(found) => vmlogdir = found,
                Err(e) => {
                    error!(
                        "find ({}) in ({}) failed: {:#}",
                        dir_name,
                        crashlog.outdir.display(),
                        e
                    );
                    return SyncOutcome::Deferred;
                }
            }
        }

        let class = format!("{}/{}/{}", vm.name, event.kind, event.subtype);
        let event_id = keygen::digest(&class);

        let Some(dir) = vmlogdir else {
            return Self::submit_or_defer(transport, "no logs", &event_id, severity, &class);
        };

        let mut entries = Vec::new();
        match fs::read_dir(&dir) {
            Ok(read) => {
                for entry in read {
                    match entry {
                        Ok(entry) => entries.push(entry.path()),
                        Err(e) => {
                            error!("listing ({}) failed: {}", dir.display(), e);
                            return SyncOutcome::Deferred;
                        }
                    }
                }
            }
            Err(e) => {
                error!("listing ({}) failed: {}", dir.display(), e);
                return SyncOutcome::Deferred;
            }
        }
        entries.sort();

        if entries.is_empty() {
            let content = format!("no logs under ({})", dir.display());
            return Self::submit_or_defer(transport, &content, &event_id, severity, &class);
        }

        let mut outcome = SyncOutcome::Handled;
        for path in entries {
            let payload = path.display().to_string();
            if let Err(e) = telemetry::submit(transport, &payload, Some(&event_id), severity, &class)
            {
                error!("submitting ({}) failed: {:#}", payload, e);
                outcome = SyncOutcome::Deferred;
            }
        }
        outcome
    }

    fn submit_or_defer(
        transport: &mut dyn TelemetryTransport,
        payload: &str,
        event_id: &str,
        severity: u32,
        class: &str,
    ) -> SyncOutcome {
        match telemetry::submit(transport, payload, Some(event_id), severity, class) {
            Ok(()) => SyncOutcome::Handled,
            Err(e) => {
                error!("submitting ({}) failed: {:#}", payload, e);
                SyncOutcome::Deferred
            }
        }
    }

    /// Search the event directory for artifacts of one log descriptor
    /// and submit each; without any, submit a "no log generated"
    /// message instead.
    fn submit_log(
        &mut self,
        srcdir: Option<&Path>,
        log: &LogSpec,
        event_id: &str,
        severity: u32,
        class: &str,
    ) {
        let Some(dir) = srcdir else {
            self.submit_no_logs(log, event_id, severity, class);
            return;
        };

        let mut matches = Vec::new();
        match fs::read_dir(dir) {
            Ok(read) => {
                for entry in read.flatten() {
                    if entry
                        .file_name()
                        .to_string_lossy()
                        .contains(log.name.as_str())
                    {
                        matches.push(entry.path());
                    }
                }
            }
            Err(e) => {
                error!(
                    "search ({}) in dir ({}) failed: {}",
                    log.name,
                    dir.display(),
                    e
                );
                return;
            }
        }
        matches.sort();

        if matches.is_empty() {
            error!("dir ({}) does not contain ({})", dir.display(), log.name);
            self.submit_no_logs(log, event_id, severity, class);
            return;
        }

        for path in matches {
            self.submit_path(&path, event_id, severity, class);
        }
    }

    fn submit_no_logs(&mut self, log: &LogSpec, event_id: &str, severity: u32, class: &str) {
        let message = format!("no log generated on {}, check probe's log.", log.name);
        if let Err(e) = telemetry::submit(
            self.transport.as_mut(),
            &message,
            Some(event_id),
            severity,
            class,
        ) {
            error!("submitting no-log record for ({}) failed: {:#}", log.name, e);
        }
    }

    fn submit_path(&mut self, path: &Path, event_id: &str, severity: u32, class: &str) {
        let payload = path.display().to_string();
        if let Err(e) = telemetry::submit(
            self.transport.as_mut(),
            &payload,
            Some(event_id),
            severity,
            class,
        ) {
            error!("submitting ({}) failed: {:#}", payload, e);
        }
    }
}

/// True once host uptime has crossed `cycle` whole multiples of the
/// milestone frequency. A missed window fires once on the next uptime
/// event, not once per missed interval.
fn milestone_reached(hours: u64, frequency_hours: u64, cycle: u64) -> bool {
    hours / frequency_hours >= cycle
}

impl EventSender for TelemetrySender {
    fn name(&self) -> &str {
        &self.cfg.name
    }

    fn send(
        &mut self,
        event: &mut Event,
        services: &mut Services,
        vms: &[VmRuntime],
    ) -> Result<()> {
        match event.kind {
            EventKind::Crash => self.send_crash(event),
            EventKind::Info => self.send_info(event),
            EventKind::Uptime => self.send_uptime(services),
            EventKind::Reboot => self.send_reboot(services),
            EventKind::Vm => self.sync_vms(services, vms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::PropertyStore;
    use tempfile::TempDir;

    #[test]
    fn milestone_fires_once_per_cycle() {
        assert!(!milestone_reached(0, 6, 1));
        assert!(!milestone_reached(5, 6, 1));
        assert!(milestone_reached(6, 6, 1));
        // a long gap still fires only the current cycle
        assert!(milestone_reached(25, 6, 1));
        assert!(!milestone_reached(25, 6, 5));
    }

    #[test]
    fn fired_milestone_does_not_repeat_after_restart() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let frequency = 6;
        let hours = 13;

        let mut props = PropertyStore::open(&path).unwrap();
        let cycle = props.uptime_cycle("telemd");
        assert!(milestone_reached(hours, frequency, cycle));
        props
            .set_uptime_cycle("telemd", hours / frequency + 1)
            .unwrap();
        drop(props);

        // a fresh activation sees the persisted cycle, not the default
        let props = PropertyStore::open(&path).unwrap();
        let cycle = props.uptime_cycle("telemd");
        assert!(!milestone_reached(hours, frequency, cycle));
        assert!(milestone_reached(hours + frequency, frequency, cycle));
    }
}
