use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, warn};

use crate::classify;
use crate::collectors::log_collector;
use crate::config::{SenderConfig, TriggerKind};
use crate::constants::{
    CHANNEL_INOTIFY, CRASH_DIR_PREFIX, SPACE_FULL, STATS_DIR_PREFIX, VMEVENT_DIR_PREFIX,
};
use crate::keygen;
use crate::models::{Event, EventClass, EventKind, SyncOutcome};
use crate::quota;
use crate::senders::{manifest, EventSender, Services};
use crate::utils;
use crate::vmsync::{self, CursorStore, VmEvent, VmRuntime};

/// Local archival sender: collects artifacts into per-event directories
/// under its output directory and appends structured history records.
pub struct CrashlogSender {
    cfg: Arc<SenderConfig>,
    cursors: CursorStore,
}

impl CrashlogSender {
    /// Activate the sender: create its output directory, open the
    /// guest-log cursor store and touch the uptime source so the
    /// detector can watch it. Failure here is fatal.
    pub fn activate(cfg: Arc<SenderConfig>) -> Result<Self> {
        fs::create_dir_all(&cfg.outdir)
            .context(format!("Failed to create outdir {}", cfg.outdir.display()))?;
        let cursors = CursorStore::open(&cfg.vm_record_path())?;
        touch_uptime_source(&cfg)?;

        Ok(CrashlogSender { cfg, cursors })
    }

    fn create_event_dir(&self, prefix: &str, key: &str) -> Result<PathBuf> {
        let dir = self.cfg.outdir.join(format!("{}_{}", prefix, key));
        fs::create_dir_all(&dir)
            .context(format!("Failed to create event dir {}", dir.display()))?;
        Ok(dir)
    }

    fn send_crash(&self, event: &mut Event, svc: &mut Services) -> Result<()> {
        let EventClass::Crash(generic) = event.class.clone() else {
            warn!("crash event without crash classification data");
            return Ok(());
        };

        let trigger_file = generic.trigger.as_ref().map(|t| match t.kind {
            TriggerKind::Dir => t.path.join(&event.path),
            TriggerKind::File => t.path.clone(),
        });

        let (crash, data) = if generic.reclassify.is_some() {
            match classify::reclassify(&generic, trigger_file.as_deref()) {
                Ok(outcome) => {
                    let spec = svc
                        .config
                        .crash_by_name(&outcome.name)
                        .unwrap_or_else(|| Arc::new(generic.renamed(&outcome.name)));
                    (spec, outcome.data)
                }
                Err(e) => {
                    error!("reclassify crash ({}) failed: {:#}", generic.name, e);
                    return Ok(());
                }
            }
        } else {
            (Arc::clone(&generic), Default::default())
        };

        // later senders see the specific subtype
        event.class = EventClass::Crash(Arc::clone(&crash));

        let key = keygen::new_key(&mut svc.props, "CRASH", &crash.name)?;

        if !quota::has_space(&self.cfg.outdir, self.cfg.quota_bytes) {
            svc.history.raise_info_error(SPACE_FULL)?;
        } else if crash.wants_collection() || event.channel == CHANNEL_INOTIFY {
            let dir = self.create_event_dir(CRASH_DIR_PREFIX, &key)?;
            manifest::write(&dir, "CRASH", &key, &crash.name, &data)?;

            for log in &crash.logs {
                if let Err(e) = log_collector::collect(log, &dir) {
                    error!("collecting ({}) failed: {:#}", log.name, e);
                }
            }

            if event.channel == CHANNEL_INOTIFY {
                if let Some(src) = &trigger_file {
                    let dest = dir.join(&event.path);
                    if let Err(e) = utils::fs::copy_file(src, &dest) {
                        error!(
                            "copy ({}) to ({}) failed: {:#}",
                            src.display(),
                            dest.display(),
                            e
                        );
                    }
                }
            }

            event.dir = Some(dir);
        }

        svc.history
            .raise_event("CRASH", &crash.name, event.dir.as_deref(), "", &key)
    }

    fn send_info(&self, event: &mut Event, svc: &mut Services) -> Result<()> {
        let EventClass::Info(info) = event.class.clone() else {
            warn!("info event without info classification data");
            return Ok(());
        };

        let key = keygen::new_key(&mut svc.props, "INFO", &info.name)?;

        if !quota::has_space(&self.cfg.outdir, self.cfg.quota_bytes) {
            svc.history.raise_info_error(SPACE_FULL)?;
        } else if info.wants_collection() {
            let dir = self.create_event_dir(STATS_DIR_PREFIX, &key)?;
            for log in &info.logs {
                if let Err(e) = log_collector::collect(log, &dir) {
                    error!("collecting ({}) failed: {:#}", log.name, e);
                }
            }
            event.dir = Some(dir);
        }

        svc.history
            .raise_event("INFO", &info.name, event.dir.as_deref(), "", &key)
    }

    fn send_reboot(&self, svc: &mut Services) -> Result<()> {
        let build_version = svc.config.build_version.clone();
        if svc
            .props
            .build_version_changed(&self.cfg.name, &build_version)?
        {
            let key = keygen::new_key(&mut svc.props, "INFO", "SWUPDATE")?;
            svc.history.raise_event("INFO", "SWUPDATE", None, "", &key)?;
        }

        let reason = utils::startup_reason(svc.config.reboot_reason_file.as_deref());
        let key = keygen::new_key(&mut svc.props, "REBOOT", &reason)?;
        svc.history.raise_event("REBOOT", &reason, None, "", &key)
    }

    fn sync_vms(&mut self, svc: &mut Services, vms: &[VmRuntime]) -> Result<()> {
        let cfg = Arc::clone(&self.cfg);
        vmsync::run_pass(vms, &mut self.cursors, |vm, event| {
            Self::vm_line(&cfg, svc, vm, event)
        })
    }

    /// Process one guest event line: extract the referenced log
    /// directory from the guest image, archive it, and record the
    /// event. Partial extractions are discarded and deferred.
    fn vm_line(
        cfg: &SenderConfig,
        svc: &mut Services,
        vm: &VmRuntime,
        event: &VmEvent,
    ) -> SyncOutcome {
        if !quota::has_space(&cfg.outdir, cfg.quota_bytes) {
            if let Err(e) = svc.history.raise_info_error(SPACE_FULL) {
                error!("raising over-quota record failed: {:#}", e);
            }
            return SyncOutcome::Handled;
        }

        let key = match keygen::new_key(&mut svc.props, "VM", &event.vm_key) {
            Ok(key) => key,
            Err(e) => {
                error!("generate event key failed: {:#}", e);
                return SyncOutcome::Deferred;
            }
        };

        let dir = cfg.outdir.join(format!("{}_{}", VMEVENT_DIR_PREFIX, key));
        if let Err(e) = fs::create_dir_all(&dir) {
            error!("create event dir ({}) failed: {}", dir.display(), e);
            return SyncOutcome::Deferred;
        }

        if let Some(logs_ref) = event.logs_ref() {
            let guest_rel = Path::new(logs_ref.trim_start_matches('/'));
            let target = match guest_rel.file_name() {
                Some(name) => dir.join(name),
                None => dir.clone(),
            };

            if let Err(err) = vm.fs.extract_dir(guest_rel, &target) {
                // partial state is not trusted
                remove_event_dir(&dir);
                return if err.missing && err.recovered == 0 {
                    warn!("({}) is missing", logs_ref);
                    SyncOutcome::Handled
                } else {
                    error!("dump ({}) aborted at {}: {}", logs_ref, err.recovered, err);
                    SyncOutcome::Deferred
                };
            }
        }

        let data = [
            Some(vm.name.clone()),
            Some(event.vm_key.clone()),
            None,
        ];
        if let Err(e) = manifest::write(&dir, &event.kind, &key, &event.subtype, &data) {
            error!("writing manifest in ({}) failed: {:#}", dir.display(), e);
        }

        if let Err(e) = svc
            .history
            .raise_event(&vm.name, &event.subtype, Some(&dir), "", &key)
        {
            error!("raising VM event record failed: {:#}", e);
            return SyncOutcome::Deferred;
        }

        SyncOutcome::Handled
    }
}

impl EventSender for CrashlogSender {
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
            EventKind::Crash => self.send_crash(event, services),
            EventKind::Info => self.send_info(event, services),
            EventKind::Uptime => services.history.raise_uptime(None),
            EventKind::Reboot => self.send_reboot(services),
            EventKind::Vm => self.sync_vms(services, vms),
        }
    }
}

/// Touch the uptime source file so the detector can register a watch.
pub(crate) fn touch_uptime_source(cfg: &SenderConfig) -> Result<()> {
    if let Some(uptime) = &cfg.uptime {
        if let Some(parent) = uptime.path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&uptime.path)
            .context(format!(
                "Failed to touch uptime source {}",
                uptime.path.display()
            ))?;
    }
    Ok(())
}

fn remove_event_dir(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        if e.kind() != ErrorKind::NotFound {
            error!("remove ({}) failed: {}", dir.display(), e);
        }
    }
}
