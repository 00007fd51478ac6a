//! Guest event-log synchronization tests: archival, remote submission
//! and the deferred-retry contract.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tempfile::TempDir;

use hvprobe::config::{ProbeConfig, RawConfig, SenderConfig, SenderKind, VmConfig};
use hvprobe::models::{Event, EventClass, EventKind};
use hvprobe::senders::{Dispatcher, EventSender, Services, TelemetrySender};
use hvprobe::telemetry::{RecordHandle, TelemetryTransport};
use hvprobe::vmsync::{CursorStore, VmRuntime};

fn crashlog_sender(root: &Path) -> SenderConfig {
    SenderConfig {
        name: "crashlog".to_string(),
        kind: SenderKind::Crashlog,
        outdir: root.join("crashlog"),
        quota_bytes: 64 * 1024 * 1024,
        uptime: None,
        class_prefix: None,
        spool_file: None,
    }
}

fn telemetry_sender(root: &Path) -> SenderConfig {
    SenderConfig {
        name: "telemd".to_string(),
        kind: SenderKind::Telemetry,
        outdir: root.join("telemetry"),
        quota_bytes: 64 * 1024 * 1024,
        uptime: None,
        class_prefix: None,
        spool_file: Some(root.join("telemetry").join("spool.jsonl")),
    }
}

fn raw_with_vm(root: &Path, guest_root: &Path) -> RawConfig {
    RawConfig {
        version: "1.0".to_string(),
        build_version: "100".to_string(),
        state_file: root.join("state").join("probe.json"),
        reboot_reason_file: None,
        senders: vec![crashlog_sender(root), telemetry_sender(root)],
        logs: Vec::new(),
        crashes: Vec::new(),
        infos: Vec::new(),
        vms: vec![VmConfig {
            name: "vm0".to_string(),
            image_root: guest_root.to_path_buf(),
            history_log: PathBuf::from("logs/history_event"),
        }],
    }
}

fn spool_records(root: &Path) -> Vec<serde_json::Value> {
    let path = root.join("telemetry").join("spool.jsonl");
    if !path.exists() {
        return Vec::new();
    }
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn vmevent_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root.join("crashlog"))
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .map(|n| n.to_string_lossy().starts_with("vmevent_"))
                    .unwrap_or(false)
        })
        .collect();
    dirs.sort();
    dirs
}

#[test]
fn reboot_line_without_logs_gets_a_placeholder_record() -> Result<()> {
    let root = TempDir::new()?;
    let guest = root.path().join("guest");
    fs::create_dir_all(guest.join("logs"))?;
    fs::write(
        guest.join("logs").join("history_event"),
        "REBOOT  k1  2020-01-01/00:00:00  POWER-ON  0000:00:00\n",
    )?;

    let config = Arc::new(ProbeConfig::resolve(raw_with_vm(root.path(), &guest))?);
    let mut dispatcher = Dispatcher::new(Arc::clone(&config))?;

    let mut event = Event::new(EventKind::Vm, "timer", "", EventClass::None);
    dispatcher.dispatch(&mut event);

    // archival side: one event dir holding just the manifest
    let dirs = vmevent_dirs(root.path());
    assert_eq!(dirs.len(), 1);
    let manifest = fs::read_to_string(dirs[0].join("crashfile"))?;
    assert!(manifest.contains("EVENT=REBOOT"));
    assert!(manifest.contains("CLASS=POWER-ON"));
    assert!(manifest.contains("DATA0=vm0"));
    assert!(manifest.contains("DATA1=k1"));

    // remote side: exactly one placeholder record
    let records = spool_records(root.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["class"], "vm0/REBOOT/POWER-ON");
    assert_eq!(records[0]["severity"], 2);
    assert_eq!(records[0]["payload"], "no logs");
    Ok(())
}

#[test]
fn crash_line_is_archived_then_submitted_per_artifact() -> Result<()> {
    let root = TempDir::new()?;
    let guest = root.path().join("guest");
    let guest_logs = guest.join("logs").join("crashlog0_k2");
    fs::create_dir_all(&guest_logs)?;
    fs::write(guest_logs.join("backtrace"), "frame 0\n")?;
    fs::write(guest_logs.join("dump"), "registers\n")?;
    fs::write(
        guest.join("logs").join("history_event"),
        "CRASH   k2  2017-11-11/03:12:59  JAVACRASH  /data/logs/crashlog0_k2\n",
    )?;

    let config = Arc::new(ProbeConfig::resolve(raw_with_vm(root.path(), &guest))?);
    let mut dispatcher = Dispatcher::new(Arc::clone(&config))?;

    let mut event = Event::new(EventKind::Vm, "timer", "", EventClass::None);
    dispatcher.dispatch(&mut event);

    // the guest directory lands under the event dir, by its own name
    let dirs = vmevent_dirs(root.path());
    assert_eq!(dirs.len(), 1);
    let archived = dirs[0].join("crashlog0_k2");
    assert_eq!(fs::read_to_string(archived.join("backtrace"))?, "frame 0\n");
    assert!(archived.join("dump").exists());

    // one remote record per archived file
    let records = spool_records(root.path());
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record["class"], "vm0/CRASH/JAVACRASH");
        assert_eq!(record["severity"], 4);
        assert_eq!(record["event_id"].as_str().unwrap().len(), 32);
    }

    // a second pass starts past the handled line and resends nothing
    let mut event = Event::new(EventKind::Vm, "timer", "", EventClass::None);
    dispatcher.dispatch(&mut event);
    assert_eq!(spool_records(root.path()).len(), 2);
    assert_eq!(vmevent_dirs(root.path()).len(), 1);
    Ok(())
}

#[test]
fn partial_extraction_is_discarded_and_deferred() -> Result<()> {
    let root = TempDir::new()?;
    let guest = root.path().join("guest");
    let guest_logs = guest.join("logs").join("crashlog0_k7");
    fs::create_dir_all(&guest_logs)?;
    fs::write(guest_logs.join("backtrace"), "frame 0\n")?;
    // an unreadable entry aborts the extraction partway through
    std::os::unix::fs::symlink(guest.join("nowhere"), guest_logs.join("dump"))?;
    let line = "CRASH   k7  2020-03-03/08:00:00  JAVACRASH  /data/logs/crashlog0_k7\n";
    fs::write(guest.join("logs").join("history_event"), line)?;

    let config = Arc::new(ProbeConfig::resolve(raw_with_vm(root.path(), &guest))?);
    let mut dispatcher = Dispatcher::new(Arc::clone(&config))?;

    let mut event = Event::new(EventKind::Vm, "timer", "", EventClass::None);
    dispatcher.dispatch(&mut event);

    // partial state is discarded and the line stays for the next pass
    assert!(vmevent_dirs(root.path()).is_empty());
    let crashlog_cfg = config
        .senders
        .iter()
        .find(|s| s.kind == SenderKind::Crashlog)
        .unwrap();
    let cursors = CursorStore::open(&crashlog_cfg.vm_record_path())?;
    assert_eq!(cursors.get("vm0"), 0);

    // once the guest entry is readable the retried line archives fully
    fs::remove_file(guest_logs.join("dump"))?;
    fs::write(guest_logs.join("dump"), "registers\n")?;
    let mut event = Event::new(EventKind::Vm, "timer", "", EventClass::None);
    dispatcher.dispatch(&mut event);

    let dirs = vmevent_dirs(root.path());
    assert_eq!(dirs.len(), 1);
    let archived = dirs[0].join("crashlog0_k7");
    assert!(archived.join("backtrace").exists());
    assert!(archived.join("dump").exists());
    let cursors = CursorStore::open(&crashlog_cfg.vm_record_path())?;
    assert_eq!(cursors.get("vm0"), line.len() as u64);
    Ok(())
}

/// Transport that fails every send while `fail` is set, sharing the
/// sent-record log with the test body.
#[derive(Clone)]
struct FlakyTransport {
    fail: Rc<Cell<bool>>,
    sent: Rc<RefCell<Vec<(String, String)>>>,
}

impl TelemetryTransport for FlakyTransport {
    fn create_record(
        &mut self,
        severity: u32,
        class: &str,
        version: u32,
    ) -> Result<RecordHandle> {
        Ok(RecordHandle {
            severity,
            class: class.to_string(),
            version,
            event_id: None,
            payload: None,
        })
    }

    fn set_event_id(&mut self, record: &mut RecordHandle, id: &str) -> Result<()> {
        record.event_id = Some(id.to_string());
        Ok(())
    }

    fn set_payload(&mut self, record: &mut RecordHandle, payload: &str) -> Result<()> {
        record.payload = Some(payload.to_string());
        Ok(())
    }

    fn send(&mut self, record: RecordHandle) -> Result<()> {
        if self.fail.get() {
            return Err(anyhow!("sink unavailable"));
        }
        self.sent
            .borrow_mut()
            .push((record.class, record.payload.unwrap_or_default()));
        Ok(())
    }
}

#[test]
fn deferred_line_is_retried_until_submission_succeeds() -> Result<()> {
    let root = TempDir::new()?;
    let guest = root.path().join("guest");
    fs::create_dir_all(guest.join("logs"))?;
    let line = "CRASH   k9  2020-02-02/10:00:00  HVCRASH  0000:01:00\n";
    fs::write(guest.join("logs").join("history_event"), line)?;

    let config = Arc::new(ProbeConfig::resolve(raw_with_vm(root.path(), &guest))?);
    let mut services = Services::new(Arc::clone(&config))?;
    let vms: Vec<VmRuntime> = config.vms.iter().map(VmRuntime::from_config).collect();

    let fail = Rc::new(Cell::new(true));
    let sent = Rc::new(RefCell::new(Vec::new()));
    let transport = FlakyTransport {
        fail: Rc::clone(&fail),
        sent: Rc::clone(&sent),
    };

    let telemd_cfg = config
        .senders
        .iter()
        .find(|s| s.kind == SenderKind::Telemetry)
        .unwrap();
    let mut sender = TelemetrySender::activate(Arc::clone(telemd_cfg), Box::new(transport))?;

    let mut event = Event::new(EventKind::Vm, "timer", "", EventClass::None);
    sender.send(&mut event, &mut services, &vms)?;

    // the failed line defers and the cursor stays put
    assert!(sent.borrow().is_empty());
    let cursors = CursorStore::open(&telemd_cfg.vm_record_path())?;
    assert_eq!(cursors.get("vm0"), 0);

    fail.set(false);
    let mut event = Event::new(EventKind::Vm, "timer", "", EventClass::None);
    sender.send(&mut event, &mut services, &vms)?;

    // retried once, submitted once, cursor past the line
    let sent = sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "vm0/CRASH/HVCRASH");
    assert_eq!(sent[0].1, "no logs");
    let cursors = CursorStore::open(&telemd_cfg.vm_record_path())?;
    assert_eq!(cursors.get("vm0"), line.len() as u64);
    Ok(())
}
