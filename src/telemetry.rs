//! Telemetry submission adapter.
//!
//! The remote service contract is create → (set_event_id) → set_payload
//! → send, one record per artifact, with the handle released on every
//! exit path. Handles are plain owned values here so release happens by
//! drop on all paths.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::error;
use serde::Serialize;

/// Record severity of crash events
pub const CRASH_SEVERITY: u32 = 4;
/// Record severity of informational events
pub const INFO_SEVERITY: u32 = 2;
/// Wire record version
pub const RECORD_VERSION: u32 = 1;

/// One in-flight telemetry record.
#[derive(Debug, Serialize)]
pub struct RecordHandle {
    pub severity: u32,
    pub class: String,
    pub version: u32,
    pub event_id: Option<String>,
    pub payload: Option<String>,
}

/// Remote telemetry transport. Implemented by the JSON-lines spool and
/// by a no-op adapter when the capability is disabled.
pub trait TelemetryTransport {
    fn create_record(&mut self, severity: u32, class: &str, version: u32)
        -> Result<RecordHandle>;
    fn set_event_id(&mut self, record: &mut RecordHandle, id: &str) -> Result<()>;
    fn set_payload(&mut self, record: &mut RecordHandle, payload: &str) -> Result<()>;
    fn send(&mut self, record: RecordHandle) -> Result<()>;
}

/// Build and send one record through `transport` in contract order.
///
/// Any step failing drops the handle and surfaces the error; the caller
/// decides whether that defers the surrounding event.
pub fn submit(
    transport: &mut dyn TelemetryTransport,
    payload: &str,
    event_id: Option<&str>,
    severity: u32,
    class: &str,
) -> Result<()> {
    let mut record = transport
        .create_record(severity, class, RECORD_VERSION)
        .map_err(|e| {
            error!("failed to create record: {:#}", e);
            e
        })?;

    if let Some(id) = event_id {
        transport.set_event_id(&mut record, id)?;
    }
    transport.set_payload(&mut record, payload)?;
    transport.send(record)
}

/// Spool transport appending one JSON object per sent record.
#[derive(Debug)]
pub struct JsonlTransport {
    path: PathBuf,
}

impl JsonlTransport {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }
        Ok(JsonlTransport {
            path: path.to_path_buf(),
        })
    }
}

impl TelemetryTransport for JsonlTransport {
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
        if record.payload.is_none() {
            return Err(anyhow!("record for {} has no payload", record.class));
        }

        let line = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "severity": record.severity,
            "class": record.class,
            "version": record.version,
            "event_id": record.event_id,
            "payload": record.payload,
        });

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(format!("Failed to open spool file {}", self.path.display()))?;
        writeln!(file, "{}", line)
            .context(format!("Failed to append to {}", self.path.display()))?;
        Ok(())
    }
}

/// No-op transport selected when the telemetry capability is disabled.
#[derive(Debug, Default)]
pub struct NoopTransport;

impl TelemetryTransport for NoopTransport {
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

    fn send(&mut self, _record: RecordHandle) -> Result<()> {
        Ok(())
    }
}
