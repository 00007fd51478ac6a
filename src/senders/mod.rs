//! Event dispatch and the sender pipeline.
//!
//! An incoming event fans out to every configured sender in declaration
//! order. Senders share the collection, classification and key
//! primitives but differ in destination: the crashlog sender archives
//! into its output directory, the telemetry sender submits records to a
//! remote sink adapter.

mod crashlog;
mod manifest;
mod telemetry_sender;

pub use crashlog::CrashlogSender;
pub use telemetry_sender::TelemetrySender;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::error;

use crate::config::{ProbeConfig, SenderKind};
use crate::constants::HISTORY_FILE;
use crate::history::HistoryStore;
use crate::models::Event;
use crate::properties::PropertyStore;
use crate::telemetry::{JsonlTransport, NoopTransport, TelemetryTransport};
use crate::vmsync::VmRuntime;

/// Shared services every sender draws on: the immutable configuration,
/// the durable property store and the structured record sink.
pub struct Services {
    pub config: Arc<ProbeConfig>,
    pub props: PropertyStore,
    pub history: HistoryStore,
}

impl Services {
    pub fn new(config: Arc<ProbeConfig>) -> Result<Self> {
        let props = PropertyStore::open(&config.state_file)
            .context("Failed to open property store")?;

        let history_path = match config.crashlog_sender() {
            Some(sender) => sender.outdir.join(HISTORY_FILE),
            None => config
                .state_file
                .parent()
                .map(|p| p.join(HISTORY_FILE))
                .unwrap_or_else(|| PathBuf::from(HISTORY_FILE)),
        };
        let history = HistoryStore::open(&history_path)
            .context("Failed to open history store")?;

        Ok(Services {
            config,
            props,
            history,
        })
    }
}

/// A configured destination for processed events.
///
/// One handler per event kind; handlers for the two sender variants
/// share the collection/classification primitives but format and route
/// differently.
pub trait EventSender {
    fn name(&self) -> &str;

    /// Process one event. Recoverable per-artifact failures are logged
    /// inside; an `Err` here means the whole event failed for this
    /// sender.
    fn send(&mut self, event: &mut Event, services: &mut Services, vms: &[VmRuntime])
        -> Result<()>;
}

/// Routes each detected event to every registered sender.
pub struct Dispatcher {
    services: Services,
    vms: Vec<VmRuntime>,
    senders: Vec<Box<dyn EventSender>>,
}

impl Dispatcher {
    /// Activate all configured senders. Failure here is fatal for the
    /// agent; everything later is per-event and recoverable.
    pub fn new(config: Arc<ProbeConfig>) -> Result<Self> {
        let services = Services::new(Arc::clone(&config))?;
        let vms = config.vms.iter().map(VmRuntime::from_config).collect();

        let mut senders: Vec<Box<dyn EventSender>> = Vec::new();
        for sender_config in &config.senders {
            match sender_config.kind {
                SenderKind::Crashlog => {
                    senders.push(Box::new(CrashlogSender::activate(Arc::clone(
                        sender_config,
                    ))?));
                }
                SenderKind::Telemetry => {
                    let transport: Box<dyn TelemetryTransport> =
                        match &sender_config.spool_file {
                            Some(path) => Box::new(JsonlTransport::open(path)?),
                            None => Box::new(NoopTransport),
                        };
                    senders.push(Box::new(TelemetrySender::activate(
                        Arc::clone(sender_config),
                        transport,
                    )?));
                }
            }
        }

        Ok(Dispatcher {
            services,
            vms,
            senders,
        })
    }

    /// Fan one event out to every sender. A sender failing never
    /// unwinds its siblings.
    pub fn dispatch(&mut self, event: &mut Event) {
        for sender in &mut self.senders {
            if let Err(e) = sender.send(event, &mut self.services, &self.vms) {
                error!(
                    "sender ({}) failed on {} event: {:#}",
                    sender.name(),
                    event.kind.label(),
                    e
                );
            }
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }
}
