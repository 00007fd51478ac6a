//! # hvprobe
//!
//! Harvesting-and-shipping engine of a crash/telemetry collection agent
//! for hypervisor hosts.
//!
//! ## Overview
//!
//! For every detected event (a host crash, an informational event, an
//! uptime milestone, a reboot, or a guest-VM-originated event) the
//! pipeline classifies the event, collects the relevant diagnostic
//! artifacts under a disk-quota budget, assigns a stable deduplication
//! key, persists a structured record, and optionally forwards the
//! artifacts to a remote telemetry sink.
//!
//! Event *detection* (file watches, timers) is external: a detector
//! builds an [`models::Event`] and hands it to
//! [`senders::Dispatcher::dispatch`], which fans it out to every
//! configured sender.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use hvprobe::config::{ProbeConfig, RawConfig};
//! use hvprobe::models::{Event, EventClass, EventKind};
//! use hvprobe::senders::Dispatcher;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Arc::new(ProbeConfig::resolve(RawConfig::default())?);
//! let mut dispatcher = Dispatcher::new(Arc::clone(&config))?;
//!
//! let crash = config.crash_by_name("HVCRASH").expect("configured class");
//! let mut event = Event::new(
//!     EventKind::Crash,
//!     "inotify",
//!     "trigger.txt",
//!     EventClass::Crash(crash),
//! );
//! dispatcher.dispatch(&mut event);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod cli;
pub mod collectors;
pub mod config;
pub mod constants;
pub mod history;
pub mod keygen;
pub mod models;
pub mod properties;
pub mod quota;
pub mod senders;
pub mod telemetry;
pub mod utils;
pub mod vmsync;
