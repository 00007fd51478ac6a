use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the hvprobe agent.
///
/// Event detection lives outside this binary; each subcommand feeds one
/// detected event (or one synchronization pass) into the dispatch
/// pipeline.
#[derive(Parser, Debug)]
#[clap(name = "hvprobe", about = "Crash/telemetry harvesting agent for hypervisor hosts")]
pub struct Args {
    /// Path to the YAML configuration file
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[clap(short, long)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a default configuration file
    InitConfig {
        /// Where to write the configuration
        path: PathBuf,
    },

    /// Process one detected crash event
    Crash {
        /// Configured crash class name
        class: String,
        /// Detection channel
        #[clap(long, default_value = "inotify")]
        channel: String,
        /// Trigger file name relative to the class trigger directory
        #[clap(long, default_value = "")]
        path: String,
    },

    /// Process one detected informational event
    Info {
        /// Configured info class name
        class: String,
        /// Detection channel
        #[clap(long, default_value = "inotify")]
        channel: String,
        /// Trigger file name relative to the class trigger directory
        #[clap(long, default_value = "")]
        path: String,
    },

    /// Record an uptime milestone
    Uptime,

    /// Process a host reboot
    Reboot,

    /// Run one guest-VM event synchronization pass
    SyncVms,
}
