// Re-export all items from the submodules
mod probe_config;
mod schema;

pub use probe_config::{load_or_default, CrashSpec, InfoSpec, ProbeConfig};
pub use schema::{
    CrashMatch, LogKind, LogSpec, RawConfig, RawCrash, RawInfo, Reclassify, SenderConfig,
    SenderKind, Trigger, TriggerKind, UptimeSource, VmConfig,
};
