use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use hvprobe::cli::{Args, Commands};
use hvprobe::config::{load_or_default, RawConfig};
use hvprobe::models::{Event, EventClass, EventKind};
use hvprobe::senders::Dispatcher;

fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.verbose)?;

    if let Commands::InitConfig { path } = &args.command {
        info!("Creating default configuration file at {}", path.display());
        RawConfig::default().save_to_yaml_file(path)?;
        return Ok(());
    }

    let config = Arc::new(load_or_default(args.config.as_deref())?);
    let mut dispatcher = Dispatcher::new(Arc::clone(&config))
        .context("Failed to activate senders")?;

    let mut event = match &args.command {
        Commands::Crash {
            class,
            channel,
            path,
        } => {
            let spec = config
                .crash_by_name(class)
                .ok_or_else(|| anyhow!("unknown crash class: {}", class))?;
            Event::new(EventKind::Crash, channel, path, EventClass::Crash(spec))
        }
        Commands::Info {
            class,
            channel,
            path,
        } => {
            let spec = config
                .info_by_name(class)
                .ok_or_else(|| anyhow!("unknown info class: {}", class))?;
            Event::new(EventKind::Info, channel, path, EventClass::Info(spec))
        }
        Commands::Uptime => Event::new(EventKind::Uptime, "timer", "", EventClass::None),
        Commands::Reboot => Event::new(EventKind::Reboot, "startup", "", EventClass::None),
        Commands::SyncVms => Event::new(EventKind::Vm, "timer", "", EventClass::None),
        Commands::InitConfig { .. } => unreachable!("handled above"),
    };

    info!("Dispatching {} event", event.kind.label());
    dispatcher.dispatch(&mut event);
    info!("Event processed");
    Ok(())
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}
