//! # ozone-wayland probe
//!
//! Connects to a compositor, performs the registration handshake and prints
//! what it found. With `--watch` it keeps the event thread running and logs
//! output size changes until interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use ozone_wayland::{
    DisplayConfig, GlobalKind, OutputChangeObserver, RegistrationMode, WaylandDisplay,
};

#[derive(Parser)]
#[command(name = "ozone-wayland")]
#[command(about = "Probe a Wayland compositor: outputs, seats and globals")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/ozone-wayland/display.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Compositor socket name or path (overrides the configuration)
    #[arg(long)]
    display: Option<String>,

    /// Bind outputs only
    #[arg(long)]
    outputs_only: bool,

    /// Keep running and report output size changes until Ctrl-C
    #[arg(short, long)]
    watch: bool,
}

struct LogSizeChanges;

impl OutputChangeObserver for LogSizeChanges {
    fn on_output_size_changed(&self, width: u32, height: u32) {
        info!("Output size changed: {}x{}", width, height);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match DisplayConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            // No config file is the normal case for a probe
            if cli.debug {
                eprintln!("Using default configuration: {:#}", e);
            }
            DisplayConfig::default()
        }
    };

    let filter = if cli.debug || config.general.debug {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    info!("ozone-wayland {}", env!("CARGO_PKG_VERSION"));
    if let Some(commit) = option_env!("GIT_COMMIT") {
        info!("Built {} from {}", env!("BUILD_DATE"), commit);
    }

    apply_overrides(&mut config, &cli);
    config.validate()?;
    config.events.start_processing = cli.watch;

    let mut display =
        WaylandDisplay::new(config).with_output_observer(Arc::new(LogSizeChanges));
    if !display.initialize_hardware() {
        anyhow::bail!("Could not connect to a Wayland compositor");
    }

    print_report(&display);

    if cli.watch {
        watch()?;
    }

    display.shutdown_hardware();
    Ok(())
}

fn apply_overrides(config: &mut DisplayConfig, cli: &Cli) {
    if let Some(display) = &cli.display {
        config.connection.display = Some(display.clone());
    }
    if cli.outputs_only {
        config.connection.registration = RegistrationMode::RegisterOutputOnly;
    }
}

fn print_report(display: &WaylandDisplay) {
    println!("Outputs:");
    for output in display.outputs() {
        println!(
            "  {} {} {}x{} at ({}, {}){}",
            output.make,
            output.model,
            output.width,
            output.height,
            output.x,
            output.y,
            if output.primary { " [primary]" } else { "" }
        );
    }

    println!("Seats: {}", display.input_count());
    for kind in [GlobalKind::Compositor, GlobalKind::Shell, GlobalKind::Shm] {
        println!(
            "  {:<14} {}",
            kind.interface(),
            if display.is_bound(kind) { "bound" } else { "-" }
        );
    }

    println!("Globals:");
    for global in display.globals() {
        println!("  {:>3} {} v{}", global.name, global.interface, global.version);
    }
}

fn watch() -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let fired = Arc::new(AtomicBool::new(false));
    let flag = fired.clone();

    ctrlc::set_handler(move || {
        if !flag.swap(true, Ordering::SeqCst) {
            let _ = tx.send(());
        }
    })
    .context("Failed to install Ctrl-C handler")?;

    info!("Watching outputs, press Ctrl-C to stop");
    if rx.recv().is_err() {
        warn!("Signal channel closed");
    }
    Ok(())
}
