//! Panelvisor binary.
//!
//! # Usage
//!
//! ```bash
//! # Development: simulated panel driven from stdin
//! panelvisor --simulate --apps-dir apps --mappings config/app_mappings.json
//!
//! # On the panel (built with --features gpio)
//! panelvisor --config /etc/panelvisor/panel.json
//! ```

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use panelvisor::hal::{self, ConsoleCommand, parse_command};
use panelvisor::{Color, PanelConfig, PanelContext, SimHardware, SystemBuilder, SystemManager};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Switch-selected mini-app control panel
#[derive(Parser, Debug)]
#[command(name = "panelvisor")]
#[command(about = "Event-driven runtime for a switch-selected mini-app control panel")]
#[command(version)]
struct Args {
    /// Path to the JSON config file (falls back to $PANEL_CONFIG_FILE, then defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// App directory to scan; repeat for several roots (first wins)
    #[arg(long = "apps-dir")]
    apps_dirs: Vec<PathBuf>,

    /// Switch → app mapping file
    #[arg(long)]
    mappings: Option<PathBuf>,

    /// Force the simulation backend
    #[arg(long)]
    simulate: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,

    /// Do not read console commands from stdin
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = PanelConfig::load(args.config.as_deref()).context("loading config")?;
    if !args.apps_dirs.is_empty() {
        config.system.apps_dirs = args.apps_dirs.clone();
    }
    if let Some(path) = &args.mappings {
        config.system.mappings_path = path.clone();
    }
    if let Some(level) = &args.log_level {
        config.system.log_level = level.clone();
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.system.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let backend =
        hal::select_backend(&config, args.simulate).context("initialising hardware")?;
    let ctx = PanelContext::load(config).context("loading secrets and overrides")?;

    let system = SystemBuilder::new(ctx)
        .with_hardware(backend.hardware())
        .build();
    system.start()?;

    if let Some(sim) = backend.simulation() {
        if !args.no_console {
            spawn_console(Arc::clone(sim), Arc::clone(&system))?;
        }
    }

    system.run_until_shutdown().await?;
    Ok(())
}

/// Reads console commands on a dedicated thread.
fn spawn_console(sim: Arc<SimHardware>, system: Arc<SystemManager>) -> std::io::Result<()> {
    println!("panel console ready; type 'help'");
    std::thread::Builder::new()
        .name("panel-console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(cmd)) => run_command(cmd, &sim, &system),
                    Ok(None) => {}
                    Err(e) => println!("{e}"),
                }
            }
            system.request_shutdown("console");
        })?;
    Ok(())
}

fn run_command(cmd: ConsoleCommand, sim: &SimHardware, system: &SystemManager) {
    match cmd {
        ConsoleCommand::Go => sim.simulate_go(),
        ConsoleCommand::Switch(value) => {
            if !sim.simulate_change(value) {
                println!("switches already at {value}");
            }
        }
        ConsoleCommand::Press(color) => sim.simulate_press(color),
        ConsoleCommand::Status => {
            let leds: Vec<String> = Color::ALL
                .iter()
                .map(|c| format!("{c}={}", if sim.leds()[c.index()] { "on" } else { "off" }))
                .collect();
            let hw = system.hardware();
            println!(
                "switch={} display={:?} leds[{}] runner={} app={}",
                hw.switch_value(),
                hw.display_value(),
                leds.join(" "),
                system.runner().status(),
                system.runner().current_app().unwrap_or_else(|| "-".into()),
            );
        }
        ConsoleCommand::Help => println!(
            "commands: go | switch <0..255> | press <red|yellow|green|blue> | status | help | quit"
        ),
        ConsoleCommand::Quit => {}
    }
}
