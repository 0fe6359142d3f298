//! Headless entry point for balance-daq.
//!
//! Connects to the configured balance, starts a monitoring session, and
//! prints a statistics snapshot every couple of seconds until Enter is
//! pressed. A GUI frontend would drive the same `Controller` surface.
//!
//! # Usage
//!
//! ```bash
//! balance-daq --list-ports
//! balance-daq --port /dev/ttyACM0 --baud 9600
//! ```

use anyhow::{anyhow, Result};
use balance_daq::config::Settings;
use balance_daq::controller::{Controller, DisplaySnapshot};
use balance_daq::messages::{MonitorEvent, SessionState};
use balance_daq::telemetry;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "balance-daq")]
#[command(about = "Serial data logger for Sartorius laboratory balances", long_about = None)]
struct Cli {
    /// Configuration file (TOML); config/default.toml is used when present
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the balance (overrides configuration)
    #[arg(long)]
    port: Option<String>,

    /// Baud rate (overrides configuration)
    #[arg(long)]
    baud: Option<u32>,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        settings.device.default_port = Some(port);
    }
    if let Some(baud) = cli.baud {
        settings.device.baud_rate = baud;
    }
    settings.validate()?;
    telemetry::init(&settings.log_level)?;

    let (mut controller, events) = Controller::new(settings.clone());

    if cli.list_ports {
        let ports = controller.list_available_ports();
        if ports.is_empty() {
            println!("No serial ports found.");
        }
        for port in ports {
            println!("{port}");
        }
        return Ok(());
    }

    let port = settings
        .device
        .default_port
        .clone()
        .ok_or_else(|| anyhow!("no serial port given; use --port or set device.default_port"))?;
    controller.connect(&port, settings.device.baud_rate)?;
    let session = controller.start_session()?;
    println!(
        "Recording from {port} into {}. Press Enter to stop.",
        session.output_path.display()
    );

    // Watch stdin on its own thread so the display loop stays non-blocking.
    let (stop_tx, stop_rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = stop_tx.send(());
    });

    loop {
        if stop_rx.recv_timeout(Duration::from_secs(2)).is_ok() {
            break;
        }
        for event in events.try_iter() {
            report_event(&event);
        }
        let snapshot = controller.snapshot_for_display();
        if snapshot.session_state == SessionState::Fault {
            eprintln!("Balance connection lost; captured data has been saved.");
            return Ok(());
        }
        print_snapshot(&snapshot);
    }

    controller.stop_session()?;
    println!("Session saved to {}.", session.output_path.display());
    Ok(())
}

fn print_snapshot(snapshot: &DisplaySnapshot) {
    let Some(latest) = &snapshot.latest else {
        println!("waiting for data...");
        return;
    };
    let mut line = format!(
        "t={:7.1}s  mass={:9.4} g",
        latest.elapsed_secs, latest.value
    );
    if let Some(agg) = &snapshot.aggregate {
        line.push_str(&format!(
            "  n={}  min={:.4}  max={:.4}  mean={:.4}",
            agg.count, agg.min, agg.max, agg.mean
        ));
    }
    if let Some(slope) = snapshot.recent_slope {
        line.push_str(&format!("  trend={slope:+.4} g/min"));
    }
    println!("{line}");
}

fn report_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::Connected { port, baud_rate } => {
            println!("connected to {port} at {baud_rate} baud");
        }
        MonitorEvent::Disconnected => println!("disconnected"),
        MonitorEvent::SessionStarted { file } => {
            println!("session started: {}", file.display());
        }
        MonitorEvent::SessionStopped => println!("session stopped"),
        MonitorEvent::DeviceLost(reason) => eprintln!("device lost: {reason}"),
        MonitorEvent::PersistenceFailure(reason) => {
            eprintln!("warning: could not save data: {reason}");
        }
        MonitorEvent::ShutdownTimeout => {
            eprintln!("warning: acquisition thread was slow to stop");
        }
    }
}
