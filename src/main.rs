use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use log::{Level, LevelFilter, info, warn};
use tokio::sync::broadcast::error::RecvError;

use medical_scanner_lib::commands;
use medical_scanner_lib::config::{AppConfig, CONFIG_FILE_NAME};
use medical_scanner_lib::core::bluetooth::{ConnectOutcome, ConnectionState, ScannerEvent};
use medical_scanner_lib::logging::ScannerLogger;
use medical_scanner_lib::state::AppState;

/// Scans for BLE thermometers and prints the readings of one of them.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Config file, created with defaults if missing
    #[arg(long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,
    /// Device to connect to instead of the strongest one found
    #[arg(long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    if ScannerLogger::init(Level::Info, None).is_err() {
        env_logger::builder().filter_level(LevelFilter::Info).init();
    }

    let args = Args::parse();
    let config = AppConfig::load_config(&args.config).await?;
    if !args.config.exists() {
        config.save_config(&args.config).await?;
    }
    let app_state = AppState::new(config).await?;
    let orchestrator = app_state.orchestrator();

    let mut status = orchestrator.watch_status();
    commands::toggle_scan(&app_state).await.map_err(|e| anyhow!(e))?;
    tokio::select! {
        _ = status.wait_for(|s| s.state != ConnectionState::Scanning) => {}
        _ = tokio::signal::ctrl_c() => {
            orchestrator.stop_scan().await?;
        }
    }

    let devices = commands::list_devices(&app_state);
    if devices.is_empty() {
        println!("No devices found.");
        orchestrator.shutdown().await;
        return Ok(());
    }
    for device in &devices {
        println!("{}: {} ({})", device.signal_label, device.name, device.id);
    }

    let target = match args.device {
        Some(id) => id,
        None => devices[0].id.to_string(),
    };
    let mut events = orchestrator.subscribe();
    let outcome = commands::connect_to_device(target, &app_state)
        .await
        .map_err(|e| anyhow!(e))?;
    match outcome {
        ConnectOutcome::Unsupported { metadata } => {
            println!(
                "{} ({}) exposes {} service(s) but no temperature service.",
                metadata.name.as_deref().unwrap_or("[Unnamed]"),
                metadata.id,
                metadata.service_count
            );
            orchestrator.shutdown().await;
            return Ok(());
        }
        ConnectOutcome::Monitoring { endpoint, .. } => {
            info!("Monitoring {} / {}", endpoint.service, endpoint.characteristic);
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ScannerEvent::Telemetry(reading)) => println!(
                    "{}  {:.2} °C  {:.2} °F",
                    reading.received_at.format("%H:%M:%S"),
                    reading.celsius,
                    reading.fahrenheit
                ),
                Ok(ScannerEvent::StateChanged { to: ConnectionState::Idle, .. }) => {
                    println!("{}", commands::current_status(&app_state).message);
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} event(s).", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                if let Err(e) = commands::disconnect(&app_state).await {
                    warn!("Disconnect failed: {}", e);
                }
                break;
            }
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}
