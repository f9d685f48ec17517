//! SBrick drive example
//!
//! Demonstrates driving an SBrick including:
//! - Finding an SBrick by its advertised name
//! - Connecting and waiting for the session to become ready
//! - Driving a channel in both directions
//! - Stopping all channels and disconnecting
//!
//! Run with: cargo run --example drive_sbrick
//!
//! To connect to a specific SBrick:
//!   cargo run --example drive_sbrick -- --address 00:07:80:2E:2C:5B

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use sbrick_rust_ble::{
    BtleplugTransport, Channel, Command, Direction, Error, Result, SessionConfig, SessionManager,
    SessionState, SBRICK_LOCAL_NAME,
};
use std::sync::Arc;
use std::time::Duration;

async fn find_sbrick(adapter: &Adapter, address: Option<&str>) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        let Some(properties) = peripheral.properties().await? else {
            continue;
        };

        let matches = match address {
            Some(address) => properties.address.to_string() == address,
            None => properties.local_name.as_deref() == Some(SBRICK_LOCAL_NAME),
        };

        if matches {
            return Ok(Some(peripheral));
        }
    }

    Ok(None)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,sbrick_rust_ble=debug")
        .init();

    println!("SBrick Drive");
    println!("============\n");

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let target_address = args
        .iter()
        .position(|arg| arg == "--address")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.to_uppercase());

    let adapter = Manager::new()
        .await?
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::LinkError {
            reason: "No Bluetooth adapter found".to_string(),
        })?;

    println!("Scanning for SBricks...\n");
    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(5)).await;
    adapter.stop_scan().await?;

    let Some(peripheral) = find_sbrick(&adapter, target_address.as_deref()).await? else {
        println!("No SBrick found.");
        return Ok(());
    };

    let transport = BtleplugTransport::new(adapter, peripheral);
    let address = transport.address();
    println!("Found SBrick at {}", address);

    let manager = SessionManager::new(SessionConfig::default())?;
    let session = manager.connect(&address, Arc::new(transport)).await?;

    let _handle = session.on_state_changed(|change| {
        println!("  {} -> {}", change.previous, change.state);
        if let Some(ref failure) = change.failure {
            println!("  Failure: {}", failure);
        }
    });

    session
        .wait_for_state(SessionState::Ready, Duration::from_secs(15))
        .await?;
    println!("\nReady. Driving channel A...");

    for direction in [Direction::Clockwise, Direction::CounterClockwise] {
        println!("  {:?} at full power", direction);
        session.submit(
            &Command::drive()
                .channel(Channel::A, direction, 0xFF)
                .build(),
        )?;
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    println!("Stopping all channels");
    session.submit(&Command::stop_all())?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    manager.shutdown().await?;
    println!("\nDisconnected.");

    Ok(())
}
