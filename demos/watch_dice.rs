//! Basic example: Watch for nearby Pixels dice and print their rolls
//!
//! Run with: cargo run --example watch_dice

use pixels_rust_ble::{DeviceManager, DieEvent, Result};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pixels_rust_ble=info".parse().unwrap()),
        )
        .init();

    println!("Watching for Pixels dice...");
    println!("Press Ctrl+C to stop.\n");

    let manager = DeviceManager::new().await?;
    let (tx, mut rx) = mpsc::channel(8);
    manager.watch_for_dice(tx).await?;

    loop {
        tokio::select! {
            Some(die) = rx.recv() => {
                println!("\nConnected die:");
                println!("  Address: {}", die.identifier());
                println!("  Pixel ID: {}", die.pixel_id_string());
                println!("  Handshake: {:?}", die.handshake_outcome());
                println!("  Design: {}", die.design_and_color().name());
                println!("  LEDs: {}", die.led_count());
                println!("  Face: {}", die.face_value());
                println!(
                    "  Battery: {}%{}",
                    die.battery_level(),
                    if die.is_charging() { " (charging)" } else { "" }
                );

                let mut events = die.subscribe_events();
                let label = die.pixel_id_string();
                tokio::spawn(async move {
                    while let Ok(event) = events.recv().await {
                        match event {
                            DieEvent::Rolled { face } => {
                                println!("[{}] Rolled {}", label, face.value())
                            }
                            DieEvent::RollStateChanged { roll_state, .. } => {
                                println!("[{}] {}", label, roll_state)
                            }
                            DieEvent::BatteryChanged { level, charging } => {
                                println!("[{}] Battery {}% charging={}", label, level, charging)
                            }
                            DieEvent::Identified { pixel_id } => {
                                println!("[{}] Identified late as {:08X}", label, pixel_id)
                            }
                        }
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                break;
            }
        }
    }

    manager.stop().await?;
    Ok(())
}
