//! Blink example: Connect to the first Pixels die found and blink it
//!
//! Run with: cargo run --example blink_die
//!
//! To pick the blink color (hex RRGGBB):
//!   cargo run --example blink_die -- --color 00FF80

use pixels_rust_ble::{Blink, DeviceManager, Result, Rgba};
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,pixels_rust_ble=debug")
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let color = args
        .iter()
        .position(|arg| arg == "--color")
        .and_then(|i| args.get(i + 1))
        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
        .map(|rgb| Rgba::rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8))
        .unwrap_or(Rgba::BLUE);

    println!("Looking for a Pixels die...\n");

    let manager = DeviceManager::new().await?;
    let (tx, mut rx) = mpsc::channel(1);
    manager.watch_for_dice(tx).await?;

    let Some(die) = rx.recv().await else {
        println!("Discovery ended before a die was found");
        return Ok(());
    };
    manager.stop().await?;

    println!(
        "Connected to {} ({}), showing face {}",
        die.pixel_id_string(),
        die.identifier(),
        die.face_value()
    );

    die.request_battery_level().await?;
    die.blink(Blink::new(3, 1000, color)).await?;

    // Give the die time to blink and report its battery.
    tokio::time::sleep(Duration::from_secs(3)).await;
    println!("Battery: {}%", die.battery_level());

    die.disconnect().await?;
    Ok(())
}
