// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # pixels-rust-ble
//!
//! A cross-platform Rust library for talking to Pixels smart dice over
//! Bluetooth Low Energy.
//!
//! ## Features
//!
//! - **Wire codec**: Decode die notifications and encode commands
//! - **Die state**: Identity, current face, roll state and battery, kept up
//!   to date from notifications
//! - **Handshake**: Identify each die with a bounded `WhoAreYou` exchange
//! - **Discovery**: Continuously find and connect dice that are not yet
//!   connected
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pixels_rust_ble::{DeviceManager, Result};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = DeviceManager::new().await?;
//!     let (tx, mut rx) = mpsc::channel(8);
//!     manager.watch_for_dice(tx).await?;
//!
//!     let mut handles = Vec::new();
//!     while let Some(die) = rx.recv().await {
//!         println!("Found die {} ({})", die.pixel_id_string(), die.identifier());
//!
//!         // The callback runs until its handle is dropped.
//!         handles.push(die.on_roll(|face| println!("  Rolled {}", face.value())));
//!     }
//!
//!     manager.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod data;
pub mod device_manager;
pub mod die;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use device_manager::{DeviceManager, DiscoveryConfig, SeenDevices, DEFAULT_RESCAN_COOLDOWN};
pub use die::{CallbackHandle, Die};
pub use error::{DecodeError, Error, Result};
pub use session::{
    DieEvent, HandshakeOutcome, Session, SessionConfig, SessionState, DEFAULT_IDENTITY_TIMEOUT,
};
pub use transport::{Advertisement, DiceAdapter, DieLink};

// Re-export commonly used types from submodules
pub use ble::connection::{ConnectionEvent, ConnectionState};
pub use data::{BatteryState, DesignAndColor, DieState, Face, Rgba, RollState};
pub use protocol::{Blink, Message, MessageType};
