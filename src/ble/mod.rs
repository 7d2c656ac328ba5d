//! BLE communication module.
//!
//! This module provides the btleplug backend for discovering and
//! communicating with Pixels dice.

pub mod characteristics;
pub mod connection;
pub mod scanner;
pub mod uuids;

pub use characteristics::CharacteristicHandler;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use scanner::BleScanner;
pub use uuids::*;
