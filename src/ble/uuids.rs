//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for Pixels die communication.

use uuid::Uuid;

// Pixels Service
/// Pixels die service UUID, used as the scan filter.
pub const PIXELS_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
/// Notify characteristic UUID (messages from the die).
///
/// Shares its value with the service UUID.
pub const PIXELS_NOTIFY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);
/// Write characteristic UUID (commands to the die).
pub const PIXELS_WRITE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e40_0002_b5a3_f393_e0a9_e50e24dcca9e);

// Device Information Service (Standard BLE)
/// Standard BLE Device Information Service UUID.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);

// DFU Service (Nordic Buttonless DFU)
/// Nordic DFU Service UUID for firmware updates.
pub const NORDIC_DFU_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_fe59_0000_1000_8000_00805f9b34fb);

/// Check if a service UUID indicates a Pixels die.
pub fn is_pixels_service(uuid: &Uuid) -> bool {
    *uuid == PIXELS_SERVICE_UUID
}
