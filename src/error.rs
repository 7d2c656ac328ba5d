//! Error types for the pixels-rust-ble crate.

use thiserror::Error;

use crate::protocol::MessageType;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// Operation requires a connection but the die is not connected.
    #[error("Die not connected")]
    NotConnected,

    /// Failed to establish a connection to the die.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Enabling notification delivery on the die failed.
    #[error("Notification subscription failed: {reason}")]
    SubscriptionFailed {
        /// Description of why the subscription failed.
        reason: String,
    },

    /// A message received from the die could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came from the BLE transport (scan, connect,
    /// discovery, write or subscribe) rather than from the codec.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Decode(_) | Self::Internal(_))
    }
}

/// Errors produced while decoding a raw notification buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer did not even contain a message type byte.
    #[error("Empty message buffer")]
    Empty,

    /// The buffer is shorter than the fixed layout of its message type.
    #[error("Truncated {message_type} message: expected {expected} bytes, got {actual}")]
    TruncatedMessage {
        /// Message type read from byte 0.
        message_type: MessageType,
        /// Fixed layout size for that message type.
        expected: usize,
        /// Size of the buffer actually received.
        actual: usize,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
