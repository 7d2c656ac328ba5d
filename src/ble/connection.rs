//! BLE connection management.
//!
//! Handles connecting to and disconnecting from Pixels dice.

use btleplug::api::Peripheral as _;
use btleplug::platform::Peripheral;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Connection state for a die.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Not connected to the die.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected to the die.
    Connected,
    /// Currently disconnecting.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Connection state change reported by the adapter for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Address of the peripheral.
    pub identifier: String,
    /// The new connection state.
    pub state: ConnectionState,
}

/// Manages the connection to one Pixels die.
pub struct ConnectionManager {
    /// The peripheral to manage.
    peripheral: Peripheral,
    /// Current connection state.
    state: Arc<RwLock<ConnectionState>>,
    /// Maximum connection attempts.
    max_attempts: u32,
    /// Delay between connection attempts.
    retry_delay: Duration,
}

impl ConnectionManager {
    /// Create a new connection manager that tries once.
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            max_attempts: 1,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Retry failed connection attempts.
    pub fn with_retries(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Connect and discover services.
    ///
    /// # Errors
    ///
    /// Returns an error if every attempt fails or if service discovery fails.
    pub async fn connect(&self) -> Result<()> {
        let current_state = self.state();

        if current_state.is_connected() {
            debug!("Already connected");
            return Ok(());
        }

        if current_state.is_transitioning() {
            return Err(Error::ConnectionFailed {
                reason: "Connection already in progress".to_string(),
            });
        }

        self.set_state(ConnectionState::Connecting);

        let mut attempts = 0;
        let mut connected = self.peripheral.is_connected().await.unwrap_or(false);

        while !connected && attempts < self.max_attempts {
            attempts += 1;
            debug!("Connection attempt {} of {}", attempts, self.max_attempts);

            match self.peripheral.connect().await {
                Ok(()) => connected = true,
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempts, e);
                    if attempts < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        if !connected {
            self.set_state(ConnectionState::Disconnected);
            return Err(Error::ConnectionFailed {
                reason: format!("Failed after {} attempts", self.max_attempts),
            });
        }

        if let Err(e) = self.peripheral.discover_services().await {
            error!("Failed to discover services: {}", e);
            let _ = self.peripheral.disconnect().await;
            self.set_state(ConnectionState::Disconnected);
            return Err(Error::Bluetooth(e));
        }

        info!("Connected to {}", self.peripheral.address());
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Disconnect from the die.
    pub async fn disconnect(&self) -> Result<()> {
        let current_state = self.state();

        if matches!(
            current_state,
            ConnectionState::Disconnected | ConnectionState::Disconnecting
        ) {
            return Ok(());
        }

        self.set_state(ConnectionState::Disconnecting);

        let result = self.peripheral.disconnect().await;
        self.set_state(ConnectionState::Disconnected);

        match result {
            Ok(()) => {
                info!("Disconnected from {}", self.peripheral.address());
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect: {}", e);
                Err(Error::Bluetooth(e))
            }
        }
    }

    fn set_state(&self, new_state: ConnectionState) {
        let old_state = std::mem::replace(&mut *self.state.write(), new_state);

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);
        }
    }
}
