//! GATT characteristic handling.
//!
//! Provides writing, subscribing and notification forwarding for the
//! characteristics of a connected Pixels die.

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::ble::connection::ConnectionManager;
use crate::ble::uuids::*;
use crate::error::{Error, Result};
use crate::transport::DieLink;

/// Handler for the GATT characteristics of one die.
pub struct CharacteristicHandler {
    /// Connection of the peripheral to communicate with.
    connection: ConnectionManager,
    /// Cached characteristics by UUID.
    characteristics: Arc<RwLock<HashMap<Uuid, Characteristic>>>,
    /// Channel for notify characteristic payloads.
    notification_tx: broadcast::Sender<Vec<u8>>,
    /// Handle to the notification listener task.
    listener_handle: Mutex<Option<JoinHandle<()>>>,
}

impl CharacteristicHandler {
    /// Create a handler for a connected peripheral.
    ///
    /// Services must be discovered before calling
    /// [`CharacteristicHandler::discover_characteristics`].
    pub fn new(connection: ConnectionManager) -> Self {
        let (notification_tx, _) = broadcast::channel(256);

        Self {
            connection,
            characteristics: Arc::new(RwLock::new(HashMap::new())),
            notification_tx,
            listener_handle: Mutex::new(None),
        }
    }

    fn peripheral(&self) -> &Peripheral {
        self.connection.peripheral()
    }

    /// Discover and cache all characteristics.
    ///
    /// # Errors
    ///
    /// Returns `ServiceNotFound` if the Pixels service is missing, and
    /// `CharacteristicNotFound` if either Pixels characteristic is missing.
    pub fn discover_characteristics(&self) -> Result<()> {
        let services = self.peripheral().services();

        if !services.iter().any(|s| is_pixels_service(&s.uuid)) {
            return Err(Error::ServiceNotFound {
                uuid: PIXELS_SERVICE_UUID.to_string(),
            });
        }

        let mut chars = self.characteristics.write();
        chars.clear();

        for service in services {
            for characteristic in service.characteristics {
                trace!(
                    "Found characteristic: {} in service {}",
                    characteristic.uuid,
                    service.uuid
                );
                chars.insert(characteristic.uuid, characteristic);
            }
        }

        debug!("Discovered {} characteristics", chars.len());

        for uuid in [
            PIXELS_NOTIFY_CHARACTERISTIC_UUID,
            PIXELS_WRITE_CHARACTERISTIC_UUID,
        ] {
            if !chars.contains_key(&uuid) {
                return Err(Error::CharacteristicNotFound {
                    uuid: uuid.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get a characteristic by UUID.
    pub fn get_characteristic(&self, uuid: &Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }

    /// Write to a characteristic.
    pub async fn write(&self, uuid: &Uuid, data: &[u8], with_response: bool) -> Result<()> {
        let characteristic = self.get_characteristic(uuid)?;

        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        self.peripheral()
            .write(&characteristic, data, write_type)
            .await?;

        trace!("Wrote {:02X?} to characteristic {}", data, uuid);

        Ok(())
    }

    /// Subscribe to notifications from a characteristic.
    pub async fn subscribe(&self, uuid: &Uuid) -> Result<()> {
        let characteristic = self.get_characteristic(uuid)?;

        self.peripheral()
            .subscribe(&characteristic)
            .await
            .map_err(|e| Error::SubscriptionFailed {
                reason: e.to_string(),
            })?;

        debug!("Subscribed to notifications from {}", uuid);

        Ok(())
    }

    /// Start forwarding notify characteristic payloads.
    ///
    /// Payloads are delivered to receivers from
    /// [`CharacteristicHandler::subscribe_notifications`].
    pub async fn start_notifications(&self) -> Result<()> {
        if self.listener_handle.lock().is_some() {
            return Ok(());
        }

        let mut notifications = self.peripheral().notifications().await?;
        let notification_tx = self.notification_tx.clone();

        let handle = tokio::spawn(async move {
            debug!("Notification listener started");

            while let Some(notification) = notifications.next().await {
                if notification.uuid != PIXELS_NOTIFY_CHARACTERISTIC_UUID {
                    continue;
                }

                trace!(
                    "Notification: {} bytes, data: {:02X?}",
                    notification.value.len(),
                    notification.value
                );

                // No receivers is fine; the session may not be listening yet.
                let _ = notification_tx.send(notification.value);
            }

            warn!("Notification stream ended");
        });

        *self.listener_handle.lock() = Some(handle);

        Ok(())
    }

    /// Stop forwarding notifications.
    pub fn stop_notifications(&self) {
        if let Some(handle) = self.listener_handle.lock().take() {
            handle.abort();
        }
    }

    /// Get a receiver for notify characteristic payloads.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Vec<u8>> {
        self.notification_tx.subscribe()
    }
}

/// Turn a payload receiver into a stream, skipping over lag.
fn payload_stream(rx: broadcast::Receiver<Vec<u8>>) -> BoxStream<'static, Vec<u8>> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(data) => return Some((data, rx)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dropped {} notifications", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl DieLink for CharacteristicHandler {
    async fn write_command(&self, data: &[u8]) -> Result<()> {
        self.write(&PIXELS_WRITE_CHARACTERISTIC_UUID, data, false)
            .await
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>> {
        let rx = self.subscribe_notifications();
        self.start_notifications().await?;
        self.subscribe(&PIXELS_NOTIFY_CHARACTERISTIC_UUID).await?;

        Ok(payload_stream(rx))
    }

    async fn disconnect(&self) -> Result<()> {
        self.stop_notifications();
        self.connection.disconnect().await.map_err(|e| {
            error!("Disconnect failed: {}", e);
            e
        })
    }
}

impl Drop for CharacteristicHandler {
    fn drop(&mut self) {
        self.stop_notifications();
    }
}
