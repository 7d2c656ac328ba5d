//! BLE scanning functionality.
//!
//! Provides the btleplug adapter used to discover and connect Pixels dice.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::ble::characteristics::CharacteristicHandler;
use crate::ble::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::ble::uuids::{is_pixels_service, PIXELS_SERVICE_UUID};
use crate::error::{Error, Result};
use crate::transport::{Advertisement, DiceAdapter, DieLink};

/// BLE scanner for discovering Pixels dice.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Whether scanning is currently active.
    is_scanning: Arc<RwLock<bool>>,
}

impl BleScanner {
    /// Create a scanner on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a new BLE scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            is_scanning: Arc::new(RwLock::new(false)),
        }
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        *self.is_scanning.read()
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn start_scan(&self) -> Result<()> {
        info!("Starting BLE scan for Pixels dice");

        self.adapter
            .start_scan(ScanFilter {
                services: vec![PIXELS_SERVICE_UUID],
            })
            .await?;

        *self.is_scanning.write() = true;
        Ok(())
    }

    async fn wait_for_die(
        &self,
        accept: &(dyn for<'a> Fn(&'a Advertisement<Peripheral>) -> bool + Send + Sync),
    ) -> Result<Advertisement<Peripheral>> {
        let mut events = self.adapter.events().await?;
        self.start_scan().await?;

        while let Some(event) = events.next().await {
            let id = match event {
                CentralEvent::DeviceDiscovered(id)
                | CentralEvent::DeviceUpdated(id)
                | CentralEvent::ServicesAdvertisement { id, .. } => id,
                _ => continue,
            };

            let Some(advertisement) = self.advertisement(&id).await else {
                continue;
            };

            if accept(&advertisement) {
                debug!(
                    "Accepted die {} ({:?}, rssi {:?})",
                    advertisement.address, advertisement.local_name, advertisement.rssi
                );
                return Ok(advertisement);
            }

            trace!("Skipping die {}", advertisement.address);
        }

        Err(Error::Internal("adapter event stream ended".to_string()))
    }

    /// Build an advertisement if the peripheral lists the Pixels service.
    async fn advertisement(&self, id: &PeripheralId) -> Option<Advertisement<Peripheral>> {
        let peripheral = match self.adapter.peripheral(id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        if !properties.services.iter().any(is_pixels_service) {
            return None;
        }

        Some(Advertisement {
            address: id.to_string(),
            local_name: properties.local_name,
            rssi: properties.rssi,
            peripheral,
        })
    }
}

#[async_trait]
impl DiceAdapter for BleScanner {
    type Peripheral = Peripheral;
    type Link = CharacteristicHandler;

    async fn scan_one(
        &self,
        accept: &(dyn for<'a> Fn(&'a Advertisement<Peripheral>) -> bool + Send + Sync),
    ) -> Result<Advertisement<Peripheral>> {
        let result = self.wait_for_die(accept).await;

        if let Err(e) = self.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        result
    }

    async fn stop_scan(&self) -> Result<()> {
        if !*self.is_scanning.read() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");
        *self.is_scanning.write() = false;
        self.adapter.stop_scan().await?;

        Ok(())
    }

    async fn connect(
        &self,
        advertisement: &Advertisement<Peripheral>,
    ) -> Result<CharacteristicHandler> {
        let connection = ConnectionManager::new(advertisement.peripheral.clone());
        connection.connect().await?;

        let handler = CharacteristicHandler::new(connection);
        if let Err(e) = handler.discover_characteristics() {
            warn!("{} is not a usable die: {}", advertisement.address, e);
            let _ = DieLink::disconnect(&handler).await;
            return Err(e);
        }

        Ok(handler)
    }

    async fn connection_events(&self) -> Result<BoxStream<'static, ConnectionEvent>> {
        let events = self.adapter.events().await?;

        Ok(events
            .filter_map(|event| {
                future::ready(match event {
                    CentralEvent::DeviceConnected(id) => Some(ConnectionEvent {
                        identifier: id.to_string(),
                        state: ConnectionState::Connected,
                    }),
                    CentralEvent::DeviceDisconnected(id) => Some(ConnectionEvent {
                        identifier: id.to_string(),
                        state: ConnectionState::Disconnected,
                    }),
                    _ => None,
                })
            })
            .boxed())
    }
}
