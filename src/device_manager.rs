//! Device manager for discovering and connecting Pixels dice.
//!
//! The discovery loop scans for one die at a time, connects it, runs the
//! handshake and hands the ready [`Die`] to the caller. Devices already
//! connected are skipped until the adapter reports them disconnected.

use futures::stream::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ble::connection::ConnectionEvent;
use crate::ble::scanner::BleScanner;
use crate::die::Die;
use crate::error::{Error, Result};
use crate::session::SessionConfig;
use crate::transport::{Advertisement, DiceAdapter, DieLink};

/// Default pause between discovery attempts.
pub const DEFAULT_RESCAN_COOLDOWN: Duration = Duration::from_secs(3);

/// Discovery loop tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveryConfig {
    /// Pause after every discovery attempt, successful or not.
    pub rescan_cooldown: Duration,
    /// Configuration for the sessions of discovered dice.
    pub session: SessionConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            rescan_cooldown: DEFAULT_RESCAN_COOLDOWN,
            session: SessionConfig::default(),
        }
    }
}

impl DiscoveryConfig {
    /// Set the pause between discovery attempts.
    pub fn with_rescan_cooldown(mut self, cooldown: Duration) -> Self {
        self.rescan_cooldown = cooldown;
        self
    }

    /// Set the session configuration.
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

/// Connected flag per device address.
#[derive(Debug, Default)]
pub struct SeenDevices {
    devices: Mutex<HashMap<String, bool>>,
}

impl SeenDevices {
    /// Check if the device at `address` is connected.
    pub fn is_connected(&self, address: &str) -> bool {
        self.devices.lock().get(address).copied().unwrap_or(false)
    }

    fn set_connected(&self, address: &str, connected: bool) {
        self.devices.lock().insert(address.to_string(), connected);
    }

    fn record(&self, event: &ConnectionEvent) {
        debug!("{} is now {}", event.identifier, event.state);
        self.set_connected(&event.identifier, event.state.is_connected());
    }

    /// Snapshot of every address seen so far.
    pub fn snapshot(&self) -> HashMap<String, bool> {
        self.devices.lock().clone()
    }
}

/// Central manager for discovering Pixels dice.
pub struct DeviceManager<A: DiceAdapter = BleScanner> {
    /// BLE adapter.
    adapter: Arc<A>,
    /// Discovery tuning.
    config: DiscoveryConfig,
    /// Connected flag per address.
    seen: Arc<SeenDevices>,
    /// Shutdown flag shared with the background tasks.
    shutdown_tx: watch::Sender<bool>,
    /// Discovery loop task.
    discovery_handle: Mutex<Option<JoinHandle<()>>>,
    /// Connection event task.
    events_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceManager<BleScanner> {
    /// Create a manager on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let scanner = BleScanner::new().await?;
        Ok(Self::with_adapter(scanner, DiscoveryConfig::default()))
    }
}

impl<A: DiceAdapter + 'static> DeviceManager<A> {
    /// Create a manager on a specific adapter.
    pub fn with_adapter(adapter: A, config: DiscoveryConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            adapter: Arc::new(adapter),
            config,
            seen: Arc::new(SeenDevices::default()),
            shutdown_tx,
            discovery_handle: Mutex::new(None),
            events_handle: Mutex::new(None),
        }
    }

    /// Get the adapter.
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Get the discovery configuration.
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Snapshot of the connected flag of every address seen so far.
    pub fn seen_devices(&self) -> HashMap<String, bool> {
        self.seen.snapshot()
    }

    /// Check if the discovery loop is running.
    pub fn is_running(&self) -> bool {
        self.discovery_handle
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Start the discovery loop.
    ///
    /// Every ready die is sent on `dice_tx`. The loop runs until
    /// [`DeviceManager::stop`] is called, the manager is dropped or the
    /// receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter's connection events are unavailable.
    pub async fn watch_for_dice(&self, dice_tx: mpsc::Sender<Arc<Die>>) -> Result<()> {
        if self.is_running() {
            debug!("Already watching for dice");
            return Ok(());
        }

        info!("Watching for dice");
        self.shutdown_tx.send_replace(false);

        let mut events = self.adapter.connection_events().await?;
        let seen = self.seen.clone();
        let mut shutdown = self.shutdown_tx.subscribe();

        let events_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    event = events.next() => match event {
                        Some(event) => seen.record(&event),
                        None => break,
                    },
                }
            }

            debug!("Connection event task ended");
        });

        let discovery_handle = tokio::spawn(discovery_loop(
            self.adapter.clone(),
            self.seen.clone(),
            self.config.clone(),
            dice_tx,
            self.shutdown_tx.subscribe(),
        ));

        *self.events_handle.lock() = Some(events_handle);
        *self.discovery_handle.lock() = Some(discovery_handle);

        Ok(())
    }

    /// Stop the discovery loop and wait for it to end.
    ///
    /// Interrupts an in-progress scan, handshake or cooldown.
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping discovery");
        self.shutdown_tx.send_replace(true);

        let discovery_handle = self.discovery_handle.lock().take();
        if let Some(handle) = discovery_handle {
            let _ = handle.await;
        }

        let events_handle = self.events_handle.lock().take();
        if let Some(handle) = events_handle {
            let _ = handle.await;
        }

        self.adapter.stop_scan().await
    }
}

impl<A: DiceAdapter> Drop for DeviceManager<A> {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Resolve once shutdown is requested or the manager is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn discovery_loop<A: DiceAdapter>(
    adapter: Arc<A>,
    seen: Arc<SeenDevices>,
    config: DiscoveryConfig,
    dice_tx: mpsc::Sender<Arc<Die>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        match discover_one(adapter.as_ref(), &seen, &config.session, &dice_tx, &mut shutdown).await {
            Attempt::Delivered => {}
            Attempt::Skipped => continue,
            Attempt::Failed(e) => warn!("Discovery attempt failed: {}", e),
            Attempt::Stopped => break,
        }

        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = dice_tx.closed() => {
                info!("Dice receiver dropped");
                break;
            }
            _ = tokio::time::sleep(config.rescan_cooldown) => {}
        }
    }

    if let Err(e) = adapter.stop_scan().await {
        warn!("Failed to stop scan: {}", e);
    }

    debug!("Discovery loop ended");
}

/// How a single discovery attempt ended.
enum Attempt {
    /// A ready die was handed to the receiver.
    Delivered,
    /// The device got connected while the scan was stopping.
    Skipped,
    /// Scan, connect or handshake failed. Nothing is left connected.
    Failed(Error),
    /// Shutdown was requested or the receiver is gone. Nothing is left
    /// connected.
    Stopped,
}

/// Scan for one unconnected die, connect it, run the handshake and deliver
/// it on `dice_tx`.
///
/// The scan, the handshake and the delivery race the shutdown flag and the
/// receiver. `connect` runs to completion so the link it produces is always
/// released.
async fn discover_one<A: DiceAdapter>(
    adapter: &A,
    seen: &SeenDevices,
    session: &SessionConfig,
    dice_tx: &mpsc::Sender<Arc<Die>>,
    shutdown: &mut watch::Receiver<bool>,
) -> Attempt {
    let accept =
        |advertisement: &Advertisement<A::Peripheral>| !seen.is_connected(&advertisement.address);
    let scanned = tokio::select! {
        _ = wait_for_shutdown(shutdown) => return Attempt::Stopped,
        _ = dice_tx.closed() => {
            info!("Dice receiver dropped");
            return Attempt::Stopped;
        }
        scanned = adapter.scan_one(&accept) => scanned,
    };
    let advertisement = match scanned {
        Ok(advertisement) => advertisement,
        Err(e) => return Attempt::Failed(e),
    };
    let address = advertisement.address.clone();

    if seen.is_connected(&address) {
        debug!("{} connected meanwhile, skipping", address);
        return Attempt::Skipped;
    }

    info!("Connecting to {}", address);
    let link: Arc<dyn DieLink> = match adapter.connect(&advertisement).await {
        Ok(link) => Arc::new(link),
        Err(e) => return Attempt::Failed(e),
    };
    seen.set_connected(&address, true);

    let handshake = tokio::select! {
        _ = wait_for_shutdown(shutdown) => None,
        _ = dice_tx.closed() => None,
        connected = Die::connect(address.clone(), link.clone(), session.clone()) => Some(connected),
    };
    let die = match handshake {
        Some(Ok(die)) => Arc::new(die),
        Some(Err(e)) => {
            release(link.as_ref(), seen, &address).await;
            return Attempt::Failed(e);
        }
        None => {
            info!("Handshake with {} interrupted", address);
            release(link.as_ref(), seen, &address).await;
            return Attempt::Stopped;
        }
    };

    tokio::select! {
        _ = wait_for_shutdown(shutdown) => {}
        sent = dice_tx.send(die.clone()) => match sent {
            Ok(()) => return Attempt::Delivered,
            Err(_) => info!("Dice receiver dropped"),
        },
    }

    if let Err(e) = die.disconnect().await {
        warn!("Failed to disconnect {}: {}", address, e);
    }
    seen.set_connected(&address, false);
    Attempt::Stopped
}

/// Disconnect a link that never became a delivered die.
async fn release(link: &dyn DieLink, seen: &SeenDevices, address: &str) {
    if let Err(e) = link.disconnect().await {
        warn!("Failed to disconnect {}: {}", address, e);
    }
    seen.set_connected(address, false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::connection::ConnectionState;
    use crate::transport::testing::{i_am_a_die_frame, FakeLink};
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Advertises a fixed set of dice; each connection answers the handshake
    /// unless the adapter is silent.
    struct FakeAdapter {
        advertised: Vec<&'static str>,
        silent: bool,
        links: Mutex<Vec<Arc<FakeLink>>>,
        failed_connects: AtomicUsize,
        connects: AtomicUsize,
        stop_scans: AtomicUsize,
        notifiers: Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>,
        events_rx: Mutex<Option<mpsc::UnboundedReceiver<ConnectionEvent>>>,
    }

    impl FakeAdapter {
        fn new(advertised: Vec<&'static str>) -> (Self, mpsc::UnboundedSender<ConnectionEvent>) {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let adapter = Self {
                advertised,
                silent: false,
                links: Mutex::new(Vec::new()),
                failed_connects: AtomicUsize::new(0),
                connects: AtomicUsize::new(0),
                stop_scans: AtomicUsize::new(0),
                notifiers: Mutex::new(Vec::new()),
                events_rx: Mutex::new(Some(events_rx)),
            };
            (adapter, events_tx)
        }

        fn failing_first_connects(self, count: usize) -> Self {
            self.failed_connects.store(count, Ordering::SeqCst);
            self
        }

        /// Connected links never answer `WhoAreYou`.
        fn silent(mut self) -> Self {
            self.silent = true;
            self
        }

        fn links(&self) -> Vec<Arc<FakeLink>> {
            self.links.lock().clone()
        }
    }

    #[async_trait]
    impl DiceAdapter for FakeAdapter {
        type Peripheral = u32;
        type Link = Arc<FakeLink>;

        async fn scan_one(
            &self,
            accept: &(dyn for<'a> Fn(&'a Advertisement<u32>) -> bool + Send + Sync),
        ) -> Result<Advertisement<u32>> {
            let found = self
                .advertised
                .iter()
                .enumerate()
                .map(|(i, address)| Advertisement {
                    address: address.to_string(),
                    local_name: Some(format!("Pixel {}", i)),
                    rssi: Some(-60),
                    peripheral: i as u32 + 1,
                })
                .find(|advertisement| accept(advertisement));

            match found {
                Some(advertisement) => Ok(advertisement),
                None => std::future::pending().await,
            }
        }

        async fn stop_scan(&self) -> Result<()> {
            self.stop_scans.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn connect(&self, advertisement: &Advertisement<u32>) -> Result<Arc<FakeLink>> {
            self.connects.fetch_add(1, Ordering::SeqCst);

            let failed = self
                .failed_connects
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if failed.is_ok() {
                return Err(Error::ConnectionFailed {
                    reason: "out of range".to_string(),
                });
            }

            let (link, tx) = FakeLink::new();
            if !self.silent {
                tx.send(i_am_a_die_frame(advertisement.peripheral)).unwrap();
            }
            self.notifiers.lock().push(tx);
            self.links.lock().push(link.clone());
            Ok(link)
        }

        async fn connection_events(&self) -> Result<BoxStream<'static, ConnectionEvent>> {
            let rx = self.events_rx.lock().take().unwrap();
            Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed())
        }
    }

    async fn next_die(rx: &mut mpsc::Receiver<Arc<Die>>) -> Arc<Die> {
        tokio::time::timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("no die discovered")
            .expect("discovery loop ended")
    }

    #[test]
    fn test_discovery_config_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.rescan_cooldown, Duration::from_secs(3));
        assert_eq!(config.session, SessionConfig::default());

        let config = config.with_rescan_cooldown(Duration::from_secs(1));
        assert_eq!(config.rescan_cooldown, Duration::from_secs(1));
    }

    #[test]
    fn test_seen_devices_records_events() {
        let seen = SeenDevices::default();
        assert!(!seen.is_connected("AA"));

        seen.record(&ConnectionEvent {
            identifier: "AA".to_string(),
            state: ConnectionState::Connected,
        });
        assert!(seen.is_connected("AA"));

        seen.record(&ConnectionEvent {
            identifier: "AA".to_string(),
            state: ConnectionState::Disconnected,
        });
        assert!(!seen.is_connected("AA"));
        assert_eq!(seen.snapshot(), HashMap::from([("AA".to_string(), false)]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovers_and_identifies_die() {
        let (adapter, _events) = FakeAdapter::new(vec!["AA"]);
        let manager = DeviceManager::with_adapter(adapter, DiscoveryConfig::default());
        let (tx, mut rx) = mpsc::channel(4);

        manager.watch_for_dice(tx).await.unwrap();
        let die = next_die(&mut rx).await;

        assert_eq!(die.identifier(), "AA");
        assert_eq!(die.pixel_id(), 1);
        assert!(die.session_state().is_ready());
        assert!(manager.is_running());
        assert_eq!(
            manager.seen_devices(),
            HashMap::from([("AA".to_string(), true)])
        );

        manager.stop().await.unwrap();
        assert!(!manager.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_devices_are_skipped_after_cooldown() {
        let (adapter, _events) = FakeAdapter::new(vec!["AA", "BB"]);
        let manager = DeviceManager::with_adapter(adapter, DiscoveryConfig::default());
        let (tx, mut rx) = mpsc::channel(4);

        manager.watch_for_dice(tx).await.unwrap();
        let first = next_die(&mut rx).await;
        let first_at = Instant::now();
        let second = next_die(&mut rx).await;

        assert_eq!(first.identifier(), "AA");
        assert_eq!(second.identifier(), "BB");
        assert!(first_at.elapsed() >= DEFAULT_RESCAN_COOLDOWN);

        // Both connected: the loop scans forever without connecting again.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(manager.adapter().connects.load(Ordering::SeqCst), 2);
        manager.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_device_is_rediscovered() {
        let (adapter, events) = FakeAdapter::new(vec!["AA"]);
        let manager = DeviceManager::with_adapter(adapter, DiscoveryConfig::default());
        let (tx, mut rx) = mpsc::channel(4);

        manager.watch_for_dice(tx).await.unwrap();
        let first = next_die(&mut rx).await;
        assert_eq!(first.identifier(), "AA");

        events
            .send(ConnectionEvent {
                identifier: "AA".to_string(),
                state: ConnectionState::Disconnected,
            })
            .unwrap();

        let again = next_die(&mut rx).await;
        assert_eq!(again.identifier(), "AA");
        assert_eq!(manager.adapter().connects.load(Ordering::SeqCst), 2);
        manager.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_waits_cooldown_and_continues() {
        let (adapter, _events) = FakeAdapter::new(vec!["AA"]);
        let adapter = adapter.failing_first_connects(1);
        let manager = DeviceManager::with_adapter(adapter, DiscoveryConfig::default());
        let (tx, mut rx) = mpsc::channel(4);
        let started = Instant::now();

        manager.watch_for_dice(tx).await.unwrap();
        let die = next_die(&mut rx).await;

        assert_eq!(die.identifier(), "AA");
        assert!(started.elapsed() >= DEFAULT_RESCAN_COOLDOWN);
        assert_eq!(manager.adapter().connects.load(Ordering::SeqCst), 2);
        manager.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_cooldown() {
        let (adapter, _events) = FakeAdapter::new(vec!["AA"]);
        let config = DiscoveryConfig::default().with_rescan_cooldown(Duration::from_secs(3600));
        let manager = DeviceManager::with_adapter(adapter, config);
        let (tx, mut rx) = mpsc::channel(4);

        manager.watch_for_dice(tx).await.unwrap();
        next_die(&mut rx).await;

        let started = Instant::now();
        manager.stop().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!manager.is_running());
        assert!(manager.adapter().stop_scans.load(Ordering::SeqCst) >= 1);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_receiver_ends_loop() {
        let (adapter, _events) = FakeAdapter::new(vec![]);
        let manager = DeviceManager::with_adapter(adapter, DiscoveryConfig::default());
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        manager.watch_for_dice(tx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!manager.is_running());
        assert_eq!(manager.adapter().stop_scans.load(Ordering::SeqCst), 1);
    }

    fn slow_handshake() -> DiscoveryConfig {
        DiscoveryConfig::default()
            .with_session(SessionConfig::default().with_identity_timeout(Duration::from_secs(60)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_handshake_disconnects_link() {
        let (adapter, _events) = FakeAdapter::new(vec!["AA"]);
        let manager = DeviceManager::with_adapter(adapter.silent(), slow_handshake());
        let (tx, mut rx) = mpsc::channel(4);

        manager.watch_for_dice(tx).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            manager.seen_devices(),
            HashMap::from([("AA".to_string(), true)])
        );

        let started = Instant::now();
        manager.stop().await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        let links = manager.adapter().links();
        assert_eq!(links.len(), 1);
        assert!(links[0].is_disconnected());
        assert_eq!(
            manager.seen_devices(),
            HashMap::from([("AA".to_string(), false)])
        );
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_receiver_during_handshake_disconnects_link() {
        let (adapter, _events) = FakeAdapter::new(vec!["AA"]);
        let manager = DeviceManager::with_adapter(adapter.silent(), slow_handshake());
        let (tx, rx) = mpsc::channel(4);

        manager.watch_for_dice(tx).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(rx);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!manager.is_running());
        assert!(manager.adapter().links()[0].is_disconnected());
        assert_eq!(
            manager.seen_devices(),
            HashMap::from([("AA".to_string(), false)])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_receiver_ends_pending_scan() {
        let (adapter, _events) = FakeAdapter::new(vec![]);
        let manager = DeviceManager::with_adapter(adapter, DiscoveryConfig::default());
        let (tx, rx) = mpsc::channel(4);

        manager.watch_for_dice(tx).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(manager.is_running());

        drop(rx);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!manager.is_running());
        assert_eq!(manager.adapter().stop_scans.load(Ordering::SeqCst), 1);
    }
}
