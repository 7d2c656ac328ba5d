//! Session state machine for one connected die.
//!
//! A session moves through `Connecting -> AwaitingIdentity -> Ready`:
//!
//! - `Connecting`: notifications are enabled. If that fails the session
//!   goes to `Closed` and the error goes back to the caller.
//! - `AwaitingIdentity`: `WhoAreYou` has been written; the session waits for
//!   an `IAmADie` reply with a nonzero pixel id, bounded by a deadline.
//! - `Ready`: entered when the reply arrives or the deadline passes,
//!   whichever is first. A late reply is still applied to the die state.
//!
//! From the moment notifications are enabled, every frame is decoded and
//! applied to the [`DieState`] by a listener task. Malformed frames are
//! logged and dropped.

use futures::stream::{BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::data::{DieState, Face, RollState};
use crate::error::{Error, Result};
use crate::protocol::Message;
use crate::transport::DieLink;

/// Default time to wait for the identity reply.
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the die event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Handshake progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Enabling notifications.
    #[default]
    Connecting,
    /// `WhoAreYou` sent, waiting for the identity reply.
    AwaitingIdentity,
    /// Handshake finished; notifications are applied as they arrive.
    Ready,
    /// The session was closed or failed during setup.
    Closed,
}

impl SessionState {
    /// Check if the handshake has finished.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::AwaitingIdentity => write!(f, "AwaitingIdentity"),
            Self::Ready => write!(f, "Ready"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// How the identity handshake ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The die answered with its pixel id.
    Identified {
        /// The resolved pixel id.
        pixel_id: u32,
    },
    /// No identity reply before the deadline. The pixel id stays 0 unless a
    /// late reply is received.
    TimedOut,
}

impl HandshakeOutcome {
    /// Check if the identity was resolved during the handshake.
    pub fn is_identified(&self) -> bool {
        matches!(self, Self::Identified { .. })
    }
}

/// Session tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// How long to wait for the identity reply.
    pub identity_timeout: Duration,
    /// Capacity of the die event channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity_timeout: DEFAULT_IDENTITY_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Set the identity reply deadline.
    pub fn with_identity_timeout(mut self, timeout: Duration) -> Self {
        self.identity_timeout = timeout;
        self
    }

    /// Set the die event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// State change reported by a die.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DieEvent {
    /// The identity reply was applied. Sent at most once per session.
    Identified {
        /// The resolved pixel id.
        pixel_id: u32,
    },
    /// Any roll state notification.
    RollStateChanged {
        /// New roll state.
        roll_state: RollState,
        /// Face reported with it.
        face: Face,
    },
    /// The die settled on a face.
    Rolled {
        /// The face it settled on.
        face: Face,
    },
    /// Battery report.
    BatteryChanged {
        /// Battery level in percent.
        level: u8,
        /// Whether the die is charging.
        charging: bool,
    },
}

type IdentityWaiter = Mutex<Option<oneshot::Sender<u32>>>;

/// Handshake and notification routing for one connected die.
pub struct Session {
    /// Link to the die characteristics.
    link: Arc<dyn DieLink>,
    /// Tuning.
    config: SessionConfig,
    /// Live die model, written by the listener task.
    die_state: Arc<RwLock<DieState>>,
    /// Handshake state.
    state_tx: watch::Sender<SessionState>,
    /// Die events.
    event_tx: broadcast::Sender<DieEvent>,
    /// Handle to the notification listener task.
    listener_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Session {
    /// Create a session in the `Connecting` state.
    pub fn new(link: Arc<dyn DieLink>, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Connecting);
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            link,
            config,
            die_state: Arc::new(RwLock::new(DieState::new())),
            state_tx,
            event_tx,
            listener_handle: Mutex::new(None),
        }
    }

    /// Run the handshake and leave the session `Ready`.
    ///
    /// # Errors
    ///
    /// Returns an error if notifications cannot be enabled or `WhoAreYou`
    /// cannot be written. A missing identity reply is not an error; it is
    /// reported as [`HandshakeOutcome::TimedOut`].
    pub async fn start(&self) -> Result<HandshakeOutcome> {
        let current = self.state();
        if current != SessionState::Connecting {
            return Err(Error::Internal(format!(
                "session cannot start from state {}",
                current
            )));
        }

        let notifications = match self.link.notifications().await {
            Ok(notifications) => notifications,
            Err(e) => {
                warn!("Failed to enable die notifications: {}", e);
                self.set_state(SessionState::Closed);
                return Err(e);
            }
        };

        let (identity_tx, identity_rx) = oneshot::channel();
        let identity_waiter = Arc::new(Mutex::new(Some(identity_tx)));

        let handle = tokio::spawn(run_listener(
            notifications,
            self.die_state.clone(),
            self.event_tx.clone(),
            identity_waiter,
        ));
        *self.listener_handle.lock() = Some(handle);

        self.set_state(SessionState::AwaitingIdentity);

        if let Err(e) = self.send(&Message::WhoAreYou).await {
            warn!("Failed to send WhoAreYou: {}", e);
            self.abort_listener();
            self.set_state(SessionState::Closed);
            return Err(e);
        }

        let timeout = self.config.identity_timeout;
        let outcome = match tokio::time::timeout(timeout, identity_rx).await {
            Ok(Ok(pixel_id)) => {
                info!("Die identified as {:08X}", pixel_id);
                HandshakeOutcome::Identified { pixel_id }
            }
            Ok(Err(_)) => {
                warn!("Notification stream ended before the identity reply");
                HandshakeOutcome::TimedOut
            }
            Err(_) => {
                info!("No identity reply within {:?}, continuing unresolved", timeout);
                HandshakeOutcome::TimedOut
            }
        };

        self.set_state(SessionState::Ready);

        Ok(outcome)
    }

    /// Encode and write a message to the command characteristic.
    ///
    /// Fire and forget: acknowledgments are not awaited.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let frame = message.encode();
        trace!("Sending {:?}: {:02X?}", message.message_type(), frame.as_ref());
        self.link.write_command(&frame).await
    }

    /// Stop processing notifications and disconnect the link.
    pub async fn close(&self) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Ok(());
        }

        self.abort_listener();
        self.set_state(SessionState::Closed);
        self.link.disconnect().await
    }

    /// Current handshake state.
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch handshake state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Snapshot of the die state.
    pub fn die_state(&self) -> DieState {
        self.die_state.read().clone()
    }

    /// Read a value from the die state without cloning all of it.
    pub(crate) fn read_die_state<T>(&self, f: impl FnOnce(&DieState) -> T) -> T {
        f(&self.die_state.read())
    }

    /// Subscribe to die events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DieEvent> {
        self.event_tx.subscribe()
    }

    /// Session tuning in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn set_state(&self, new_state: SessionState) {
        let old_state = self.state_tx.send_replace(new_state);
        if old_state != new_state {
            debug!("Session state changed: {} -> {}", old_state, new_state);
        }
    }

    fn abort_listener(&self) {
        if let Some(handle) = self.listener_handle.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.abort_listener();
    }
}

async fn run_listener(
    mut notifications: BoxStream<'static, Vec<u8>>,
    die_state: Arc<RwLock<DieState>>,
    event_tx: broadcast::Sender<DieEvent>,
    identity_waiter: Arc<IdentityWaiter>,
) {
    debug!("Notification listener started");

    while let Some(data) = notifications.next().await {
        handle_notification(&data, &die_state, &event_tx, &identity_waiter);
    }

    debug!("Notification stream ended");
}

/// Decode one notification and apply it to the die state.
fn handle_notification(
    data: &[u8],
    die_state: &RwLock<DieState>,
    event_tx: &broadcast::Sender<DieEvent>,
    identity_waiter: &IdentityWaiter,
) {
    trace!("Notification: {} bytes, data: {:02X?}", data.len(), data);

    let message = match Message::decode(data) {
        Ok(message) => message,
        Err(e) => {
            warn!("Dropping malformed notification: {}", e);
            return;
        }
    };

    match &message {
        Message::IAmADie(msg) => {
            debug!("Received IAmADie: {:?}", msg);

            let pixel_id = {
                let mut state = die_state.write();
                state.apply_identity(msg);
                state.pixel_id
            };

            if pixel_id != 0 {
                if let Some(tx) = identity_waiter.lock().take() {
                    // The handshake may already have given up; the state is
                    // applied either way.
                    let _ = tx.send(pixel_id);
                    let _ = event_tx.send(DieEvent::Identified { pixel_id });
                }
            }
        }
        Message::RollState(msg) => {
            debug!("Received RollState: {:?}", msg);

            die_state.write().apply_roll_state(msg);

            let _ = event_tx.send(DieEvent::RollStateChanged {
                roll_state: msg.roll_state,
                face: msg.face,
            });
            if msg.roll_state.is_stable() {
                let _ = event_tx.send(DieEvent::Rolled { face: msg.face });
            }
        }
        Message::BatteryLevel(msg) => {
            debug!("Received BatteryLevel: {:?}", msg);

            let charging = {
                let mut state = die_state.write();
                state.apply_battery(msg);
                state.battery_charging
            };

            let _ = event_tx.send(DieEvent::BatteryChanged {
                level: msg.battery_level,
                charging,
            });
        }
        Message::BlinkAck => debug!("Blink acknowledged"),
        Message::Other { message_type, data } => {
            debug!("Ignoring {} message: {:02X?}", message_type, data.as_ref());
        }
        Message::Unknown { tag, data } => {
            debug!("Ignoring unknown message type {}: {:02X?}", tag, data.as_ref());
        }
        other => debug!("Ignoring unexpected {:?} from die", other),
    }
}
