//! Die struct and methods.
//!
//! Represents a single connected Pixels die.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::data::{DesignAndColor, DieState, Face, RollState};
use crate::error::Result;
use crate::protocol::{Blink, Message};
use crate::session::{DieEvent, HandshakeOutcome, Session, SessionConfig, SessionState};
use crate::transport::DieLink;

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Represents a single connected Pixels die.
///
/// A `Die` only exists once its session has finished the handshake, so it is
/// always `Ready` until [`Die::disconnect`] is called.
pub struct Die {
    /// BLE identifier.
    identifier: String,
    /// Handshake and notification routing.
    session: Session,
    /// How the handshake ended.
    handshake: HandshakeOutcome,
    /// Callback ID counter.
    callback_counter: AtomicU64,
}

impl Die {
    /// Run the handshake on a freshly connected link.
    ///
    /// # Errors
    ///
    /// Returns an error if notifications cannot be enabled or the identity
    /// request cannot be written. An unanswered identity request is not an
    /// error; check [`Die::is_identified`].
    pub async fn connect(
        identifier: impl Into<String>,
        link: Arc<dyn DieLink>,
        config: SessionConfig,
    ) -> Result<Self> {
        let identifier = identifier.into();
        info!("Starting session with die {}", identifier);

        let session = Session::new(link, config);
        let handshake = session.start().await?;

        match handshake {
            HandshakeOutcome::Identified { pixel_id } => {
                info!("Die {} ready as {:08X}", identifier, pixel_id)
            }
            HandshakeOutcome::TimedOut => info!("Die {} ready, identity unresolved", identifier),
        }

        Ok(Self {
            identifier,
            session,
            handshake,
            callback_counter: AtomicU64::new(0),
        })
    }

    // === Identification ===

    /// Get the BLE identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Get the pixel id, 0 while unresolved.
    pub fn pixel_id(&self) -> u32 {
        self.session.read_die_state(|s| s.pixel_id)
    }

    /// Get the pixel id as a formatted string.
    pub fn pixel_id_string(&self) -> String {
        format!("{:08X}", self.pixel_id())
    }

    /// Check if the identity is known, including late replies.
    pub fn is_identified(&self) -> bool {
        self.session.read_die_state(|s| s.is_identified())
    }

    /// How the handshake ended.
    pub fn handshake_outcome(&self) -> HandshakeOutcome {
        self.handshake
    }

    /// Get the LED count.
    pub fn led_count(&self) -> u8 {
        self.session.read_die_state(|s| s.led_count)
    }

    /// Get the design and color.
    pub fn design_and_color(&self) -> DesignAndColor {
        self.session.read_die_state(|s| s.design_and_color)
    }

    /// Get the firmware build timestamp, UNIX seconds.
    pub fn build_timestamp(&self) -> u32 {
        self.session.read_die_state(|s| s.build_timestamp)
    }

    /// Get the firmware build time.
    pub fn build_time(&self) -> Option<DateTime<Utc>> {
        self.session.read_die_state(|s| s.build_time())
    }

    // === Live state ===

    /// Get the last stable face.
    pub fn current_face(&self) -> Face {
        self.session.read_die_state(|s| s.face)
    }

    /// Get the last stable face index (zero-based).
    pub fn face_index(&self) -> u8 {
        self.current_face().index()
    }

    /// Get the last stable face value (one-based).
    pub fn face_value(&self) -> u16 {
        self.current_face().value()
    }

    /// Get the most recent roll state.
    pub fn roll_state(&self) -> RollState {
        self.session.read_die_state(|s| s.roll_state)
    }

    /// Get the battery level in percent.
    pub fn battery_level(&self) -> u8 {
        self.session.read_die_state(|s| s.battery_level)
    }

    /// Check if the battery is charging.
    pub fn is_charging(&self) -> bool {
        self.session.read_die_state(|s| s.battery_charging)
    }

    /// When the last stable face was read.
    pub fn last_rolled(&self) -> Option<DateTime<Utc>> {
        self.session.read_die_state(|s| s.last_rolled)
    }

    /// Snapshot of the whole die state.
    pub fn state(&self) -> DieState {
        self.session.die_state()
    }

    /// Get the session state.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    // === Commands ===

    /// Blink the LEDs.
    pub async fn blink(&self, blink: Blink) -> Result<()> {
        self.send(&Message::Blink(blink)).await
    }

    /// Ask the die for a battery report. The answer arrives as a notification.
    pub async fn request_battery_level(&self) -> Result<()> {
        self.send(&Message::RequestBatteryLevel).await
    }

    /// Ask the die for a roll state notification.
    pub async fn request_roll_state(&self) -> Result<()> {
        self.send(&Message::RequestRollState).await
    }

    /// Repeat the identity request, e.g. after a timed out handshake.
    pub async fn who_are_you(&self) -> Result<()> {
        self.send(&Message::WhoAreYou).await
    }

    /// Send any message to the die.
    pub async fn send(&self, message: &Message) -> Result<()> {
        self.session.send(message).await
    }

    // === Events ===

    /// Subscribe to die events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DieEvent> {
        self.session.subscribe_events()
    }

    /// Register a callback for when the die settles on a face.
    pub fn on_roll<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(Face) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let DieEvent::Rolled { face } = event {
                callback(face);
            }
        })
    }

    /// Register a callback for battery reports.
    pub fn on_battery<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(u8, bool) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let DieEvent::BatteryChanged { level, charging } = event {
                callback(level, charging);
            }
        })
    }

    fn on_event<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(DieEvent) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.session.subscribe_events();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    // === Connection ===

    /// Stop the session and disconnect.
    pub async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting die {}", self.identifier);
        self.session.close().await
    }
}

impl std::fmt::Debug for Die {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Die")
            .field("identifier", &self.identifier)
            .field("handshake", &self.handshake)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Rgba;
    use crate::transport::testing::{i_am_a_die_frame, FakeLink};
    use crate::transport::MockDieLink;
    use futures::stream::{self, StreamExt};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_connect_resolves_identity() {
        let (link, tx) = FakeLink::new();
        tx.send(i_am_a_die_frame(0x00C0_FFEE)).unwrap();

        let die = Die::connect("AA:BB", link.clone(), SessionConfig::default())
            .await
            .unwrap();

        assert_eq!(die.identifier(), "AA:BB");
        assert_eq!(die.pixel_id(), 0x00C0_FFEE);
        assert_eq!(die.pixel_id_string(), "00C0FFEE");
        assert!(die.is_identified());
        assert!(die.handshake_outcome().is_identified());
        assert_eq!(die.led_count(), 20);
        assert_eq!(die.face_index(), 2);
        assert_eq!(die.face_value(), 3);
        assert_eq!(die.roll_state(), RollState::OnFace);
        assert_eq!(die.battery_level(), 90);
        assert!(!die.is_charging());
        assert!(die.last_rolled().is_some());
        assert_eq!(die.session_state(), SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_reply_is_ready_unresolved() {
        let (link, _tx) = FakeLink::new();

        let die = Die::connect("AA:BB", link, SessionConfig::default())
            .await
            .unwrap();

        assert_eq!(die.pixel_id(), 0);
        assert!(!die.is_identified());
        assert_eq!(die.handshake_outcome(), HandshakeOutcome::TimedOut);
        assert_eq!(die.session_state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_blink_writes_bgra_frame() {
        let mut link = MockDieLink::new();
        link.expect_notifications()
            .times(1)
            .returning(|| Ok(stream::pending().boxed()));
        link.expect_write_command()
            .withf(|data: &[u8]| data == [0x01u8].as_slice())
            .times(1)
            .returning(|_| Ok(()));
        link.expect_write_command()
            .withf(|data: &[u8]| {
                data == [29u8, 3, 0xF4, 0x01, 30, 20, 10, 255, 0x3F, 0, 0, 0, 7, 2].as_slice()
            })
            .times(1)
            .returning(|_| Ok(()));

        let config = SessionConfig::default().with_identity_timeout(Duration::from_millis(10));
        let die = Die::connect("AA:BB", Arc::new(link), config).await.unwrap();

        let blink = Blink::new(3, 500, Rgba::new(10, 20, 30, 255))
            .with_face_mask(0x3F)
            .with_fade(7)
            .with_loop_count(2);
        die.blink(blink).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_fire_and_forget() {
        let (link, tx) = FakeLink::new();
        tx.send(i_am_a_die_frame(5)).unwrap();
        let die = Die::connect("AA:BB", link.clone(), SessionConfig::default())
            .await
            .unwrap();

        die.request_battery_level().await.unwrap();
        die.request_roll_state().await.unwrap();
        die.who_are_you().await.unwrap();

        assert_eq!(link.written(), vec![vec![1], vec![33], vec![23], vec![1]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_roll_callback() {
        let (link, tx) = FakeLink::new();
        tx.send(i_am_a_die_frame(5)).unwrap();
        let die = Die::connect("AA:BB", link, SessionConfig::default())
            .await
            .unwrap();

        let (roll_tx, mut roll_rx) = mpsc::unbounded_channel();
        let _handle = die.on_roll(move |face| {
            let _ = roll_tx.send(face.value());
        });

        tx.send(vec![3, 3, 0]).unwrap();
        tx.send(vec![3, 5, 5]).unwrap();

        let value = tokio::time::timeout(Duration::from_secs(1), roll_rx.recv())
            .await
            .unwrap();
        assert_eq!(value, Some(6));
        assert_eq!(die.face_value(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_session() {
        let (link, tx) = FakeLink::new();
        tx.send(i_am_a_die_frame(5)).unwrap();
        let die = Die::connect("AA:BB", link.clone(), SessionConfig::default())
            .await
            .unwrap();

        die.disconnect().await.unwrap();

        assert_eq!(die.session_state(), SessionState::Closed);
        assert!(link.is_disconnected());
    }
}
