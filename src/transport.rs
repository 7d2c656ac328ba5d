//! Capabilities the die session and discovery loop need from a BLE stack.
//!
//! The `ble` module implements these on top of btleplug. Tests drive the
//! session and the discovery loop through in-memory implementations.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::ble::connection::ConnectionEvent;
use crate::error::Result;

/// A connected die, reduced to its two characteristics.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DieLink: Send + Sync {
    /// Write a frame to the command characteristic without waiting for a
    /// transport acknowledgment.
    async fn write_command(&self, data: &[u8]) -> Result<()>;

    /// Enable notifications and return the stream of notification payloads.
    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>>;

    /// Tear down the connection.
    async fn disconnect(&self) -> Result<()>;
}

#[async_trait]
impl<T: DieLink + ?Sized> DieLink for Arc<T> {
    async fn write_command(&self, data: &[u8]) -> Result<()> {
        (**self).write_command(data).await
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>> {
        (**self).notifications().await
    }

    async fn disconnect(&self) -> Result<()> {
        (**self).disconnect().await
    }
}

/// An advertising device that matched the Pixels service filter.
#[derive(Debug, Clone)]
pub struct Advertisement<P> {
    /// Stable address (or platform identifier) of the device.
    pub address: String,
    /// Advertised local name, if any.
    pub local_name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// Backend handle used to connect.
    pub peripheral: P,
}

/// Scan and connect capability of a BLE adapter.
#[async_trait]
pub trait DiceAdapter: Send + Sync {
    /// Backend handle carried by advertisements.
    type Peripheral: Clone + Send + Sync + 'static;
    /// Link type produced by a successful connection.
    type Link: DieLink + 'static;

    /// Scan until one advertisement for the Pixels service passes `accept`,
    /// stop scanning and return it.
    async fn scan_one(
        &self,
        accept: &(dyn for<'a> Fn(&'a Advertisement<Self::Peripheral>) -> bool + Send + Sync),
    ) -> Result<Advertisement<Self::Peripheral>>;

    /// Stop an in-progress scan. Stopping an idle adapter is not an error.
    async fn stop_scan(&self) -> Result<()>;

    /// Connect to an advertised die and discover its characteristics.
    async fn connect(&self, advertisement: &Advertisement<Self::Peripheral>) -> Result<Self::Link>;

    /// Stream of connection state changes for every device on the adapter.
    async fn connection_events(&self) -> Result<BoxStream<'static, ConnectionEvent>>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory link used by session, die and discovery tests.

    use super::*;
    use futures::stream::{self, StreamExt};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::error::Error;

    /// Records written frames and replays notifications pushed by the test.
    pub(crate) struct FakeLink {
        written: Mutex<Vec<Vec<u8>>>,
        notifications: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
        fail_subscribe: bool,
        fail_write: bool,
        disconnected: AtomicBool,
    }

    impl FakeLink {
        pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedSender<Vec<u8>>) {
            Self::build(false, false)
        }

        pub(crate) fn failing_subscribe() -> (Arc<Self>, mpsc::UnboundedSender<Vec<u8>>) {
            Self::build(true, false)
        }

        pub(crate) fn failing_write() -> (Arc<Self>, mpsc::UnboundedSender<Vec<u8>>) {
            Self::build(false, true)
        }

        fn build(
            fail_subscribe: bool,
            fail_write: bool,
        ) -> (Arc<Self>, mpsc::UnboundedSender<Vec<u8>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let link = Arc::new(Self {
                written: Mutex::new(Vec::new()),
                notifications: Mutex::new(Some(rx)),
                fail_subscribe,
                fail_write,
                disconnected: AtomicBool::new(false),
            });
            (link, tx)
        }

        pub(crate) fn written(&self) -> Vec<Vec<u8>> {
            self.written.lock().clone()
        }

        pub(crate) fn is_disconnected(&self) -> bool {
            self.disconnected.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DieLink for FakeLink {
        async fn write_command(&self, data: &[u8]) -> Result<()> {
            if self.fail_write {
                return Err(Error::NotConnected);
            }
            self.written.lock().push(data.to_vec());
            Ok(())
        }

        async fn notifications(&self) -> Result<BoxStream<'static, Vec<u8>>> {
            if self.fail_subscribe {
                return Err(Error::SubscriptionFailed {
                    reason: "notify refused".to_string(),
                });
            }
            let rx = self
                .notifications
                .lock()
                .take()
                .ok_or_else(|| Error::Internal("notifications already taken".to_string()))?;
            Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|data| (data, rx))
            })
            .boxed())
        }

        async fn disconnect(&self) -> Result<()> {
            self.disconnected.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A raw identity reply for `pixel_id`, resting on face index 2.
    pub(crate) fn i_am_a_die_frame(pixel_id: u32) -> Vec<u8> {
        let mut frame = vec![0u8; 22];
        frame[0] = 2;
        frame[1] = 20;
        frame[8..12].copy_from_slice(&pixel_id.to_le_bytes());
        frame[18] = 5;
        frame[19] = 2;
        frame[20] = 90;
        frame[21] = 1;
        frame
    }
}
