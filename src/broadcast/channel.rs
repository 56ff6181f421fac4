//! In-process broadcast bus shared by every tab of an origin.
//!
//! All traffic rides one physical `tokio::sync::broadcast` channel of
//! MessagePack frames. Each frame carries the logical channel name and the
//! sending tab's id, so receivers filter by name and never see their own
//! messages.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use super::message::BroadcastMessage;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    channel: String,
    message: BroadcastMessage,
    sender: Uuid,
}

/// The origin-wide physical bus.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<Bytes>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Open an endpoint for one tab.
    pub fn open(&self, tab_id: Uuid) -> BroadcastChannel {
        BroadcastChannel {
            bus: Some(self.tx.clone()),
            tab_id,
        }
    }
}

/// A tab's endpoint on the bus.
///
/// When the transport is unavailable every operation is a no-op; the tab
/// then behaves as if it were the only one open.
#[derive(Debug, Clone)]
pub struct BroadcastChannel {
    bus: Option<broadcast::Sender<Bytes>>,
    tab_id: Uuid,
}

impl BroadcastChannel {
    /// An endpoint whose transport is blocked or unsupported.
    pub fn unavailable(tab_id: Uuid) -> Self {
        Self { bus: None, tab_id }
    }

    pub fn is_available(&self) -> bool {
        self.bus.is_some()
    }

    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }

    /// Fire-and-forget delivery to every other subscribed tab.
    pub fn send(&self, channel: &str, message: BroadcastMessage) {
        let Some(bus) = &self.bus else {
            return;
        };

        let envelope = Envelope {
            channel: channel.to_string(),
            message,
            sender: self.tab_id,
        };
        let frame = match rmp_serde::to_vec_named(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(tab = %self.tab_id, error = %e, "Failed to encode broadcast message");
                return;
            }
        };

        // Err only means nobody is listening right now
        if bus.send(Bytes::from(frame)).is_err() {
            debug!(tab = %self.tab_id, ?message, "Broadcast with no subscribers");
        }
    }

    /// Subscribe to one logical channel.
    ///
    /// Dropping the subscription unsubscribes.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        Subscription {
            channel: channel.to_string(),
            rx: self.bus.as_ref().map(|bus| bus.subscribe()),
            tab_id: self.tab_id,
        }
    }

    /// Invoke `handler` once per message on `channel` until the guard is
    /// dropped or [`ListenerGuard::unsubscribe`] is called.
    pub fn listen<F>(&self, channel: &str, mut handler: F) -> ListenerGuard
    where
        F: FnMut(BroadcastMessage) + Send + 'static,
    {
        let mut subscription = self.subscribe(channel);
        let handle = tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                handler(message);
            }
        });
        ListenerGuard {
            handle: Some(handle),
        }
    }
}

/// Pull-style subscription to a logical channel.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    rx: Option<broadcast::Receiver<Bytes>>,
    tab_id: Uuid,
}

impl Subscription {
    /// Wait for the next message from another tab.
    ///
    /// Returns `None` once the bus is closed. Never resolves when the
    /// transport is unavailable.
    pub async fn recv(&mut self) -> Option<BroadcastMessage> {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };

        loop {
            let frame = match rx.recv().await {
                Ok(frame) => frame,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(tab = %self.tab_id, skipped, "Broadcast subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };

            let envelope: Envelope = match rmp_serde::from_slice(&frame) {
                Ok(envelope) => envelope,
                Err(e) => {
                    debug!(tab = %self.tab_id, error = %e, "Dropping undecodable broadcast frame");
                    continue;
                }
            };

            if envelope.sender == self.tab_id || envelope.channel != self.channel {
                continue;
            }
            return Some(envelope.message);
        }
    }
}

/// Handle for a callback listener started with [`BroadcastChannel::listen`].
#[derive(Debug)]
pub struct ListenerGuard {
    handle: Option<JoinHandle<()>>,
}

impl ListenerGuard {
    pub fn unsubscribe(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::LOGOUT_MODAL_SYNC;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_delivers_to_other_tabs_only() {
        let hub = BroadcastHub::new(16);
        let tab_a = hub.open(Uuid::new_v4());
        let tab_b = hub.open(Uuid::new_v4());

        let mut sub_a = tab_a.subscribe(LOGOUT_MODAL_SYNC);
        let mut sub_b = tab_b.subscribe(LOGOUT_MODAL_SYNC);

        tab_a.send(LOGOUT_MODAL_SYNC, BroadcastMessage::ExtendSession);

        assert_eq!(sub_b.recv().await, Some(BroadcastMessage::ExtendSession));

        // Tab A never sees its own message
        let own = tokio::time::timeout(Duration::from_millis(50), sub_a.recv()).await;
        assert!(own.is_err());
    }

    #[tokio::test]
    async fn test_filters_by_logical_channel() {
        let hub = BroadcastHub::new(16);
        let tab_a = hub.open(Uuid::new_v4());
        let tab_b = hub.open(Uuid::new_v4());
        let mut sub_b = tab_b.subscribe(LOGOUT_MODAL_SYNC);

        tab_a.send("other-channel", BroadcastMessage::Logout);
        tab_a.send(
            LOGOUT_MODAL_SYNC,
            BroadcastMessage::CountdownSync { countdown: 9 },
        );

        assert_eq!(
            sub_b.recv().await,
            Some(BroadcastMessage::CountdownSync { countdown: 9 })
        );
    }

    #[tokio::test]
    async fn test_send_without_subscribers_is_silent() {
        let hub = BroadcastHub::new(16);
        let tab = hub.open(Uuid::new_v4());
        tab.send(LOGOUT_MODAL_SYNC, BroadcastMessage::Logout);
    }

    #[tokio::test]
    async fn test_unavailable_transport_is_inert() {
        let tab = BroadcastChannel::unavailable(Uuid::new_v4());
        assert!(!tab.is_available());

        tab.send(LOGOUT_MODAL_SYNC, BroadcastMessage::Logout);

        let mut sub = tab.subscribe(LOGOUT_MODAL_SYNC);
        let next = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_listener_stops_after_unsubscribe() {
        let hub = BroadcastHub::new(16);
        let sender = hub.open(Uuid::new_v4());
        let receiver = hub.open(Uuid::new_v4());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let guard = receiver.listen(LOGOUT_MODAL_SYNC, move |msg| {
            sink.lock().unwrap().push(msg);
        });
        tokio::task::yield_now().await;

        sender.send(LOGOUT_MODAL_SYNC, BroadcastMessage::ExtendSession);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);

        guard.unsubscribe();
        sender.send(LOGOUT_MODAL_SYNC, BroadcastMessage::Logout);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
