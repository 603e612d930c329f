//! Spectator fan-out.
//!
//! Snapshots are fire-and-forget: the payload is serialized while the
//! caller still holds the tournament lock, then handed to a spawned task
//! so slow spectators never stall a state transition. Delivery failures
//! are logged and dropped, never propagated into tournament operations.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, warn};
use thiserror::Error;
use tokio::sync::broadcast;

use super::messages;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BroadcastError {
    #[error("broadcast channel is closed")]
    Closed,
}

/// Sink for spectator snapshots. Implementations must be cheap to call;
/// the coordinator invokes them from spawned tasks.
pub trait Broadcaster: Send + Sync {
    /// Deliver one serialized envelope. Returns the number of receivers
    /// it reached.
    fn broadcast(&self, message: String) -> Result<usize, BroadcastError>;
}

/// Fan-out over a tokio broadcast channel. Zero subscribers is a normal
/// condition, not an error.
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<String>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn broadcast(&self, message: String) -> Result<usize, BroadcastError> {
        // send fails only when no receiver exists, which just means
        // nobody is watching right now.
        Ok(self.sender.send(message).unwrap_or(0))
    }
}

/// Restores the previous suppression state when dropped, so bulk
/// operations cannot leave snapshots muted on an early return.
pub struct SuppressGuard {
    flag: Arc<AtomicBool>,
    previous: bool,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

/// Serializes snapshots and hands them to the broadcaster, with a
/// suppression switch for bulk operations that would otherwise emit a
/// storm of intermediate states.
#[derive(Clone)]
pub struct SnapshotCoordinator {
    broadcaster: Arc<dyn Broadcaster>,
    suppressed: Arc<AtomicBool>,
}

impl SnapshotCoordinator {
    pub fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            broadcaster,
            suppressed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::SeqCst)
    }

    /// Mute snapshots until the guard drops.
    pub fn suppress(&self) -> SuppressGuard {
        let previous = self.suppressed.swap(true, Ordering::SeqCst);
        SuppressGuard {
            flag: Arc::clone(&self.suppressed),
            previous,
        }
    }

    /// Serialize `data` under the given snapshot kind and deliver it in
    /// the background. Serialization happens here, on the caller's
    /// consistent view of the state.
    pub fn send_snapshot(&self, kind: &str, data: serde_json::Value) {
        if self.is_suppressed() {
            debug!("snapshot {kind} suppressed");
            return;
        }
        let payload = match messages::envelope(kind, data) {
            Ok(payload) => payload,
            Err(err) => {
                warn!("failed to serialize {kind} snapshot: {err}");
                return;
            }
        };
        let broadcaster = Arc::clone(&self.broadcaster);
        let kind = kind.to_string();
        tokio::spawn(async move {
            if let Err(err) = broadcaster.broadcast(payload) {
                warn!("failed to deliver {kind} snapshot: {err}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_broadcast_without_receivers_is_ok() {
        let b = ChannelBroadcaster::new(4);
        assert_eq!(b.broadcast("hello".into()), Ok(0));
    }

    #[test]
    fn test_channel_broadcast_reaches_subscribers() {
        let b = ChannelBroadcaster::new(4);
        let mut rx = b.subscribe();
        assert_eq!(b.broadcast("hello".into()), Ok(1));
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn test_suppress_guard_restores_on_drop() {
        let coordinator = SnapshotCoordinator::new(Arc::new(ChannelBroadcaster::new(4)));
        assert!(!coordinator.is_suppressed());
        {
            let _guard = coordinator.suppress();
            assert!(coordinator.is_suppressed());

            // Nested guards restore to the suppressed state, not to off.
            {
                let _inner = coordinator.suppress();
                assert!(coordinator.is_suppressed());
            }
            assert!(coordinator.is_suppressed());
        }
        assert!(!coordinator.is_suppressed());
    }

    #[tokio::test]
    async fn test_suppressed_snapshot_is_not_delivered() {
        let broadcaster = Arc::new(ChannelBroadcaster::new(4));
        let mut rx = broadcaster.subscribe();
        let coordinator = SnapshotCoordinator::new(broadcaster);

        {
            let _guard = coordinator.suppress();
            coordinator.send_snapshot("tournament", serde_json::json!({"muted": true}));
        }
        coordinator.send_snapshot("tournament", serde_json::json!({"muted": false}));

        tokio::task::yield_now().await;
        let raw = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["data"]["muted"], false);
        assert!(rx.try_recv().is_err());
    }
}
