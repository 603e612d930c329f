//! Game client seed delivery.
//!
//! Unlike spectator snapshots, seed messages have exactly one intended
//! recipient. A missing recipient is expected between games and is
//! swallowed by callers; any other failure is surfaced.

use thiserror::Error;
use tokio::sync::mpsc;

use super::messages::MatchSeedMessage;

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PublishError {
    /// No game client connected. Expected between games.
    #[error("no game client connected")]
    Disconnected,
    #[error("seed delivery failed: {0}")]
    Failed(String),
}

pub trait Publisher: Send + Sync {
    fn publish(&self, message: &MatchSeedMessage) -> Result<(), PublishError>;
}

/// Pushes seeds into an mpsc channel whose receiver is the game client
/// connection task.
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<MatchSeedMessage>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MatchSeedMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, message: &MatchSeedMessage) -> Result<(), PublishError> {
        self.sender
            .send(message.clone())
            .map_err(|_| PublishError::Disconnected)
    }
}

/// Publisher for setups without a game client attached.
pub struct NullPublisher;

impl Publisher for NullPublisher {
    fn publish(&self, _message: &MatchSeedMessage) -> Result<(), PublishError> {
        Err(PublishError::Disconnected)
    }
}
