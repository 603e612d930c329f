//! Outbound messaging: spectator snapshots and game client seeds.

pub mod broadcast;
pub mod messages;
pub mod publisher;

pub use broadcast::{BroadcastError, Broadcaster, ChannelBroadcaster, SnapshotCoordinator};
pub use messages::{
    MatchEndSnapshot, MatchSeedMessage, MatchesSnapshot, PlayerSummariesSnapshot,
    RunnerupsSnapshot, SeedPlayer,
};
pub use publisher::{ChannelPublisher, NullPublisher, PublishError, Publisher};
