//! # Brawl Bracket
//!
//! A bracket progression engine for four-player arena tournaments.
//!
//! A tournament runs in three stages. Qualifying matches are fed from a
//! runner-up pool until a cutoff instant passes; the top sixteen
//! qualifiers by kills are then dealt round-robin into four playoff
//! matches; each playoff winner earns a seat in the final, whose top three
//! take the medals.
//!
//! ## Core Modules
//!
//! - [`game`]: match entities, rule constants, and the match lifecycle
//!   state machine
//! - [`tournament`]: the tournament aggregate, ranking rules, bracket
//!   scheduler, and the concurrency-safe manager
//! - [`net`]: spectator snapshot fan-out and game client seed delivery
//! - [`db`]: the store trait with Postgres and in-memory implementations
//! - [`auth`]: the authorization level lattice
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use brawl_bracket::{
//!     db::MemoryStore,
//!     net::{ChannelBroadcaster, NullPublisher, SnapshotCoordinator},
//!     tournament::TournamentManager,
//! };
//!
//! # async fn run() -> Result<(), brawl_bracket::tournament::TournamentError> {
//! let manager = TournamentManager::new(
//!     Arc::new(MemoryStore::new()),
//!     SnapshotCoordinator::new(Arc::new(ChannelBroadcaster::new(64))),
//!     Arc::new(NullPublisher),
//! );
//! manager.create_tournament("Winter Brawl", "winter-brawl", None).await?;
//! # Ok(())
//! # }
//! ```

/// Authorization levels for tournament operations.
pub mod auth;
pub use auth::AuthLevel;

/// Persistence: store trait, Postgres and in-memory implementations.
pub mod db;

/// Match-level domain: entities, constants, and the lifecycle state
/// machine.
pub mod game;
pub use game::{
    constants::{self, FINAL_LENGTH, MIN_PLAYERS, PLAYERS_PER_MATCH, QUALIFYING_LENGTH},
    entities, state_machine,
};

/// Outbound messaging: spectator snapshots and game client seeds.
pub mod net;

/// Tournament aggregate, scheduler, and manager.
pub mod tournament;
pub use tournament::{Tournament, TournamentError, TournamentManager, TournamentResult};
