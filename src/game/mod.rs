//! Match-level domain: entities, rule constants, and the match lifecycle
//! state machine.

pub mod constants;
pub mod entities;
pub mod state_machine;

pub use entities::{Color, CommitPlayer, MatchCommit, Person, Player, PlayerSummary};
pub use state_machine::{Match, MatchError, MatchKind};
