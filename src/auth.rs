//! Authorization levels for tournament operations.
//!
//! Levels are strictly ordered; holding a level grants everything below
//! it. The engine only defines the lattice and the per-operation
//! requirements; enforcing them is the transport layer's job.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthLevel {
    /// Enroll, withdraw, spectate.
    Player,
    /// Run matches: start, commit, end, reset, backfill.
    Judge,
    /// Drive the tournament: start, cutoff, reshuffle, scheduling.
    Commentator,
    /// Create and edit tournaments.
    Producer,
}

impl AuthLevel {
    /// Whether a holder of `self` may perform an operation requiring
    /// `required`.
    pub fn allows(self, required: AuthLevel) -> bool {
        self >= required
    }
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Player => "player",
            Self::Judge => "judge",
            Self::Commentator => "commentator",
            Self::Producer => "producer",
        };
        write!(f, "{repr}")
    }
}
