//! Tournament-wide rule constants.

/// Number of seats in a single match.
pub const PLAYERS_PER_MATCH: usize = 4;

/// Minimum roster size required to start a tournament.
pub const MIN_PLAYERS: usize = 12;

/// Kills needed to end a qualifying or playoff match.
pub const QUALIFYING_LENGTH: u32 = 10;

/// Kills needed to end the final.
pub const FINAL_LENGTH: u32 = 20;

/// Number of playoff matches created when the endgame is scheduled.
pub const PLAYOFF_MATCHES: usize = 4;

/// Exact number of qualifiers admitted into the playoffs.
pub const PLAYOFF_PLAYERS: usize = 16;

/// Total seats across the two semi matches.
pub const SEMI_SEATS: usize = 8;

/// Points awarded per kill when computing a player's score.
pub const KILL_SCORE: i64 = 3;
