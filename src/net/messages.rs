//! Wire shapes shared with spectator clients and the game client.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::game::entities::{Color, Player, PlayerSummary};
use crate::game::state_machine::{Match, MatchKind};
use crate::tournament::models::Tournament;

/// One seat in a match seed, as the game client expects it. Colors travel
/// as palette indexes, not names.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SeedPlayer {
    pub person_id: String,
    pub nick: String,
    pub color: u8,
}

impl From<&Player> for SeedPlayer {
    fn from(player: &Player) -> Self {
        Self {
            person_id: player.person_id.clone(),
            nick: player.nick.clone(),
            color: player.color.numeric(),
        }
    }
}

/// Seed message pushed to the game client when the next match is ready.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MatchSeedMessage {
    pub tournament_slug: String,
    pub match_index: usize,
    pub kind: MatchKind,
    /// Kill threshold that ends the match.
    pub length: u32,
    pub players: Vec<SeedPlayer>,
}

impl MatchSeedMessage {
    pub fn from_match(slug: &str, m: &Match) -> Self {
        Self {
            tournament_slug: slug.to_string(),
            match_index: m.index,
            kind: m.kind,
            length: m.length,
            players: m.players.iter().map(SeedPlayer::from).collect(),
        }
    }
}

/// Payload of a `matches` snapshot. Every snapshot kind carries the
/// tournament id so a subscriber watching several tournaments can route
/// updates.
#[derive(Debug, Serialize)]
pub struct MatchesSnapshot<'a> {
    pub tournament_id: Option<i64>,
    pub matches: &'a [Match],
}

/// Payload of a `player_summaries` snapshot: ranked by kills.
#[derive(Debug, Serialize)]
pub struct PlayerSummariesSnapshot<'a> {
    pub tournament_id: Option<i64>,
    pub player_summaries: &'a [PlayerSummary],
}

/// Payload of a `runnerups` snapshot: the pool in eligibility order.
#[derive(Debug, Serialize)]
pub struct RunnerupsSnapshot<'a> {
    pub tournament_id: Option<i64>,
    pub runnerups: &'a [PlayerSummary],
}

/// Payload of a `match_end` snapshot: everything a spectator needs to
/// redraw after a match completes, in one message.
#[derive(Debug, Serialize)]
pub struct MatchEndSnapshot<'a> {
    pub tournament_id: Option<i64>,
    pub tournament: &'a Tournament,
    pub player_summaries: &'a [PlayerSummary],
    pub runnerups: &'a [PlayerSummary],
    pub matches: &'a [Match],
}

/// Wrap a snapshot payload in the `{"type": ..., "data": ...}` envelope
/// every spectator message uses.
pub fn envelope(kind: &str, data: serde_json::Value) -> serde_json::Result<String> {
    serde_json::to_string(&json!({ "type": kind, "data": data }))
}
