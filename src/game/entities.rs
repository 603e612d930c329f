use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

use super::constants;

/// Archer colors available for seating. No two players in the same match may
/// hold the same color.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    Green,
    Blue,
    Pink,
    Orange,
    White,
    Yellow,
    Cyan,
    Purple,
}

impl Color {
    /// Every color, in the order the game client numbers them.
    pub const ALL: [Color; 8] = [
        Color::Green,
        Color::Blue,
        Color::Pink,
        Color::Orange,
        Color::White,
        Color::Yellow,
        Color::Cyan,
        Color::Purple,
    ];

    /// Numeric color index used by the game client seed message.
    pub fn numeric(self) -> u8 {
        Self::ALL.iter().position(|c| *c == self).unwrap_or(0) as u8
    }

    /// Pick a color for a new seat: the preferred one if it is free,
    /// otherwise the first free color in the palette. With at most four
    /// seats and eight colors there is always a free one.
    pub fn pick_free(preferred: Color, taken: &HashSet<Color>) -> Color {
        if !taken.contains(&preferred) {
            return preferred;
        }
        Self::ALL
            .into_iter()
            .find(|c| !taken.contains(c))
            .unwrap_or(preferred)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Pink => "pink",
            Self::Orange => "orange",
            Self::White => "white",
            Self::Yellow => "yellow",
            Self::Cyan => "cyan",
            Self::Purple => "purple",
        };
        write!(f, "{repr}")
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::Green
    }
}

/// A registered person, independent of any tournament.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Person {
    pub id: String,
    pub name: String,
    pub nick: String,
    pub preferred_color: Color,
    pub avatar_url: String,
}

impl Person {
    pub fn new(id: &str, name: &str, nick: &str, preferred_color: Color) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            nick: nick.to_string(),
            preferred_color,
            avatar_url: String::new(),
        }
    }

    /// Normalize free-form display fields before enrollment.
    pub fn correct(&mut self) {
        self.name = self.name.trim().to_string();
        self.nick = self.nick.trim().to_string();
        if self.nick.is_empty() {
            self.nick = self.name.clone();
        }
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.nick, self.id)
    }
}

/// A player seated in one match, with per-match running counts.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Player {
    pub person_id: String,
    pub nick: String,
    pub color: Color,
    /// Running kill count for this match.
    pub kills: i64,
    /// Running self-elimination count for this match.
    pub shots: u32,
}

impl Player {
    pub fn new(person_id: &str, nick: &str, color: Color) -> Self {
        Self {
            person_id: person_id.to_string(),
            nick: nick.to_string(),
            color,
            kills: 0,
            shots: 0,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}] {}k", self.nick, self.color, self.kills)
    }
}

/// Tournament-scoped participation record for one person.
///
/// Aggregate counts are recomputed by replaying every match the person
/// appears in; they are never mutated incrementally from the outside.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PlayerSummary {
    pub person_id: String,
    pub name: String,
    pub nick: String,
    pub preferred_color: Color,
    pub avatar_url: String,
    pub kills: i64,
    pub shots: u32,
    pub matches: u32,
    pub score: i64,
}

impl PlayerSummary {
    pub fn new(person: &Person) -> Self {
        Self {
            person_id: person.id.clone(),
            name: person.name.clone(),
            nick: person.nick.clone(),
            preferred_color: person.preferred_color,
            avatar_url: person.avatar_url.clone(),
            kills: 0,
            shots: 0,
            matches: 0,
            score: 0,
        }
    }

    /// Zero the aggregate counts ahead of a replay.
    pub fn reset(&mut self) {
        self.kills = 0;
        self.shots = 0;
        self.matches = 0;
        self.score = 0;
    }

    /// Fold one match appearance into the aggregate.
    pub fn absorb(&mut self, kills: i64, shots: u32, counts_as_match: bool) {
        self.kills += kills;
        self.shots += shots;
        if counts_as_match {
            self.matches += 1;
        }
        self.score = constants::KILL_SCORE * self.kills - i64::from(self.shots);
    }
}

impl fmt::Display for PlayerSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}: {}k/{}s over {} matches",
            self.nick, self.kills, self.shots, self.matches
        )
    }
}

/// One player's share of a committed round.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CommitPlayer {
    /// Kills scored this round.
    pub ups: i64,
    /// Deaths suffered this round. Recorded for the audit trail only.
    pub downs: i64,
    /// Whether the player eliminated themselves.
    pub shot: bool,
    pub reason: String,
}

/// One recorded round of play. The per-seat deltas are positional: entry
/// `i` belongs to the player in seat `i`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MatchCommit {
    pub state: Vec<CommitPlayer>,
    pub committed_at: DateTime<Utc>,
}

impl MatchCommit {
    pub fn new(state: Vec<CommitPlayer>) -> Self {
        Self {
            state,
            committed_at: Utc::now(),
        }
    }
}
