//! Match lifecycle state machine.
//!
//! A match moves `unscheduled -> scheduled -> started -> ended`, with `reset`
//! as a transition from `started` back to `started` that discards commits
//! but keeps seats and schedule. Every transition is guarded; a failed
//! transition leaves the match untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt};

use super::{
    constants,
    entities::{Color, MatchCommit, Player},
};

/// Errors from match state transitions.
#[derive(Clone, Debug, Deserialize, Eq, thiserror::Error, PartialEq, Serialize)]
pub enum MatchError {
    #[error("all {} seats are taken", constants::PLAYERS_PER_MATCH)]
    SlotFull,
    #[error("color {0} is already seated")]
    ColorConflict(Color),
    #[error("match is already scheduled to start")]
    AlreadyStarted,
    #[error("match has not started")]
    NotStarted,
    #[error("match has already ended")]
    AlreadyEnded,
    #[error("match is not running")]
    NotRunning,
    #[error("commit has {got} entries for {expected} seats")]
    CommitMismatch { expected: usize, got: usize },
    #[error("no player has reached the end score")]
    NotEndable,
    #[error("nothing committed yet")]
    NoCommits,
}

/// The stage a match belongs to. The two "semi" matches are a positional
/// view over the last two playoff matches, not a kind of their own.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Qualifying,
    Playoff,
    Final,
}

impl MatchKind {
    /// Kills needed before a match of this kind may end.
    pub fn length(self) -> u32 {
        match self {
            Self::Qualifying | Self::Playoff => constants::QUALIFYING_LENGTH,
            Self::Final => constants::FINAL_LENGTH,
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Qualifying => "qualifying",
            Self::Playoff => "playoff",
            Self::Final => "final",
        };
        write!(f, "{repr}")
    }
}

/// One bracket match: seated players, round commits, lifecycle timestamps.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Match {
    /// Ordinal position in the tournament's match sequence.
    pub index: usize,
    pub kind: MatchKind,
    /// Kills required before the match may end.
    pub length: u32,
    pub players: Vec<Player>,
    pub scheduled: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub commits: Vec<MatchCommit>,
    /// Colors currently seated. Not persisted; rebuilt from `players`.
    #[serde(skip)]
    present_colors: HashSet<Color>,
}

impl Match {
    pub fn new(index: usize, kind: MatchKind) -> Self {
        Self {
            index,
            kind,
            length: kind.length(),
            players: Vec::new(),
            scheduled: None,
            started: None,
            ended: None,
            commits: Vec::new(),
            present_colors: HashSet::new(),
        }
    }

    /// Seat a player. The caller must have resolved color collisions
    /// already; the match never reassigns colors on its own.
    pub fn add_player(&mut self, player: Player) -> Result<(), MatchError> {
        if self.players.len() >= constants::PLAYERS_PER_MATCH {
            return Err(MatchError::SlotFull);
        }
        if self.present_colors.contains(&player.color) {
            return Err(MatchError::ColorConflict(player.color));
        }
        self.present_colors.insert(player.color);
        self.players.push(player);
        Ok(())
    }

    /// Clear every seat. Only meaningful for not-yet-started matches
    /// during a reshuffle.
    pub fn clear_players(&mut self) {
        self.players.clear();
        self.present_colors.clear();
    }

    /// Rebuild the seated-color set after deserialization. The set is a
    /// derived view over `players` and is not stored.
    pub fn rebuild_colors(&mut self) {
        self.present_colors = self.players.iter().map(|p| p.color).collect();
    }

    pub fn set_time(&mut self, at: DateTime<Utc>) -> Result<(), MatchError> {
        if self.is_started() {
            return Err(MatchError::AlreadyStarted);
        }
        self.scheduled = Some(at);
        Ok(())
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), MatchError> {
        if self.is_started() {
            return Err(MatchError::AlreadyStarted);
        }
        self.started = Some(now);
        Ok(())
    }

    /// Append one round of play and fold the per-seat deltas into the
    /// running counts. Deltas are positional and must cover every seat
    /// exactly; their values are trusted as-is, plausibility is the
    /// judge's responsibility.
    pub fn commit(&mut self, commit: MatchCommit) -> Result<(), MatchError> {
        if !self.is_running() {
            return Err(MatchError::NotRunning);
        }
        if commit.state.len() != self.players.len() {
            return Err(MatchError::CommitMismatch {
                expected: self.players.len(),
                got: commit.state.len(),
            });
        }
        for (player, delta) in self.players.iter_mut().zip(&commit.state) {
            player.kills += delta.ups;
            if delta.shot {
                player.shots += 1;
            }
        }
        self.commits.push(commit);
        Ok(())
    }

    pub fn end(&mut self, now: DateTime<Utc>) -> Result<(), MatchError> {
        if !self.is_started() {
            return Err(MatchError::NotStarted);
        }
        if self.is_ended() {
            return Err(MatchError::AlreadyEnded);
        }
        if !self.can_end() {
            return Err(MatchError::NotEndable);
        }
        self.ended = Some(now);
        Ok(())
    }

    /// Discard all commits and zero the running counts, keeping seats and
    /// schedule. Valid only for a started, not-ended match with at least
    /// one commit.
    pub fn reset(&mut self) -> Result<(), MatchError> {
        if !self.is_started() {
            return Err(MatchError::NotStarted);
        }
        if self.is_ended() {
            return Err(MatchError::AlreadyEnded);
        }
        if self.commits.is_empty() {
            return Err(MatchError::NoCommits);
        }
        self.commits.clear();
        for player in &mut self.players {
            player.kills = 0;
            player.shots = 0;
        }
        Ok(())
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.is_some()
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    pub fn is_ended(&self) -> bool {
        self.ended.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.is_started() && !self.is_ended()
    }

    pub fn can_start(&self) -> bool {
        !self.is_started()
    }

    /// A match may end once any seated player has reached the end score.
    pub fn can_end(&self) -> bool {
        self.players
            .iter()
            .any(|p| p.kills >= i64::from(self.length))
    }

    pub fn can_reset(&self) -> bool {
        self.is_running() && !self.commits.is_empty()
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} match {}", self.kind, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::CommitPlayer;

    fn seated_match(kind: MatchKind) -> Match {
        let mut m = Match::new(0, kind);
        for (i, color) in Color::ALL.into_iter().take(4).enumerate() {
            m.add_player(Player::new(&format!("p{i}"), &format!("nick{i}"), color))
                .unwrap();
        }
        m
    }

    fn round(ups: [i64; 4]) -> MatchCommit {
        MatchCommit::new(
            ups.into_iter()
                .map(|u| CommitPlayer {
                    ups: u,
                    downs: 0,
                    shot: false,
                    reason: "test".into(),
                })
                .collect(),
        )
    }

    #[test]
    fn test_add_player_slot_full() {
        let mut m = seated_match(MatchKind::Qualifying);
        let err = m
            .add_player(Player::new("p5", "nick5", Color::Purple))
            .unwrap_err();
        assert_eq!(err, MatchError::SlotFull);
        assert_eq!(m.players.len(), 4);
    }

    #[test]
    fn test_add_player_color_conflict() {
        let mut m = Match::new(0, MatchKind::Qualifying);
        m.add_player(Player::new("p1", "a", Color::Green)).unwrap();
        let err = m
            .add_player(Player::new("p2", "b", Color::Green))
            .unwrap_err();
        assert_eq!(err, MatchError::ColorConflict(Color::Green));
        assert_eq!(m.players.len(), 1);
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut m = seated_match(MatchKind::Qualifying);
        m.start(Utc::now()).unwrap();
        assert_eq!(m.start(Utc::now()).unwrap_err(), MatchError::AlreadyStarted);
    }

    #[test]
    fn test_set_time_rejected_once_started() {
        let mut m = seated_match(MatchKind::Qualifying);
        m.set_time(Utc::now()).unwrap();
        assert!(m.is_scheduled());
        m.start(Utc::now()).unwrap();
        assert_eq!(
            m.set_time(Utc::now()).unwrap_err(),
            MatchError::AlreadyStarted
        );
    }

    #[test]
    fn test_commit_outside_running_window() {
        let mut m = seated_match(MatchKind::Qualifying);
        assert_eq!(m.commit(round([1, 0, 0, 0])).unwrap_err(), MatchError::NotRunning);

        m.start(Utc::now()).unwrap();
        m.commit(round([10, 0, 0, 0])).unwrap();
        m.end(Utc::now()).unwrap();
        assert_eq!(m.commit(round([1, 0, 0, 0])).unwrap_err(), MatchError::NotRunning);
    }

    #[test]
    fn test_commit_must_cover_every_seat() {
        let mut m = seated_match(MatchKind::Qualifying);
        m.start(Utc::now()).unwrap();

        let mut short = round([5, 0, 0, 0]);
        short.state.truncate(3);
        assert_eq!(
            m.commit(short).unwrap_err(),
            MatchError::CommitMismatch {
                expected: 4,
                got: 3
            }
        );

        let mut long = round([5, 0, 0, 0]);
        long.state.push(CommitPlayer {
            ups: 9,
            downs: 0,
            shot: false,
            reason: "test".into(),
        });
        assert_eq!(
            m.commit(long).unwrap_err(),
            MatchError::CommitMismatch {
                expected: 4,
                got: 5
            }
        );

        // A rejected commit folds nothing in.
        assert!(m.commits.is_empty());
        assert!(m.players.iter().all(|p| p.kills == 0));
    }

    #[test]
    fn test_can_end_iff_threshold_reached() {
        let mut m = seated_match(MatchKind::Qualifying);
        m.start(Utc::now()).unwrap();
        m.commit(round([9, 3, 3, 3])).unwrap();
        assert!(!m.can_end());
        assert_eq!(m.end(Utc::now()).unwrap_err(), MatchError::NotEndable);

        m.commit(round([1, 0, 0, 0])).unwrap();
        assert!(m.can_end());
        m.end(Utc::now()).unwrap();
        assert!(m.is_ended());
        assert_eq!(m.end(Utc::now()).unwrap_err(), MatchError::AlreadyEnded);
    }

    #[test]
    fn test_final_threshold_is_twenty() {
        let mut m = seated_match(MatchKind::Final);
        m.start(Utc::now()).unwrap();
        m.commit(round([10, 0, 0, 0])).unwrap();
        assert!(!m.can_end());
        m.commit(round([10, 0, 0, 0])).unwrap();
        assert!(m.can_end());
    }

    #[test]
    fn test_end_before_start_rejected() {
        let mut m = seated_match(MatchKind::Qualifying);
        assert_eq!(m.end(Utc::now()).unwrap_err(), MatchError::NotStarted);
    }

    #[test]
    fn test_reset_requires_commits() {
        let mut m = seated_match(MatchKind::Qualifying);
        assert_eq!(m.reset().unwrap_err(), MatchError::NotStarted);

        m.start(Utc::now()).unwrap();
        assert_eq!(m.reset().unwrap_err(), MatchError::NoCommits);
        assert!(!m.can_reset());
    }

    #[test]
    fn test_reset_clears_counts_keeps_seats_and_schedule() {
        let mut m = seated_match(MatchKind::Qualifying);
        m.set_time(Utc::now()).unwrap();
        m.start(Utc::now()).unwrap();
        m.commit(round([3, 2, 1, 0])).unwrap();
        assert!(m.can_reset());

        m.reset().unwrap();
        assert!(m.commits.is_empty());
        assert_eq!(m.players.len(), 4);
        assert!(m.players.iter().all(|p| p.kills == 0 && p.shots == 0));
        assert!(m.is_started());
        assert!(m.is_scheduled());
        assert!(!m.is_ended());
    }

    #[test]
    fn test_shot_delta_increments_shots() {
        let mut m = seated_match(MatchKind::Qualifying);
        m.start(Utc::now()).unwrap();
        let mut commit = round([0, 0, 0, 0]);
        commit.state[2].shot = true;
        m.commit(commit).unwrap();
        assert_eq!(m.players[2].shots, 1);
    }

    #[test]
    fn test_rebuild_colors_after_deserialization() {
        let mut m = seated_match(MatchKind::Qualifying);
        let json = serde_json::to_string(&m).unwrap();
        let mut loaded: Match = serde_json::from_str(&json).unwrap();

        // The color set is skipped in serde; before the rebuild a duplicate
        // color would slip through.
        loaded.rebuild_colors();
        let err = loaded
            .add_player(Player::new("dup", "dup", loaded.players[0].color))
            .unwrap_err();
        assert!(matches!(err, MatchError::ColorConflict(_)));

        m.rebuild_colors();
        assert_eq!(m.players, loaded.players);
    }
}
