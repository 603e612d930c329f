//! Tournament aggregate: roster, matches, runner-up pool, audit log.
//!
//! The aggregate owns all of its state; matches reference players only by
//! person id, and every cross-link (seated colors, summary lookups) is a
//! derived view rebuilt on load rather than a stored pointer.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::game::{
    constants,
    entities::{Color, Player, PlayerSummary},
    state_machine::{Match, MatchKind},
};
use crate::tournament::manager::{TournamentError, TournamentResult};
use crate::tournament::ranking;

/// Immutable audit record. Appended on every notable mutation, never
/// changed or removed.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Event {
    pub kind: String,
    /// Human message template, e.g. `"{nick} has joined"`.
    pub message: String,
    pub metadata: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// The main container of data for a single tournament.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Tournament {
    /// Store-assigned identity. `None` until the store has seen it.
    pub id: Option<i64>,
    pub name: String,
    /// URL slug, unique across tournaments.
    pub slug: String,
    /// Enrolled players in join order.
    pub players: Vec<PlayerSummary>,
    /// Person ids of players bumped out of active seats, in eligibility
    /// order (see [`ranking::sort_by_runnerup`]).
    pub runnerups: Vec<String>,
    /// Top three of the final, populated by `award_medals`.
    pub winners: Vec<Player>,
    /// Append-only; index is the chronological bracket position.
    pub matches: Vec<Match>,
    pub events: Vec<Event>,
    pub opened: Option<DateTime<Utc>>,
    pub scheduled: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub qualifying_end: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
}

impl Tournament {
    pub fn new(name: &str, slug: &str, scheduled: Option<DateTime<Utc>>) -> Self {
        let mut t = Self {
            id: None,
            name: name.to_string(),
            slug: slug.to_string(),
            players: Vec::new(),
            runnerups: Vec::new(),
            winners: Vec::new(),
            matches: Vec::new(),
            events: Vec::new(),
            opened: Some(Utc::now()),
            scheduled,
            started: None,
            qualifying_end: None,
            ended: None,
        };
        t.log_event(
            "new_tournament",
            "{name} ({slug}) created",
            json!({ "name": name, "slug": slug }),
        );
        t
    }

    pub fn log_event(&mut self, kind: &str, message: &str, metadata: serde_json::Value) {
        self.events.push(Event {
            kind: kind.to_string(),
            message: message.to_string(),
            metadata,
            at: Utc::now(),
        });
    }

    pub fn is_open(&self) -> bool {
        self.opened.is_some()
    }

    pub fn is_joinable(&self) -> bool {
        self.is_open() && self.started.is_none()
    }

    pub fn is_startable(&self) -> bool {
        self.is_joinable() && self.players.len() >= constants::MIN_PLAYERS
    }

    pub fn is_running(&self) -> bool {
        self.started.is_some() && self.ended.is_none()
    }

    pub fn player(&self, person_id: &str) -> Option<&PlayerSummary> {
        self.players.iter().find(|p| p.person_id == person_id)
    }

    /// Enroll a player. Duplicate enrollment is keyed on the display nick,
    /// not the person id, a long-standing quirk kept for compatibility.
    /// Joining a started tournament lands the player in the runner-up pool.
    pub fn add_player(&mut self, summary: PlayerSummary) -> TournamentResult<()> {
        if self.players.iter().any(|p| p.nick == summary.nick) {
            return Err(TournamentError::DuplicateNick(summary.nick));
        }

        let meta = json!({ "nick": summary.nick, "person": summary });
        if self.started.is_some() {
            self.runnerups.push(summary.person_id.clone());
        }
        self.players.push(summary);
        self.log_event("player_join", "{nick} has joined", meta);
        Ok(())
    }

    /// Withdraw a player. Only possible before the tournament starts.
    pub fn remove_player(&mut self, person_id: &str) -> TournamentResult<()> {
        if self.started.is_some() {
            return Err(TournamentError::AlreadyRunning);
        }
        let index = self
            .players
            .iter()
            .position(|p| p.person_id == person_id)
            .ok_or_else(|| TournamentError::NotEnrolled(person_id.to_string()))?;
        let removed = self.players.remove(index);
        self.log_event(
            "player_leave",
            "{nick} has left",
            json!({ "nick": removed.nick, "person": removed }),
        );
        Ok(())
    }

    /// Generate the opening bracket: two qualifying matches seeded by
    /// alternating the first eight roster entries (0,2,4,6 and 1,3,5,7);
    /// everyone else enters the runner-up pool. The first match is
    /// scheduled for immediate play.
    pub fn start(&mut self, now: DateTime<Utc>) -> TournamentResult<()> {
        let roster = self.players.len();
        if roster < constants::MIN_PLAYERS {
            return Err(TournamentError::InsufficientPlayers {
                needed: constants::MIN_PLAYERS,
                current: roster,
            });
        }
        if self.is_running() {
            return Err(TournamentError::AlreadyRunning);
        }

        self.matches.push(Match::new(0, MatchKind::Qualifying));
        self.matches.push(Match::new(1, MatchKind::Qualifying));

        let first_eight: Vec<String> = self
            .players
            .iter()
            .take(2 * constants::PLAYERS_PER_MATCH)
            .map(|p| p.person_id.clone())
            .collect();
        for (i, person_id) in first_eight.iter().enumerate() {
            self.seat_player(i % 2, person_id)?;
        }

        self.runnerups = self
            .players
            .iter()
            .skip(2 * constants::PLAYERS_PER_MATCH)
            .map(|p| p.person_id.clone())
            .collect();

        self.started = Some(now);
        self.matches[0].set_time(now)?;
        self.log_event("start", "Tournament started", json!({}));
        Ok(())
    }

    /// Seat an enrolled player into a match, resolving color collisions
    /// before seating (the match state machine itself never reassigns
    /// colors).
    pub fn seat_player(&mut self, match_index: usize, person_id: &str) -> TournamentResult<()> {
        let summary = self
            .player(person_id)
            .ok_or_else(|| TournamentError::NotEnrolled(person_id.to_string()))?
            .clone();
        let m = self
            .matches
            .get_mut(match_index)
            .ok_or(TournamentError::NoSuchMatch(match_index))?;
        let taken = m.players.iter().map(|p| p.color).collect();
        let color = Color::pick_free(summary.preferred_color, &taken);
        m.add_player(Player::new(&summary.person_id, &summary.nick, color))?;
        Ok(())
    }

    /// Mark the instant after which no new qualifying matches are created.
    pub fn end_qualifying(&mut self, at: DateTime<Utc>) {
        self.qualifying_end = Some(at);
        self.log_event(
            "qualifying_end",
            "Qualifying cutoff set",
            json!({ "at": at }),
        );
    }

    /// Index of the earliest match that has not ended.
    pub fn next_match_index(&self) -> TournamentResult<usize> {
        if !self.is_running() {
            return Err(TournamentError::NotRunning);
        }
        self.matches
            .iter()
            .position(|m| !m.is_ended())
            .ok_or(TournamentError::NoPendingMatch)
    }

    /// The two semi slots are purely positional: the last two playoff
    /// matches before the final. They exist only once the endgame has been
    /// scheduled.
    pub fn semi_indexes(&self) -> Option<(usize, usize)> {
        let len = self.matches.len();
        if len < 3 || self.matches.last().map(|m| m.kind) != Some(MatchKind::Final) {
            return None;
        }
        Some((len - 3, len - 2))
    }

    pub fn final_index(&self) -> Option<usize> {
        match self.matches.last() {
            Some(m) if m.kind == MatchKind::Final => Some(self.matches.len() - 1),
            _ => None,
        }
    }

    /// Seats still missing from the two semi matches.
    pub fn backfills_needed(&self) -> usize {
        match self.semi_indexes() {
            Some((first, second)) => {
                let seated =
                    self.matches[first].players.len() + self.matches[second].players.len();
                constants::SEMI_SEATS.saturating_sub(seated)
            }
            None => 0,
        }
    }

    /// Record the final's top three as tournament winners and close the
    /// tournament. Valid only on the final match.
    pub fn award_medals(&mut self, match_index: usize, now: DateTime<Utc>) -> TournamentResult<()> {
        let m = self
            .matches
            .get(match_index)
            .ok_or(TournamentError::NoSuchMatch(match_index))?;
        if m.kind != MatchKind::Final {
            return Err(TournamentError::NotFinal);
        }
        let ranked = ranking::sort_by_kills(&m.players);
        self.winners = ranked.into_iter().take(3).collect();
        self.ended = Some(now);
        self.log_event(
            "tournament_end",
            "Tournament finished",
            json!({ "winners": self.winners }),
        );
        Ok(())
    }

    /// Re-randomize the bracket. Permitted only while the tournament is
    /// running and its first match has not started: clears every
    /// not-yet-started qualifying match, shuffles the roster uniformly, and
    /// re-seeds from scratch.
    pub fn reshuffle(&mut self) -> TournamentResult<()> {
        if !self.is_running() || self.matches.first().is_none_or(|m| m.is_started()) {
            return Err(TournamentError::CannotReshuffle);
        }

        let targets: Vec<usize> = self
            .matches
            .iter()
            .enumerate()
            .filter(|(_, m)| m.kind == MatchKind::Qualifying && !m.is_started())
            .map(|(i, _)| i)
            .collect();
        for &i in &targets {
            self.matches[i].clear_players();
        }

        self.players.shuffle(&mut rand::rng());

        let capacity = targets.len() * constants::PLAYERS_PER_MATCH;
        let ids: Vec<String> = self.players.iter().map(|p| p.person_id.clone()).collect();
        self.runnerups.clear();
        for (i, person_id) in ids.iter().enumerate() {
            if i < capacity {
                self.seat_player(targets[i / constants::PLAYERS_PER_MATCH], person_id)?;
            } else {
                self.runnerups.push(person_id.clone());
            }
        }

        self.log_event("reshuffle", "Players reshuffled", json!({}));
        Ok(())
    }

    /// Recompute every participation record by replaying all matches.
    pub fn update_player_stats(&mut self) {
        for p in &mut self.players {
            p.reset();
        }
        for m in &self.matches {
            let counts = m.is_ended();
            for seat in &m.players {
                if let Some(summary) = self
                    .players
                    .iter_mut()
                    .find(|p| p.person_id == seat.person_id)
                {
                    summary.absorb(seat.kills, seat.shots, counts);
                }
            }
        }
    }

    /// Re-sort the runner-up pool by eligibility.
    pub fn update_runnerups(&mut self) {
        let pool = self.runnerup_summaries();
        self.runnerups = pool.into_iter().map(|s| s.person_id).collect();
    }

    pub fn remove_from_runnerups(&mut self, person_id: &str) {
        self.runnerups.retain(|id| id != person_id);
    }

    /// Fresh participation records, replayed without mutating the roster.
    pub fn replayed_summaries(&self) -> Vec<PlayerSummary> {
        let mut copy = self.clone();
        copy.update_player_stats();
        copy.players
    }

    /// The runner-up pool resolved to summaries, in eligibility order.
    pub fn runnerup_summaries(&self) -> Vec<PlayerSummary> {
        let summaries = self.replayed_summaries();
        let pool: Vec<PlayerSummary> = self
            .runnerups
            .iter()
            .filter_map(|id| summaries.iter().find(|s| &s.person_id == id).cloned())
            .collect();
        ranking::sort_by_runnerup(&pool)
    }

    /// Top qualifiers by cumulative kills, capped at the playoff pool size.
    pub fn playoff_candidates(&self) -> Vec<PlayerSummary> {
        let mut ranked = ranking::sort_summaries_by_kills(&self.replayed_summaries());
        ranked.truncate(constants::PLAYOFF_PLAYERS);
        ranked
    }

    /// Whether every qualifying match has concluded.
    pub fn qualifying_done(&self) -> bool {
        let mut any = false;
        for m in &self.matches {
            if m.kind == MatchKind::Qualifying {
                any = true;
                if !m.is_ended() {
                    return false;
                }
            }
        }
        any
    }

    /// Rebuild derived cross-links (seated-color sets) after the aggregate
    /// was reconstructed from storage.
    pub fn rebuild_links(&mut self) {
        for m in &mut self.matches {
            m.rebuild_colors();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Person;

    fn enrolled(n: usize) -> Tournament {
        let mut t = Tournament::new("Test Cup", "test-cup", None);
        for i in 0..n {
            let person = Person::new(
                &format!("p{i}"),
                &format!("Player {i}"),
                &format!("nick{i}"),
                Color::ALL[i % Color::ALL.len()],
            );
            t.add_player(PlayerSummary::new(&person)).unwrap();
        }
        t
    }

    #[test]
    fn test_start_requires_twelve_players() {
        let mut t = enrolled(11);
        let err = t.start(Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            TournamentError::InsufficientPlayers {
                needed: 12,
                current: 11
            }
        ));
        assert!(t.matches.is_empty());
    }

    #[test]
    fn test_start_seeds_alternating() {
        let mut t = enrolled(12);
        t.start(Utc::now()).unwrap();

        assert_eq!(t.matches.len(), 2);
        assert!(t.matches[0].is_scheduled());
        assert!(t.is_running());

        let m0: Vec<&str> = t.matches[0]
            .players
            .iter()
            .map(|p| p.person_id.as_str())
            .collect();
        let m1: Vec<&str> = t.matches[1]
            .players
            .iter()
            .map(|p| p.person_id.as_str())
            .collect();
        assert_eq!(m0, vec!["p0", "p2", "p4", "p6"]);
        assert_eq!(m1, vec!["p1", "p3", "p5", "p7"]);

        // Everyone not seated starts out in the runner-up pool.
        assert_eq!(t.runnerups, vec!["p8", "p9", "p10", "p11"]);
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut t = enrolled(12);
        t.start(Utc::now()).unwrap();
        assert!(matches!(
            t.start(Utc::now()).unwrap_err(),
            TournamentError::AlreadyRunning
        ));
    }

    #[test]
    fn test_duplicate_nick_rejected() {
        // Dedup keys on the display nick, not the person id: a different
        // person with the same nick is still rejected. Documented quirk.
        let mut t = enrolled(3);
        let impostor = Person::new("other-id", "Other", "nick1", Color::Blue);
        let err = t.add_player(PlayerSummary::new(&impostor)).unwrap_err();
        assert!(matches!(err, TournamentError::DuplicateNick(n) if n == "nick1"));
        assert_eq!(t.players.len(), 3);
    }

    #[test]
    fn test_join_after_start_lands_in_runnerups() {
        let mut t = enrolled(12);
        t.start(Utc::now()).unwrap();
        let late = Person::new("late", "Late Joiner", "late", Color::Cyan);
        t.add_player(PlayerSummary::new(&late)).unwrap();
        assert_eq!(t.runnerups.last().map(String::as_str), Some("late"));
    }

    #[test]
    fn test_leave_only_before_start() {
        let mut t = enrolled(12);
        t.remove_player("p3").unwrap();
        assert_eq!(t.players.len(), 11);

        let mut t = enrolled(12);
        t.start(Utc::now()).unwrap();
        assert!(matches!(
            t.remove_player("p3").unwrap_err(),
            TournamentError::AlreadyRunning
        ));
    }

    #[test]
    fn test_seat_player_resolves_color_collision() {
        let mut t = Tournament::new("c", "c", None);
        for i in 0..2 {
            let person = Person::new(&format!("p{i}"), "x", &format!("n{i}"), Color::Green);
            t.add_player(PlayerSummary::new(&person)).unwrap();
        }
        t.matches.push(Match::new(0, MatchKind::Qualifying));
        t.seat_player(0, "p0").unwrap();
        t.seat_player(0, "p1").unwrap();
        assert_eq!(t.matches[0].players[0].color, Color::Green);
        assert_ne!(t.matches[0].players[1].color, Color::Green);
    }

    #[test]
    fn test_semi_indexes_are_positional() {
        let mut t = enrolled(12);
        assert_eq!(t.semi_indexes(), None);

        for i in 0..3 {
            t.matches.push(Match::new(i, MatchKind::Qualifying));
        }
        for i in 3..7 {
            t.matches.push(Match::new(i, MatchKind::Playoff));
        }
        t.matches.push(Match::new(7, MatchKind::Final));

        assert_eq!(t.semi_indexes(), Some((5, 6)));
        assert_eq!(t.final_index(), Some(7));
    }

    #[test]
    fn test_backfills_needed_counts_missing_semi_seats() {
        let mut t = enrolled(12);
        for i in 0..2 {
            t.matches.push(Match::new(i, MatchKind::Playoff));
        }
        let mut semi1 = Match::new(2, MatchKind::Playoff);
        semi1
            .add_player(Player::new("p0", "nick0", Color::Green))
            .unwrap();
        let mut semi2 = Match::new(3, MatchKind::Playoff);
        semi2
            .add_player(Player::new("p1", "nick1", Color::Blue))
            .unwrap();
        semi2
            .add_player(Player::new("p2", "nick2", Color::Pink))
            .unwrap();
        t.matches.push(semi1);
        t.matches.push(semi2);
        t.matches.push(Match::new(4, MatchKind::Final));

        assert_eq!(t.backfills_needed(), 5);
    }

    #[test]
    fn test_reshuffle_guards() {
        let mut t = enrolled(12);
        assert!(matches!(
            t.reshuffle().unwrap_err(),
            TournamentError::CannotReshuffle
        ));

        t.start(Utc::now()).unwrap();
        t.matches[0].start(Utc::now()).unwrap();
        assert!(matches!(
            t.reshuffle().unwrap_err(),
            TournamentError::CannotReshuffle
        ));
    }

    #[test]
    fn test_reshuffle_reseeds_everyone_exactly_once() {
        let mut t = enrolled(12);
        t.start(Utc::now()).unwrap();
        t.reshuffle().unwrap();

        assert_eq!(t.matches.len(), 2);
        assert_eq!(t.matches[0].players.len(), 4);
        assert_eq!(t.matches[1].players.len(), 4);
        assert_eq!(t.runnerups.len(), 4);

        let mut seen: Vec<&str> = t
            .matches
            .iter()
            .flat_map(|m| m.players.iter().map(|p| p.person_id.as_str()))
            .chain(t.runnerups.iter().map(String::as_str))
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 12);
    }

    #[test]
    fn test_update_player_stats_replays_matches() {
        let mut t = enrolled(12);
        t.start(Utc::now()).unwrap();
        t.matches[0].start(Utc::now()).unwrap();
        t.matches[0].players[0].kills = 10;
        t.matches[0].players[0].shots = 2;
        t.matches[0].end(Utc::now()).unwrap();

        t.update_player_stats();
        let p0 = t.player("p0").unwrap();
        assert_eq!(p0.kills, 10);
        assert_eq!(p0.shots, 2);
        assert_eq!(p0.matches, 1);
        assert_eq!(p0.score, 28);

        // Unended matches contribute kills but not a played-match count.
        let p1 = t.player("p1").unwrap();
        assert_eq!(p1.matches, 0);
    }

    #[test]
    fn test_award_medals_outside_final_rejected() {
        let mut t = enrolled(12);
        t.start(Utc::now()).unwrap();
        assert!(matches!(
            t.award_medals(0, Utc::now()).unwrap_err(),
            TournamentError::NotFinal
        ));
        assert!(t.ended.is_none());
    }

    #[test]
    fn test_award_medals_takes_top_three() {
        let mut t = enrolled(12);
        let mut fin = Match::new(0, MatchKind::Final);
        for (i, kills) in [5i64, 20, 11, 2].into_iter().enumerate() {
            let mut p = Player::new(&format!("p{i}"), &format!("nick{i}"), Color::ALL[i]);
            p.kills = kills;
            fin.add_player(p).unwrap();
        }
        t.matches.push(fin);
        t.started = Some(Utc::now());

        t.award_medals(0, Utc::now()).unwrap();
        let ids: Vec<&str> = t.winners.iter().map(|p| p.person_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p0"]);
        assert!(t.ended.is_some());
        assert!(!t.is_running());
    }

    #[test]
    fn test_next_match_skips_ended() {
        let mut t = enrolled(12);
        assert!(matches!(
            t.next_match_index().unwrap_err(),
            TournamentError::NotRunning
        ));

        t.start(Utc::now()).unwrap();
        assert_eq!(t.next_match_index().unwrap(), 0);

        t.matches[0].start(Utc::now()).unwrap();
        t.matches[0].players[0].kills = 10;
        t.matches[0].end(Utc::now()).unwrap();
        assert_eq!(t.next_match_index().unwrap(), 1);
    }

    #[test]
    fn test_events_are_append_only_records() {
        let t = enrolled(2);
        let kinds: Vec<&str> = t.events.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds, vec!["new_tournament", "player_join", "player_join"]);
    }
}
