//! Tournament orchestration and concurrency control.
//!
//! The manager owns a registry of running tournaments, each behind its own
//! async mutex. Every operation follows the same shape: resolve the handle
//! under the registry read lock, lock the one tournament, mutate and
//! persist while still holding the lock, then emit snapshots after the
//! lock is released. Bracket progression runs inside the end-of-match
//! critical section, so no observer ever sees an ended match without its
//! consequences.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::db::{Store, StoreError};
use crate::game::{
    constants,
    entities::{CommitPlayer, MatchCommit, Person, PlayerSummary},
    state_machine::{Match, MatchError, MatchKind},
};
use crate::net::{
    MatchEndSnapshot, MatchSeedMessage, MatchesSnapshot, PlayerSummariesSnapshot, PublishError,
    Publisher, RunnerupsSnapshot, SnapshotCoordinator,
};
use crate::tournament::models::Tournament;
use crate::tournament::{ranking, scheduler};

#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("tournament {0} not found")]
    NotFound(String),
    #[error("slug {0} is already taken")]
    SlugTaken(String),
    #[error("nick {0} is already enrolled")]
    DuplicateNick(String),
    #[error("person {0} is not enrolled")]
    NotEnrolled(String),
    #[error("need {needed} players to start, have {current}")]
    InsufficientPlayers { needed: usize, current: usize },
    #[error("tournament is already running")]
    AlreadyRunning,
    #[error("tournament is not running")]
    NotRunning,
    #[error("no match at index {0}")]
    NoSuchMatch(usize),
    #[error("no pending match")]
    NoPendingMatch,
    #[error("not the final match")]
    NotFinal,
    #[error("need exactly {needed} playoff players, have {current}")]
    InsufficientPlayoffPlayers { needed: usize, current: usize },
    #[error("backfill needs exactly {needed} players, got {got}")]
    BackfillCountMismatch { needed: usize, got: usize },
    #[error("bracket can no longer be reshuffled")]
    CannotReshuffle,
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

pub type TournamentResult<T> = Result<T, TournamentError>;

type Handle = Arc<Mutex<Tournament>>;

/// Registry of live tournaments plus the shared infrastructure every
/// operation needs.
pub struct TournamentManager {
    tournaments: RwLock<HashMap<String, Handle>>,
    store: Arc<dyn Store>,
    coordinator: SnapshotCoordinator,
    publisher: Arc<dyn Publisher>,
}

impl TournamentManager {
    pub fn new(
        store: Arc<dyn Store>,
        coordinator: SnapshotCoordinator,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            tournaments: RwLock::new(HashMap::new()),
            store,
            coordinator,
            publisher,
        }
    }

    /// Load every persisted tournament into the registry. Called once on
    /// startup.
    pub async fn load_existing(&self) -> TournamentResult<()> {
        let stored = self.store.list_tournaments().await?;
        let mut registry = self.tournaments.write().await;
        for tournament in stored {
            info!("loaded tournament {}", tournament.slug);
            registry.insert(tournament.slug.clone(), Arc::new(Mutex::new(tournament)));
        }
        Ok(())
    }

    pub async fn create_tournament(
        &self,
        name: &str,
        slug: &str,
        scheduled: Option<DateTime<Utc>>,
    ) -> TournamentResult<Tournament> {
        let mut registry = self.tournaments.write().await;
        if registry.contains_key(slug) {
            return Err(TournamentError::SlugTaken(slug.to_string()));
        }

        let mut tournament = Tournament::new(name, slug, scheduled);
        self.store.new_tournament(&mut tournament).await?;
        registry.insert(slug.to_string(), Arc::new(Mutex::new(tournament.clone())));
        drop(registry);

        info!("created tournament {slug}");
        self.send_snapshot("tournament", &tournament);
        Ok(tournament)
    }

    async fn handle(&self, slug: &str) -> TournamentResult<Handle> {
        self.tournaments
            .read()
            .await
            .get(slug)
            .cloned()
            .ok_or_else(|| TournamentError::NotFound(slug.to_string()))
    }

    /// Consistent point-in-time copy of one tournament.
    pub async fn get_tournament(&self, slug: &str) -> TournamentResult<Tournament> {
        let handle = self.handle(slug).await?;
        let tournament = handle.lock().await;
        Ok(tournament.clone())
    }

    pub async fn list_tournaments(&self) -> TournamentResult<Vec<Tournament>> {
        let registry = self.tournaments.read().await;
        let handles: Vec<Handle> = registry.values().cloned().collect();
        drop(registry);

        let mut tournaments = Vec::with_capacity(handles.len());
        for handle in handles {
            tournaments.push(handle.lock().await.clone());
        }
        tournaments.sort_by_key(|t| t.id);
        Ok(tournaments)
    }

    /// Enroll a person. Normalizes display fields and persists the person
    /// record alongside the enrollment.
    pub async fn enroll_player(&self, slug: &str, person: &Person) -> TournamentResult<()> {
        let mut person = person.clone();
        person.correct();
        self.store.save_person(&person).await?;

        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        tournament.add_player(PlayerSummary::new(&person))?;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_roster_snapshots(&snapshot);
        Ok(())
    }

    /// Withdraw a person. Only possible before the tournament starts.
    pub async fn withdraw_player(&self, slug: &str, person_id: &str) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        tournament.remove_player(person_id)?;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_roster_snapshots(&snapshot);
        Ok(())
    }

    /// Flip a person's enrollment. Returns whether they are enrolled
    /// afterwards. The check and the flip happen under one lock, so
    /// concurrent toggles for the same person serialize into clean flips.
    pub async fn toggle_player(&self, slug: &str, person: &Person) -> TournamentResult<bool> {
        let mut person = person.clone();
        person.correct();

        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        let enrolled = tournament.player(&person.id).is_some();
        if enrolled {
            tournament.remove_player(&person.id)?;
        } else {
            self.store.save_person(&person).await?;
            tournament.add_player(PlayerSummary::new(&person))?;
        }
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_roster_snapshots(&snapshot);
        Ok(!enrolled)
    }

    /// Start the tournament: seed the opening bracket and push the first
    /// seed to the game client.
    pub async fn start_tournament(
        &self,
        slug: &str,
        now: DateTime<Utc>,
    ) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        tournament.start(now)?;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_snapshot("tournament", &snapshot);
        self.publish_next(&snapshot)?;
        Ok(())
    }

    /// Set the qualifying cutoff instant.
    pub async fn end_qualifying(&self, slug: &str, at: DateTime<Utc>) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        if !tournament.is_running() {
            return Err(TournamentError::NotRunning);
        }
        tournament.end_qualifying(at);
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_snapshot("tournament", &snapshot);
        Ok(())
    }

    pub async fn reshuffle(&self, slug: &str) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        tournament.reshuffle()?;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_matches_snapshot(&snapshot);
        self.send_runnerups_snapshot(&snapshot);
        self.publish_next(&snapshot)?;
        Ok(())
    }

    pub async fn set_match_time(
        &self,
        slug: &str,
        match_index: usize,
        at: DateTime<Utc>,
    ) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        tournament
            .matches
            .get_mut(match_index)
            .ok_or(TournamentError::NoSuchMatch(match_index))?
            .set_time(at)?;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_matches_snapshot(&snapshot);
        Ok(())
    }

    pub async fn start_match(
        &self,
        slug: &str,
        match_index: usize,
        now: DateTime<Utc>,
    ) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        if !tournament.is_running() {
            return Err(TournamentError::NotRunning);
        }
        tournament
            .matches
            .get_mut(match_index)
            .ok_or(TournamentError::NoSuchMatch(match_index))?
            .start(now)?;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_matches_snapshot(&snapshot);
        Ok(())
    }

    /// Record one round of play against a running match.
    pub async fn commit_match(
        &self,
        slug: &str,
        match_index: usize,
        state: Vec<CommitPlayer>,
    ) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        tournament
            .matches
            .get_mut(match_index)
            .ok_or(TournamentError::NoSuchMatch(match_index))?
            .commit(MatchCommit::new(state))?;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_matches_snapshot(&snapshot);
        Ok(())
    }

    /// End a match and advance the bracket in one atomic step. If any part
    /// fails the tournament is left exactly as it was.
    pub async fn end_match(
        &self,
        slug: &str,
        match_index: usize,
        now: DateTime<Utc>,
    ) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;

        // Work on a copy so a scheduler failure cannot leave the match
        // ended without its consequences.
        let mut work = tournament.clone();
        work.matches
            .get_mut(match_index)
            .ok_or(TournamentError::NoSuchMatch(match_index))?
            .end(now)?;
        scheduler::advance_bracket(&mut work, match_index, now)?;
        schedule_next(&mut work, now)?;

        *tournament = work;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_match_end_snapshot(&snapshot);
        self.publish_next(&snapshot)?;
        Ok(())
    }

    /// Discard a running match's commits so it can be replayed.
    pub async fn reset_match(&self, slug: &str, match_index: usize) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        tournament
            .matches
            .get_mut(match_index)
            .ok_or(TournamentError::NoSuchMatch(match_index))?
            .reset()?;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_matches_snapshot(&snapshot);
        Ok(())
    }

    /// Schedule the earliest pending match for immediate play and push its
    /// seed. Returns the match index.
    pub async fn next_match(&self, slug: &str, now: DateTime<Utc>) -> TournamentResult<usize> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        let index = tournament.next_match_index()?;
        if !tournament.matches[index].is_scheduled() {
            tournament.matches[index].set_time(now)?;
        }
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_matches_snapshot(&snapshot);
        self.publish_next(&snapshot)?;
        Ok(index)
    }

    /// Seats still missing from the semis.
    pub async fn backfills_needed(&self, slug: &str) -> TournamentResult<usize> {
        let handle = self.handle(slug).await?;
        let tournament = handle.lock().await;
        Ok(tournament.backfills_needed())
    }

    /// Fill the missing semi seats with exactly the players named. The
    /// count must match [`Self::backfills_needed`] or nothing happens.
    pub async fn backfill_semis(
        &self,
        slug: &str,
        person_ids: &[String],
    ) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;

        let needed = tournament.backfills_needed();
        if person_ids.len() != needed {
            return Err(TournamentError::BackfillCountMismatch {
                needed,
                got: person_ids.len(),
            });
        }

        let mut work = tournament.clone();
        fill_semis(&mut work, person_ids)?;
        *tournament = work;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_runnerups_snapshot(&snapshot);
        self.send_matches_snapshot(&snapshot);
        // A single backfill happens mid-announcement; the seed push would
        // race the one the judges already acted on.
        if needed != 1 {
            self.publish_next(&snapshot)?;
        }
        Ok(())
    }

    /// Close the tournament off the ended final: top three take the
    /// medals.
    pub async fn award_medals(
        &self,
        slug: &str,
        match_index: usize,
        now: DateTime<Utc>,
    ) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let mut tournament = handle.lock().await;
        tournament.award_medals(match_index, now)?;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        self.send_snapshot("tournament", &snapshot);
        self.send_summaries_snapshot(&snapshot);
        Ok(())
    }

    /// Pad the roster with synthetic players, for rehearsals and load
    /// checks. Snapshots are suppressed for the duration; one consolidated
    /// update goes out at the end.
    pub async fn usurp_tournament(&self, slug: &str, count: usize) -> TournamentResult<()> {
        let handle = self.handle(slug).await?;
        let guard = self.coordinator.suppress();
        let mut tournament = handle.lock().await;

        for _ in 0..count {
            let person = synthetic_person();
            self.store.save_person(&person).await?;
            tournament.add_player(PlayerSummary::new(&person))?;
        }
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        drop(guard);
        info!("{slug}: usurped with {count} synthetic players");
        self.send_snapshot("tournament", &snapshot);
        Ok(())
    }

    /// Play out every pending match of the current stage with simulated
    /// rounds. Holds the tournament lock and suppresses snapshots for the
    /// whole run; one consolidated update goes out at the end. Returns the
    /// stage that was played.
    pub async fn autoplay_section(&self, slug: &str) -> TournamentResult<MatchKind> {
        let handle = self.handle(slug).await?;
        let guard = self.coordinator.suppress();
        let mut tournament = handle.lock().await;

        let mut work = tournament.clone();
        let now = Utc::now();
        let first = work.next_match_index()?;
        let section = work.matches[first].kind;

        // Without a cutoff the qualifying stage replenishes forever.
        if section == MatchKind::Qualifying && work.qualifying_end.is_none() {
            work.end_qualifying(now);
        }

        loop {
            let index = match work.next_match_index() {
                Ok(index) => index,
                Err(TournamentError::NoPendingMatch) => break,
                Err(err) => return Err(err),
            };
            if work.matches[index].kind != section {
                break;
            }
            simulate_match(&mut work.matches[index], now)?;
            scheduler::advance_bracket(&mut work, index, now)?;
        }

        if section == MatchKind::Playoff {
            let needed = work.backfills_needed();
            if needed > 0 {
                let ids: Vec<String> = work
                    .runnerup_summaries()
                    .into_iter()
                    .take(needed)
                    .map(|s| s.person_id)
                    .collect();
                fill_semis(&mut work, &ids)?;
            }
        }
        schedule_next(&mut work, now)?;

        *tournament = work;
        self.store.save_tournament(&tournament).await?;

        let snapshot = tournament.clone();
        drop(tournament);
        drop(guard);
        info!("{slug}: autoplayed {section} stage");
        self.send_snapshot("tournament", &snapshot);
        self.publish_next(&snapshot)?;
        Ok(section)
    }

    /// Push the seed for the earliest pending match, but only once it has
    /// a full lineup. A disconnected game client is expected between
    /// games; anything else is the caller's problem.
    fn publish_next(&self, tournament: &Tournament) -> TournamentResult<()> {
        let index = match tournament.next_match_index() {
            Ok(index) => index,
            Err(_) => return Ok(()),
        };
        let next = &tournament.matches[index];
        if next.players.len() != constants::PLAYERS_PER_MATCH {
            debug!(
                "{}: match {} not fully seated, holding seed",
                tournament.slug, index
            );
            return Ok(());
        }
        let seed = MatchSeedMessage::from_match(&tournament.slug, next);
        match self.publisher.publish(&seed) {
            Ok(()) => Ok(()),
            Err(PublishError::Disconnected) => {
                debug!("{}: no game client for match {}", tournament.slug, index);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn send_snapshot<T: Serialize>(&self, kind: &str, data: &T) {
        match serde_json::to_value(data) {
            Ok(value) => self.coordinator.send_snapshot(kind, value),
            Err(err) => warn!("failed to encode {kind} snapshot: {err}"),
        }
    }

    fn send_matches_snapshot(&self, tournament: &Tournament) {
        self.send_snapshot(
            "matches",
            &MatchesSnapshot {
                tournament_id: tournament.id,
                matches: &tournament.matches,
            },
        );
    }

    fn send_summaries_snapshot(&self, tournament: &Tournament) {
        let ranked = ranking::sort_summaries_by_kills(&tournament.replayed_summaries());
        self.send_snapshot(
            "player_summaries",
            &PlayerSummariesSnapshot {
                tournament_id: tournament.id,
                player_summaries: &ranked,
            },
        );
    }

    fn send_runnerups_snapshot(&self, tournament: &Tournament) {
        let pool = tournament.runnerup_summaries();
        self.send_snapshot(
            "runnerups",
            &RunnerupsSnapshot {
                tournament_id: tournament.id,
                runnerups: &pool,
            },
        );
    }

    fn send_roster_snapshots(&self, tournament: &Tournament) {
        self.send_snapshot("tournament", tournament);
        self.send_summaries_snapshot(tournament);
    }

    /// Everything a spectator needs to redraw after a match ends, in one
    /// message.
    fn send_match_end_snapshot(&self, tournament: &Tournament) {
        let ranked = ranking::sort_summaries_by_kills(&tournament.replayed_summaries());
        let pool = tournament.runnerup_summaries();
        self.send_snapshot(
            "match_end",
            &MatchEndSnapshot {
                tournament_id: tournament.id,
                tournament,
                player_summaries: &ranked,
                runnerups: &pool,
                matches: &tournament.matches,
            },
        );
    }
}

/// Give the earliest pending match a schedule if it lacks one. A match
/// already underway keeps its (possibly absent) schedule.
fn schedule_next(tournament: &mut Tournament, now: DateTime<Utc>) -> TournamentResult<()> {
    if let Ok(index) = tournament.next_match_index() {
        let next = &mut tournament.matches[index];
        if !next.is_scheduled() && !next.is_started() {
            next.set_time(now)?;
        }
    }
    Ok(())
}

/// Seat players into the semis, first semi until full, then the second.
fn fill_semis(tournament: &mut Tournament, person_ids: &[String]) -> TournamentResult<()> {
    let (first, second) = tournament
        .semi_indexes()
        .ok_or(TournamentError::NoPendingMatch)?;
    for person_id in person_ids {
        let target = if tournament.matches[first].players.len() < constants::PLAYERS_PER_MATCH
        {
            first
        } else {
            second
        };
        tournament.seat_player(target, person_id)?;
        tournament.remove_from_runnerups(person_id);
    }
    tournament.log_event(
        "backfill",
        "Semis backfilled",
        json!({ "person_ids": person_ids }),
    );
    Ok(())
}

/// Run simulated rounds until someone crosses the end score, then end the
/// match. One seat per round is guaranteed progress, so the loop is
/// bounded.
fn simulate_match(m: &mut Match, now: DateTime<Utc>) -> Result<(), MatchError> {
    if !m.is_scheduled() {
        m.set_time(now)?;
    }
    if !m.is_started() {
        m.start(now)?;
    }
    let mut rng = rand::rng();
    while !m.can_end() {
        let hot = rng.random_range(0..m.players.len());
        let state = m
            .players
            .iter()
            .enumerate()
            .map(|(i, _)| CommitPlayer {
                ups: if i == hot {
                    rng.random_range(1..=3)
                } else {
                    rng.random_range(0..=2)
                },
                downs: rng.random_range(0..=2),
                shot: rng.random_range(0..10) == 0,
                reason: "autoplay".into(),
            })
            .collect();
        m.commit(MatchCommit::new(state))?;
    }
    m.end(now)
}

const SYNTHETIC_FIRST: [&str; 8] = [
    "Swift", "Grim", "Lucky", "Rowdy", "Silent", "Crimson", "Feral", "Gilded",
];
const SYNTHETIC_LAST: [&str; 8] = [
    "Arrow", "Quiver", "Talon", "Gale", "Ember", "Shade", "Lark", "Vane",
];

/// A throwaway person with a fresh identity and a random color.
fn synthetic_person() -> Person {
    let mut rng = rand::rng();
    let first = SYNTHETIC_FIRST[rng.random_range(0..SYNTHETIC_FIRST.len())];
    let last = SYNTHETIC_LAST[rng.random_range(0..SYNTHETIC_LAST.len())];
    let id = Uuid::new_v4().to_string();
    let color =
        crate::game::entities::Color::ALL[rng.random_range(0..crate::game::entities::Color::ALL.len())];
    let nick = format!("{first} {last} {}", &id[..4]);
    Person::new(&id, &nick, &nick, color)
}
