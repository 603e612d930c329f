//! Store trait and the default PostgreSQL implementation.
//!
//! The tournament aggregate is persisted as one JSON document per row.
//! Every mutation path saves the whole aggregate while still holding the
//! tournament lock, so a crash never leaves a half-applied transition.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::game::constants;
use crate::game::entities::{Person, PlayerSummary};
use crate::tournament::models::Tournament;
use crate::tournament::ranking;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("playoff pool needs exactly {needed} players, have {current}")]
    ShortPlayoffPool { needed: usize, current: usize },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence boundary for tournaments and registered people.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a brand new tournament and assign its store identity.
    async fn new_tournament(&self, tournament: &mut Tournament) -> StoreResult<()>;

    /// Persist the current state of an existing tournament.
    async fn save_tournament(&self, tournament: &Tournament) -> StoreResult<()>;

    /// Load a tournament by slug, with derived links rebuilt.
    async fn get_tournament(&self, slug: &str) -> StoreResult<Tournament>;

    /// All tournaments, oldest first.
    async fn list_tournaments(&self) -> StoreResult<Vec<Tournament>>;

    async fn get_person(&self, id: &str) -> StoreResult<Person>;

    async fn save_person(&self, person: &Person) -> StoreResult<()>;

    // Derived queries. Computed from the aggregate so no implementation
    // can disagree with the in-memory state.

    /// One player's current participation record.
    fn get_player_summary(
        &self,
        tournament: &Tournament,
        person_id: &str,
    ) -> StoreResult<PlayerSummary> {
        tournament
            .replayed_summaries()
            .into_iter()
            .find(|s| s.person_id == person_id)
            .ok_or_else(|| StoreError::NotFound(format!("player {person_id}")))
    }

    /// All participation records, ranked by kills.
    fn get_player_summaries(&self, tournament: &Tournament) -> Vec<PlayerSummary> {
        ranking::sort_summaries_by_kills(&tournament.replayed_summaries())
    }

    /// The runner-up pool in eligibility order.
    fn get_runnerups(&self, tournament: &Tournament) -> Vec<PlayerSummary> {
        tournament.runnerup_summaries()
    }

    /// Exactly the sixteen playoff qualifiers, or an error.
    fn get_playoff_players(&self, tournament: &Tournament) -> StoreResult<Vec<PlayerSummary>> {
        let candidates = tournament.playoff_candidates();
        if candidates.len() != constants::PLAYOFF_PLAYERS {
            return Err(StoreError::ShortPlayoffPool {
                needed: constants::PLAYOFF_PLAYERS,
                current: candidates.len(),
            });
        }
        Ok(candidates)
    }

    fn qualifying_matches_done(&self, tournament: &Tournament) -> bool {
        tournament.qualifying_done()
    }
}

/// Default PostgreSQL implementation of [`Store`].
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn new_tournament(&self, tournament: &mut Tournament) -> StoreResult<()> {
        let data = serde_json::to_string(tournament)?;
        let row = sqlx::query(
            "INSERT INTO tournaments (slug, data) VALUES ($1, $2) RETURNING id",
        )
        .bind(&tournament.slug)
        .bind(&data)
        .fetch_one(&self.pool)
        .await?;
        tournament.id = Some(row.get::<i64, _>("id"));
        // Re-save so the stored document carries its own id.
        self.save_tournament(tournament).await
    }

    async fn save_tournament(&self, tournament: &Tournament) -> StoreResult<()> {
        let data = serde_json::to_string(tournament)?;
        sqlx::query("UPDATE tournaments SET data = $2 WHERE slug = $1")
            .bind(&tournament.slug)
            .bind(&data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_tournament(&self, slug: &str) -> StoreResult<Tournament> {
        let row = sqlx::query("SELECT data FROM tournaments WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("tournament {slug}")))?;
        let mut tournament: Tournament = serde_json::from_str(&row.get::<String, _>("data"))?;
        tournament.rebuild_links();
        Ok(tournament)
    }

    async fn list_tournaments(&self) -> StoreResult<Vec<Tournament>> {
        let rows = sqlx::query("SELECT data FROM tournaments ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut tournaments = Vec::with_capacity(rows.len());
        for row in rows {
            let mut tournament: Tournament =
                serde_json::from_str(&row.get::<String, _>("data"))?;
            tournament.rebuild_links();
            tournaments.push(tournament);
        }
        Ok(tournaments)
    }

    async fn get_person(&self, id: &str) -> StoreResult<Person> {
        let row = sqlx::query("SELECT data FROM people WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("person {id}")))?;
        Ok(serde_json::from_str(&row.get::<String, _>("data"))?)
    }

    async fn save_person(&self, person: &Person) -> StoreResult<()> {
        let data = serde_json::to_string(person)?;
        sqlx::query(
            "INSERT INTO people (id, data) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(&person.id)
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
