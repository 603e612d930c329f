//! In-memory store for tests and local play. Mirrors the Postgres
//! document model closely enough that the manager cannot tell them apart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::game::entities::Person;
use crate::tournament::models::Tournament;

use super::repository::{Store, StoreError, StoreResult};

#[derive(Default)]
pub struct MemoryStore {
    tournaments: RwLock<HashMap<String, Tournament>>,
    people: RwLock<HashMap<String, Person>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn new_tournament(&self, tournament: &mut Tournament) -> StoreResult<()> {
        tournament.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.tournaments
            .write()
            .await
            .insert(tournament.slug.clone(), tournament.clone());
        Ok(())
    }

    async fn save_tournament(&self, tournament: &Tournament) -> StoreResult<()> {
        self.tournaments
            .write()
            .await
            .insert(tournament.slug.clone(), tournament.clone());
        Ok(())
    }

    async fn get_tournament(&self, slug: &str) -> StoreResult<Tournament> {
        let mut tournament = self
            .tournaments
            .read()
            .await
            .get(slug)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tournament {slug}")))?;
        tournament.rebuild_links();
        Ok(tournament)
    }

    async fn list_tournaments(&self) -> StoreResult<Vec<Tournament>> {
        let mut tournaments: Vec<Tournament> =
            self.tournaments.read().await.values().cloned().collect();
        tournaments.sort_by_key(|t| t.id);
        for t in &mut tournaments {
            t.rebuild_links();
        }
        Ok(tournaments)
    }

    async fn get_person(&self, id: &str) -> StoreResult<Person> {
        self.people
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("person {id}")))
    }

    async fn save_person(&self, person: &Person) -> StoreResult<()> {
        self.people
            .write()
            .await
            .insert(person.id.clone(), person.clone());
        Ok(())
    }
}
