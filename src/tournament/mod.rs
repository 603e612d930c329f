//! Tournament aggregate, ranking rules, bracket scheduler, and the
//! concurrency-safe manager that ties them together.

pub mod manager;
pub mod models;
pub mod ranking;
pub mod scheduler;

pub use manager::{TournamentError, TournamentManager, TournamentResult};
pub use models::{Event, Tournament};
