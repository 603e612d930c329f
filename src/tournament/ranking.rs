//! Pure ordering functions over participation snapshots.
//!
//! All sorts are stable: ties keep the input order, which is join/seat
//! order everywhere these are used. That stability is what makes backfill
//! fairness and medal assignment deterministic.

use crate::game::entities::{Player, PlayerSummary};
use crate::game::constants;

/// Order seated players by kills, descending. Ties keep seat order.
/// Used to pick playoff winners and final medalists.
pub fn sort_by_kills(players: &[Player]) -> Vec<Player> {
    let mut sorted = players.to_vec();
    sorted.sort_by(|a, b| b.kills.cmp(&a.kills));
    sorted
}

/// Order summaries by cumulative kills, descending. Ties keep join order.
pub fn sort_summaries_by_kills(summaries: &[PlayerSummary]) -> Vec<PlayerSummary> {
    let mut sorted = summaries.to_vec();
    sorted.sort_by(|a, b| b.kills.cmp(&a.kills));
    sorted
}

/// Order summaries by runner-up eligibility: fewest matches played first,
/// then highest score. Remaining ties keep join order.
pub fn sort_by_runnerup(summaries: &[PlayerSummary]) -> Vec<PlayerSummary> {
    let mut sorted = summaries.to_vec();
    sorted.sort_by(|a, b| a.matches.cmp(&b.matches).then(b.score.cmp(&a.score)));
    sorted
}

/// Deal ranked playoff qualifiers into seed buckets round-robin: rank `i`
/// lands in bucket `i % 4`. Each bucket then holds one player from each
/// strength quartile instead of a contiguous slice of the ranking.
pub fn divide_playoff_players(ranked: &[PlayerSummary]) -> Vec<Vec<PlayerSummary>> {
    let mut buckets: Vec<Vec<PlayerSummary>> = vec![Vec::new(); constants::PLAYOFF_MATCHES];
    for (i, player) in ranked.iter().enumerate() {
        buckets[i % constants::PLAYOFF_MATCHES].push(player.clone());
    }
    buckets
}
