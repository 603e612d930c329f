//! Bracket progression. Runs after a match ends, while the caller still
//! holds the tournament lock, so the decision (which stage, who advances)
//! and the mutation (new matches, moved players) are a single atomic step.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::json;

use crate::game::{
    constants,
    state_machine::{Match, MatchKind},
};
use crate::tournament::manager::{TournamentError, TournamentResult};
use crate::tournament::models::Tournament;
use crate::tournament::ranking;

/// Advance the bracket after match `ended_index` has ended.
///
/// Qualifying players return to the runner-up pool, aggregates are
/// replayed, and then the stage decides what comes next: another
/// qualifying match before the cutoff, the endgame once qualifying is
/// drained, or a final seat for a playoff winner.
pub fn advance_bracket(
    tournament: &mut Tournament,
    ended_index: usize,
    now: DateTime<Utc>,
) -> TournamentResult<()> {
    let kind = tournament
        .matches
        .get(ended_index)
        .ok_or(TournamentError::NoSuchMatch(ended_index))?
        .kind;

    if kind == MatchKind::Qualifying {
        let finished: Vec<String> = tournament.matches[ended_index]
            .players
            .iter()
            .map(|p| p.person_id.clone())
            .collect();
        for person_id in finished {
            if !tournament.runnerups.contains(&person_id) {
                tournament.runnerups.push(person_id);
            }
        }
    }

    tournament.update_player_stats();
    tournament.update_runnerups();

    match kind {
        MatchKind::Qualifying => {
            let cutoff_passed = tournament.qualifying_end.is_some_and(|c| now >= c);
            if !cutoff_passed {
                replenish_qualifying(tournament)?;
            } else if tournament.qualifying_done() {
                schedule_endgame(tournament)?;
            } else {
                debug!(
                    "{}: cutoff passed, waiting for remaining qualifying matches",
                    tournament.slug
                );
            }
        }
        MatchKind::Playoff => {
            advance_playoff_winner(tournament, ended_index)?;
        }
        MatchKind::Final => {}
    }
    Ok(())
}

/// Keep the qualifying stage fed: append one more qualifying match seeded
/// with the most eligible runner-ups. A drained pool means nothing to
/// seed, so no match is created.
fn replenish_qualifying(tournament: &mut Tournament) -> TournamentResult<()> {
    let pool = tournament.runnerup_summaries();
    if pool.is_empty() {
        debug!("{}: runner-up pool empty, not replenishing", tournament.slug);
        return Ok(());
    }

    let index = tournament.matches.len();
    tournament
        .matches
        .push(Match::new(index, MatchKind::Qualifying));
    for summary in pool.iter().take(constants::PLAYERS_PER_MATCH) {
        tournament.seat_player(index, &summary.person_id)?;
        tournament.remove_from_runnerups(&summary.person_id);
    }
    info!(
        "{}: qualifying match {} created with {} players",
        tournament.slug,
        index,
        tournament.matches[index].players.len()
    );
    Ok(())
}

/// Lay out the endgame: exactly sixteen qualifiers dealt round-robin into
/// four playoff matches, plus an empty final. Anything other than a full
/// playoff pool is an error and leaves the tournament untouched.
fn schedule_endgame(tournament: &mut Tournament) -> TournamentResult<()> {
    let candidates = tournament.playoff_candidates();
    if candidates.len() != constants::PLAYOFF_PLAYERS {
        return Err(TournamentError::InsufficientPlayoffPlayers {
            needed: constants::PLAYOFF_PLAYERS,
            current: candidates.len(),
        });
    }

    let buckets = ranking::divide_playoff_players(&candidates);
    let base = tournament.matches.len();
    for (offset, bucket) in buckets.iter().enumerate() {
        let index = base + offset;
        tournament.matches.push(Match::new(index, MatchKind::Playoff));
        for summary in bucket {
            tournament.seat_player(index, &summary.person_id)?;
            tournament.remove_from_runnerups(&summary.person_id);
        }
    }
    tournament
        .matches
        .push(Match::new(base + buckets.len(), MatchKind::Final));

    info!("{}: endgame scheduled", tournament.slug);
    tournament.log_event(
        "endgame",
        "Playoffs scheduled",
        json!({ "first_playoff": base }),
    );
    Ok(())
}

/// The top player by kills in an ended playoff match earns a final seat.
fn advance_playoff_winner(
    tournament: &mut Tournament,
    ended_index: usize,
) -> TournamentResult<()> {
    let winner = ranking::sort_by_kills(&tournament.matches[ended_index].players)
        .into_iter()
        .next()
        .ok_or(TournamentError::NoSuchMatch(ended_index))?;
    let final_index = tournament
        .final_index()
        .ok_or(TournamentError::NoPendingMatch)?;
    tournament.seat_player(final_index, &winner.person_id)?;
    tournament.remove_from_runnerups(&winner.person_id);
    info!(
        "{}: {} advances to the final",
        tournament.slug, winner.nick
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::{Color, Person, PlayerSummary};

    fn running(n: usize) -> Tournament {
        let mut t = Tournament::new("Cup", "cup", None);
        for i in 0..n {
            let person = Person::new(
                &format!("p{i}"),
                &format!("Player {i}"),
                &format!("nick{i}"),
                Color::ALL[i % Color::ALL.len()],
            );
            t.add_player(PlayerSummary::new(&person)).unwrap();
        }
        t.start(Utc::now()).unwrap();
        t
    }

    fn play_out(t: &mut Tournament, index: usize, kills: &[i64]) {
        let now = Utc::now();
        if !t.matches[index].is_scheduled() {
            t.matches[index].set_time(now).unwrap();
        }
        t.matches[index].start(now).unwrap();
        for (i, k) in kills.iter().enumerate() {
            t.matches[index].players[i].kills = *k;
        }
        t.matches[index].end(now).unwrap();
    }

    #[test]
    fn test_qualifying_end_replenishes_before_cutoff() {
        let mut t = running(12);
        play_out(&mut t, 0, &[10, 3, 2, 1]);
        advance_bracket(&mut t, 0, Utc::now()).unwrap();

        assert_eq!(t.matches.len(), 3);
        assert_eq!(t.matches[2].kind, MatchKind::Qualifying);
        assert_eq!(t.matches[2].players.len(), 4);

        // Fresh players (zero matches) are seated before the finishers.
        let seated: Vec<&str> = t.matches[2]
            .players
            .iter()
            .map(|p| p.person_id.as_str())
            .collect();
        assert_eq!(seated, vec!["p8", "p9", "p10", "p11"]);
    }

    #[test]
    fn test_replenished_match_prefers_high_scores_on_equal_matches() {
        let mut t = running(12);
        play_out(&mut t, 0, &[10, 3, 2, 1]);
        advance_bracket(&mut t, 0, Utc::now()).unwrap();
        play_out(&mut t, 1, &[10, 6, 5, 4]);
        advance_bracket(&mut t, 1, Utc::now()).unwrap();

        // Pool is now the eight finishers, all with one match. The best
        // scores go back in first.
        assert_eq!(t.matches.len(), 4);
        let seated: Vec<&str> = t.matches[3]
            .players
            .iter()
            .map(|p| p.person_id.as_str())
            .collect();
        assert_eq!(seated, vec!["p0", "p1", "p3", "p5"]);
    }

    #[test]
    fn test_no_replenish_after_cutoff() {
        let mut t = running(12);
        t.end_qualifying(Utc::now());
        play_out(&mut t, 0, &[10, 3, 2, 1]);
        advance_bracket(&mut t, 0, Utc::now()).unwrap();

        // Match 1 is still pending, so neither a new qualifying match nor
        // the endgame appears yet.
        assert_eq!(t.matches.len(), 2);
    }

    #[test]
    fn test_endgame_requires_full_playoff_pool() {
        let mut t = running(12);
        t.end_qualifying(Utc::now());
        play_out(&mut t, 0, &[10, 3, 2, 1]);
        advance_bracket(&mut t, 0, Utc::now()).unwrap();
        play_out(&mut t, 1, &[10, 8, 7, 6]);

        let err = advance_bracket(&mut t, 1, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            TournamentError::InsufficientPlayoffPlayers {
                needed: 16,
                current: 12
            }
        ));
    }

    #[test]
    fn test_endgame_layout_with_sixteen_players() {
        let mut t = running(16);
        // Two replenished matches seat the remaining eight.
        play_out(&mut t, 0, &[10, 3, 2, 1]);
        advance_bracket(&mut t, 0, Utc::now()).unwrap();
        play_out(&mut t, 1, &[11, 8, 7, 6]);
        advance_bracket(&mut t, 1, Utc::now()).unwrap();
        t.end_qualifying(Utc::now());
        play_out(&mut t, 2, &[10, 4, 3, 2]);
        advance_bracket(&mut t, 2, Utc::now()).unwrap();
        play_out(&mut t, 3, &[13, 12, 11, 1]);
        advance_bracket(&mut t, 3, Utc::now()).unwrap();

        // Four qualifying + four playoff + one final.
        assert_eq!(t.matches.len(), 9);
        for m in &t.matches[4..8] {
            assert_eq!(m.kind, MatchKind::Playoff);
            assert_eq!(m.players.len(), 4);
        }
        let fin = t.matches.last().unwrap();
        assert_eq!(fin.kind, MatchKind::Final);
        assert!(fin.players.is_empty());
        assert!(t.runnerups.is_empty());

        // Round-robin deal: the overall top qualifier sits in the first
        // playoff match, the runner-up in the second.
        assert_eq!(t.matches[4].players[0].person_id, "p12");
        assert_eq!(t.matches[5].players[0].person_id, "p13");
    }

    #[test]
    fn test_playoff_winner_advances_to_final() {
        let mut t = running(12);
        // Hand-build an endgame; positional layout is what matters here.
        let mut playoff = Match::new(2, MatchKind::Playoff);
        for (i, id) in ["p0", "p1", "p2", "p3"].iter().enumerate() {
            playoff
                .add_player(crate::game::entities::Player::new(
                    id,
                    id,
                    Color::ALL[i],
                ))
                .unwrap();
        }
        t.matches.push(playoff);
        t.matches.push(Match::new(3, MatchKind::Final));

        play_out(&mut t, 2, &[2, 14, 3, 1]);
        advance_bracket(&mut t, 2, Utc::now()).unwrap();

        let fin = t.matches.last().unwrap();
        assert_eq!(fin.players.len(), 1);
        assert_eq!(fin.players[0].person_id, "p1");
    }
}
