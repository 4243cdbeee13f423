//! Round-Robin and Swiss fixture generation

use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::ws::protocol::FixtureStatus;

use super::Fixture;

/// Generate all C(N,2) Round-Robin fixtures up front, chunking pairs evenly
/// across N-1 rounds. Returns (total_rounds, fixtures).
pub fn round_robin(players: &[i64]) -> (u32, Vec<Fixture>) {
    let n = players.len();
    let total_rounds = (n - 1) as u32;

    let mut pairs = Vec::with_capacity(n * (n - 1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((players[i], players[j]));
        }
    }

    let per_round = pairs.len().div_ceil(total_rounds as usize);
    let fixtures = pairs
        .into_iter()
        .enumerate()
        .map(|(idx, (p1, p2))| Fixture {
            match_id: Uuid::new_v4(),
            round: (idx / per_round) as u32 + 1,
            player1: p1,
            player2: Some(p2),
            status: FixtureStatus::Pending,
            score: None,
        })
        .collect();

    (total_rounds, fixtures)
}

/// Swiss round 1: shuffle, then pair consecutive twos. An odd player count
/// gives the last unpaired player a bye.
pub fn swiss_round_one<R: Rng>(players: &[i64], rng: &mut R) -> Vec<Fixture> {
    let mut shuffled = players.to_vec();
    shuffled.shuffle(rng);

    let mut fixtures = Vec::with_capacity(shuffled.len() / 2 + 1);
    let mut iter = shuffled.chunks_exact(2);
    for pair in iter.by_ref() {
        fixtures.push(pairing_fixture(1, pair[0], pair[1]));
    }
    if let Some(&odd_one) = iter.remainder().first() {
        fixtures.push(bye_fixture(1, odd_one));
    }
    fixtures
}

/// Swiss rounds 2+: pair by descending standing order.
///
/// `ranked` must be the current leaderboard order (best first). An odd count
/// gives the bye to the lowest-ranked player without one. Pairing prefers the
/// greedy choice (best unpaired player against the next candidate they have
/// not faced) but backtracks when that choice strands a repeat pair later in
/// the round. Only when no zero-repeat pairing exists at all does the greedy
/// result get accepted over refusal.
pub fn swiss_round(
    round: u32,
    ranked: &[i64],
    has_bye: impl Fn(i64) -> bool,
    played: impl Fn(i64, i64) -> bool,
) -> Vec<Fixture> {
    let mut pool = ranked.to_vec();
    let mut fixtures = Vec::with_capacity(pool.len() / 2 + 1);

    if pool.len() % 2 == 1 {
        let bye_idx = pool
            .iter()
            .rposition(|&p| !has_bye(p))
            .unwrap_or(pool.len() - 1);
        let bye_player = pool.remove(bye_idx);
        fixtures.push(bye_fixture(round, bye_player));
    }

    let pairs = match pair_without_repeats(&pool, &played) {
        Some(pairs) => pairs,
        None => greedy_pairs(pool, &played),
    };
    fixtures.extend(
        pairs
            .into_iter()
            .map(|(p1, p2)| pairing_fixture(round, p1, p2)),
    );

    fixtures
}

/// Depth-first search for a pairing with no repeat opponents, trying
/// candidates in standing order so the first solution found is the one
/// closest to the plain greedy pairing.
fn pair_without_repeats(pool: &[i64], played: &impl Fn(i64, i64) -> bool) -> Option<Vec<(i64, i64)>> {
    if pool.is_empty() {
        return Some(Vec::new());
    }
    let p1 = pool[0];
    for (idx, &candidate) in pool.iter().enumerate().skip(1) {
        if played(p1, candidate) {
            continue;
        }
        let mut rest: Vec<i64> = Vec::with_capacity(pool.len() - 2);
        rest.extend(pool.iter().enumerate().filter_map(|(i, &p)| {
            (i != 0 && i != idx).then_some(p)
        }));
        if let Some(mut pairs) = pair_without_repeats(&rest, played) {
            pairs.insert(0, (p1, candidate));
            return Some(pairs);
        }
    }
    None
}

/// Greedy fallback for pathological standings where repeats are unavoidable
fn greedy_pairs(mut pool: Vec<i64>, played: &impl Fn(i64, i64) -> bool) -> Vec<(i64, i64)> {
    let mut pairs = Vec::with_capacity(pool.len() / 2);
    while !pool.is_empty() {
        let p1 = pool.remove(0);
        let opponent_idx = pool
            .iter()
            .position(|&candidate| !played(p1, candidate))
            .unwrap_or(0);
        let p2 = pool.remove(opponent_idx);
        pairs.push((p1, p2));
    }
    pairs
}

fn pairing_fixture(round: u32, p1: i64, p2: i64) -> Fixture {
    Fixture {
        match_id: Uuid::new_v4(),
        round,
        player1: p1,
        player2: Some(p2),
        status: FixtureStatus::Pending,
        score: None,
    }
}

fn bye_fixture(round: u32, player: i64) -> Fixture {
    Fixture {
        match_id: Uuid::new_v4(),
        round,
        player1: player,
        player2: None,
        status: FixtureStatus::Bye,
        score: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    #[test]
    fn round_robin_four_players_is_six_fixtures_over_three_rounds() {
        let (rounds, fixtures) = round_robin(&[1, 2, 3, 4]);
        assert_eq!(rounds, 3);
        assert_eq!(fixtures.len(), 6);

        let round_set: HashSet<u32> = fixtures.iter().map(|f| f.round).collect();
        assert_eq!(round_set, HashSet::from([1, 2, 3]));

        // Each unordered pair appears exactly once
        let pairs: HashSet<(i64, i64)> = fixtures
            .iter()
            .map(|f| {
                let p2 = f.player2.unwrap();
                (f.player1.min(p2), f.player1.max(p2))
            })
            .collect();
        assert_eq!(pairs.len(), 6);
    }

    #[test]
    fn round_robin_three_players() {
        let (rounds, fixtures) = round_robin(&[1, 2, 3]);
        assert_eq!(rounds, 2);
        assert_eq!(fixtures.len(), 3);
        assert!(fixtures.iter().all(|f| f.round <= 2));
        assert!(fixtures.iter().all(|f| f.player2.is_some()));
    }

    #[test]
    fn swiss_round_one_pairs_everyone_with_bye_on_odd_count() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let fixtures = swiss_round_one(&[1, 2, 3, 4, 5], &mut rng);
        assert_eq!(fixtures.len(), 3);

        let byes: Vec<&Fixture> = fixtures.iter().filter(|f| f.player2.is_none()).collect();
        assert_eq!(byes.len(), 1);
        assert_eq!(byes[0].status, FixtureStatus::Bye);

        let mut seen: HashSet<i64> = HashSet::new();
        for f in &fixtures {
            assert!(seen.insert(f.player1));
            if let Some(p2) = f.player2 {
                assert!(seen.insert(p2));
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn swiss_round_gives_bye_to_lowest_ranked_without_one() {
        // Player 5 is lowest but already took a bye; 4 is next lowest
        let fixtures = swiss_round(2, &[1, 2, 3, 4, 5], |p| p == 5, |_, _| false);
        let bye = fixtures.iter().find(|f| f.player2.is_none()).unwrap();
        assert_eq!(bye.player1, 4);
    }

    #[test]
    fn swiss_round_skips_repeat_opponents() {
        // Round 1 was (1,2) and (3,4); standings order unchanged
        let played = |a: i64, b: i64| {
            matches!(
                (a.min(b), a.max(b)),
                (1, 2) | (3, 4)
            )
        };
        let fixtures = swiss_round(2, &[1, 2, 3, 4], |_| false, played);
        assert_eq!(fixtures.len(), 2);
        for f in &fixtures {
            let p2 = f.player2.unwrap();
            assert!(!played(f.player1, p2), "repeat pairing {:?}", (f.player1, p2));
        }
    }

    #[test]
    fn swiss_round_accepts_greedy_result_when_no_valid_pairing_exists() {
        // Everyone has played everyone: the greedy fallback still pairs
        let fixtures = swiss_round(3, &[1, 2, 3, 4], |_| false, |_, _| true);
        assert_eq!(fixtures.len(), 2);
        assert!(fixtures.iter().all(|f| f.player2.is_some()));
    }
}
