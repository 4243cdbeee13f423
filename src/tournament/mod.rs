//! Tournament engine: bracket generation, standings, round progression

pub mod pairing;
pub mod standings;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::{MatchOutcome, MatchRegistry};
use crate::ws::fanout::Fanout;
use crate::ws::protocol::{
    FixtureStatus, FixtureView, MatchMode, PlayerBrief, ServerMsg, StandingView,
};

use standings::{leaderboard_order, Standing, FORFEIT_SCORE};

/// Swiss brackets always run this many rounds (valid for 5-8 players)
pub const SWISS_ROUNDS: u32 = 3;

/// Bracket format, derived once from the player count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TournamentFormat {
    RoundRobin,
    Swiss,
}

/// A registered tournament participant
#[derive(Debug, Clone)]
pub struct TournamentPlayer {
    pub id: i64,
    pub display_name: String,
    pub is_temporary: bool,
}

/// One scheduled pairing within a round (a bye has no second player)
#[derive(Debug, Clone)]
pub struct Fixture {
    pub match_id: Uuid,
    pub round: u32,
    pub player1: i64,
    pub player2: Option<i64>,
    pub status: FixtureStatus,
    pub score: Option<(u32, u32)>,
}

/// Tournament errors, rejected synchronously with no state mutation
#[derive(Debug, thiserror::Error)]
pub enum TournamentError {
    #[error("Tournament requires 3 to 8 players, got {0}")]
    InvalidPlayerCount(usize),

    #[error("Tournament not found")]
    NotFound,

    #[error("Fixture not found")]
    FixtureNotFound,

    #[error("Fixture is not playable in its current state")]
    FixtureNotPlayable,

    #[error("Match is still live; results come from the simulation")]
    MatchStillLive,

    #[error("Submitter is not a participant of that fixture")]
    NotFixtureParticipant,
}

/// What applying a result did to the round state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Current round still has open fixtures
    RoundContinues,
    /// Advanced into the given round
    NextRound(u32),
    /// Tournament finished
    Complete { champion: i64 },
}

/// The tournament state machine. All mutation is serialized by the owning
/// service's per-instance lock.
pub struct Tournament {
    pub id: Uuid,
    pub players: Vec<TournamentPlayer>,
    pub format: TournamentFormat,
    pub current_round: u32,
    pub total_rounds: u32,
    pub fixtures: Vec<Fixture>,
    standings: HashMap<i64, Standing>,
}

impl Tournament {
    /// Create a tournament; format derives from the player count and never
    /// changes. Round-Robin fixtures all exist from the start; Swiss only
    /// generates round 1 here.
    pub fn new<R: rand::Rng>(
        id: Uuid,
        players: Vec<TournamentPlayer>,
        rng: &mut R,
    ) -> Result<Self, TournamentError> {
        let ids: Vec<i64> = players.iter().map(|p| p.id).collect();
        let (format, total_rounds, fixtures) = match ids.len() {
            3..=4 => {
                let (rounds, fixtures) = pairing::round_robin(&ids);
                (TournamentFormat::RoundRobin, rounds, fixtures)
            }
            5..=8 => {
                let fixtures = pairing::swiss_round_one(&ids, rng);
                (TournamentFormat::Swiss, SWISS_ROUNDS, fixtures)
            }
            n => return Err(TournamentError::InvalidPlayerCount(n)),
        };

        let standings = ids.iter().map(|&id| (id, Standing::new(id))).collect();

        let mut tournament = Self {
            id,
            players,
            format,
            current_round: 1,
            total_rounds,
            fixtures: Vec::new(),
            standings,
        };
        tournament.register_fixtures(fixtures);
        Ok(tournament)
    }

    /// Record generated fixtures; byes settle their standings immediately
    fn register_fixtures(&mut self, fixtures: Vec<Fixture>) {
        for fixture in &fixtures {
            if fixture.status == FixtureStatus::Bye {
                if let Some(standing) = self.standings.get_mut(&fixture.player1) {
                    standing.record_bye();
                }
            }
        }
        self.fixtures.extend(fixtures);
    }

    pub fn player_ids(&self) -> Vec<i64> {
        self.players.iter().map(|p| p.id).collect()
    }

    pub fn player_brief(&self, id: i64) -> Option<PlayerBrief> {
        self.players.iter().find(|p| p.id == id).map(|p| PlayerBrief {
            user_id: p.id,
            display_name: p.display_name.clone(),
        })
    }

    pub fn is_complete(&self) -> bool {
        match self.format {
            TournamentFormat::RoundRobin => self
                .fixtures
                .iter()
                .all(|f| f.status == FixtureStatus::Completed),
            TournamentFormat::Swiss => {
                self.current_round == self.total_rounds && self.round_complete(self.current_round)
            }
        }
    }

    fn round_complete(&self, round: u32) -> bool {
        self.fixtures.iter().filter(|f| f.round == round).all(|f| {
            matches!(f.status, FixtureStatus::Completed | FixtureStatus::Bye)
        })
    }

    /// Fixtures of the current round that can be handed to the match
    /// registry right now: pending, and neither player already mid-match.
    /// Chunked Round-Robin rounds may seat a player twice, so those
    /// fixtures wait for the blocking match to complete.
    pub fn spawnable_fixtures(&self) -> Vec<Fixture> {
        let busy: HashSet<i64> = self
            .fixtures
            .iter()
            .filter(|f| f.status == FixtureStatus::InProgress)
            .flat_map(|f| [Some(f.player1), f.player2])
            .flatten()
            .collect();

        let mut claimed = busy;
        let mut due = Vec::new();
        for fixture in &self.fixtures {
            if fixture.round != self.current_round || fixture.status != FixtureStatus::Pending {
                continue;
            }
            let Some(p2) = fixture.player2 else { continue };
            if claimed.contains(&fixture.player1) || claimed.contains(&p2) {
                continue;
            }
            claimed.insert(fixture.player1);
            claimed.insert(p2);
            due.push(fixture.clone());
        }
        due
    }

    pub fn mark_in_progress(&mut self, match_id: Uuid) {
        if let Some(fixture) = self.fixtures.iter_mut().find(|f| f.match_id == match_id) {
            if fixture.status == FixtureStatus::Pending {
                fixture.status = FixtureStatus::InProgress;
            }
        }
    }

    pub fn find_fixture(&self, match_id: Uuid) -> Option<&Fixture> {
        self.fixtures.iter().find(|f| f.match_id == match_id)
    }

    /// Apply a completed fixture result, update both standings, and drive
    /// the round state machine.
    pub fn apply_result(
        &mut self,
        match_id: Uuid,
        score1: u32,
        score2: u32,
    ) -> Result<Advance, TournamentError> {
        let fixture = self
            .fixtures
            .iter_mut()
            .find(|f| f.match_id == match_id)
            .ok_or(TournamentError::FixtureNotFound)?;

        if !matches!(
            fixture.status,
            FixtureStatus::Pending | FixtureStatus::InProgress
        ) {
            return Err(TournamentError::FixtureNotPlayable);
        }
        let p1 = fixture.player1;
        let p2 = fixture.player2.ok_or(TournamentError::FixtureNotPlayable)?;

        fixture.status = FixtureStatus::Completed;
        fixture.score = Some((score1, score2));

        if let Some(standing) = self.standings.get_mut(&p1) {
            standing.record_result(score1, score2, p2);
        }
        if let Some(standing) = self.standings.get_mut(&p2) {
            standing.record_result(score2, score1, p1);
        }

        Ok(self.advance_round())
    }

    /// Forfeit: a decisive win at the fixed substituted score
    pub fn apply_forfeit(
        &mut self,
        match_id: Uuid,
        winner_id: i64,
    ) -> Result<Advance, TournamentError> {
        let fixture = self
            .find_fixture(match_id)
            .ok_or(TournamentError::FixtureNotFound)?;
        let (win, lose) = FORFEIT_SCORE;
        let (score1, score2) = if fixture.player1 == winner_id {
            (win, lose)
        } else {
            (lose, win)
        };
        self.apply_result(match_id, score1, score2)
    }

    fn advance_round(&mut self) -> Advance {
        if !self.round_complete(self.current_round) {
            return Advance::RoundContinues;
        }

        match self.format {
            TournamentFormat::RoundRobin => {
                if self.is_complete() {
                    Advance::Complete {
                        champion: self.champion(),
                    }
                } else {
                    // All fixtures pre-exist; only the round cursor moves
                    self.current_round += 1;
                    Advance::NextRound(self.current_round)
                }
            }
            TournamentFormat::Swiss => {
                if self.current_round >= self.total_rounds {
                    return Advance::Complete {
                        champion: self.champion(),
                    };
                }
                self.current_round += 1;
                let round = self.current_round;

                let ranked: Vec<i64> = self.ranked_standings().iter().map(|s| s.player_id).collect();
                let byes: HashSet<i64> = self
                    .standings
                    .values()
                    .filter(|s| s.byes_taken > 0)
                    .map(|s| s.player_id)
                    .collect();
                let played: HashSet<(i64, i64)> = self
                    .standings
                    .values()
                    .flat_map(|s| {
                        s.opponents_faced
                            .iter()
                            .map(move |&o| (s.player_id.min(o), s.player_id.max(o)))
                    })
                    .collect();

                let fixtures = pairing::swiss_round(
                    round,
                    &ranked,
                    |p| byes.contains(&p),
                    |a, b| played.contains(&(a.min(b), a.max(b))),
                );
                self.register_fixtures(fixtures);
                Advance::NextRound(round)
            }
        }
    }

    fn champion(&self) -> i64 {
        self.ranked_standings()
            .first()
            .map(|s| s.player_id)
            .unwrap_or_default()
    }

    fn ranked_standings(&self) -> Vec<&Standing> {
        let mut ranked: Vec<&Standing> = self.standings.values().collect();
        // Seed order keeps equal records deterministic before tie-breaks
        ranked.sort_by_key(|s| {
            self.players
                .iter()
                .position(|p| p.id == s.player_id)
                .unwrap_or(usize::MAX)
        });
        leaderboard_order(&mut ranked);
        ranked
    }

    /// Leaderboard rows, ranked 1..N, computed on demand
    pub fn standing_views(&self) -> Vec<StandingView> {
        self.ranked_standings()
            .iter()
            .enumerate()
            .map(|(idx, s)| StandingView {
                rank: idx as u32 + 1,
                player_id: s.player_id,
                display_name: self
                    .players
                    .iter()
                    .find(|p| p.id == s.player_id)
                    .map(|p| p.display_name.clone())
                    .unwrap_or_default(),
                match_points: s.match_points,
                wins: s.wins,
                draws: s.draws,
                losses: s.losses,
                score_differential: s.score_differential,
                total_points_scored: s.total_points_scored,
                byes_taken: s.byes_taken,
            })
            .collect()
    }

    pub fn fixture_views(&self) -> Vec<FixtureView> {
        self.fixtures
            .iter()
            .map(|f| FixtureView {
                match_id: f.match_id,
                round: f.round,
                player1: f.player1,
                player2: f.player2,
                status: f.status,
                score1: f.score.map(|s| s.0),
                score2: f.score.map(|s| s.1),
            })
            .collect()
    }

    fn state_msg(&self) -> ServerMsg {
        ServerMsg::TournamentState {
            tournament_id: self.id,
            current_round: self.current_round,
            total_rounds: self.total_rounds,
            fixtures: self.fixture_views(),
            standings: self.standing_views(),
        }
    }
}

/// Owns all live tournaments; one lock per instance serializes result
/// application and the round-completion check.
pub struct TournamentService {
    tournaments: DashMap<Uuid, Arc<Mutex<Tournament>>>,
    registry: Arc<MatchRegistry>,
    fanout: Arc<Fanout>,
}

impl TournamentService {
    pub fn new(registry: Arc<MatchRegistry>, fanout: Arc<Fanout>) -> Self {
        Self {
            tournaments: DashMap::new(),
            registry,
            fanout,
        }
    }

    pub fn active_tournaments(&self) -> usize {
        self.tournaments.len()
    }

    /// Create a tournament from assembled participants, broadcast the
    /// opening bracket, and spawn the first round's matches.
    pub async fn create(&self, players: Vec<PlayerBrief>) -> Result<Uuid, TournamentError> {
        let participants: Vec<TournamentPlayer> = players
            .iter()
            .map(|p| TournamentPlayer {
                id: p.user_id,
                display_name: p.display_name.clone(),
                is_temporary: false,
            })
            .collect();

        let id = Uuid::new_v4();
        let mut rng = ChaCha8Rng::from_entropy();
        let mut tournament = Tournament::new(id, participants, &mut rng)?;

        info!(
            tournament_id = %id,
            player_count = tournament.players.len(),
            format = ?tournament.format,
            "Tournament created"
        );

        self.fanout
            .send_many(&tournament.player_ids(), &tournament.state_msg());
        self.spawn_due_matches(&mut tournament);

        self.tournaments.insert(id, Arc::new(Mutex::new(tournament)));
        Ok(id)
    }

    /// Hand spawnable fixtures to the match registry
    fn spawn_due_matches(&self, tournament: &mut Tournament) {
        for fixture in tournament.spawnable_fixtures() {
            let p2 = match fixture.player2 {
                Some(p2) => p2,
                None => continue,
            };
            let briefs: Vec<PlayerBrief> = [fixture.player1, p2]
                .iter()
                .filter_map(|&id| tournament.player_brief(id))
                .collect();

            tournament.mark_in_progress(fixture.match_id);
            self.registry.create_match(
                fixture.match_id,
                MatchMode::Remote,
                Some(tournament.id),
                &briefs,
            );
        }
    }

    /// Consume a finished match's outcome
    pub async fn apply_outcome(&self, outcome: MatchOutcome) {
        let Some(tournament_id) = outcome.tournament_id else {
            return;
        };
        let Some(entry) = self.tournaments.get(&tournament_id).map(|e| e.value().clone()) else {
            warn!(
                tournament_id = %tournament_id,
                match_id = %outcome.match_id,
                "Outcome for unknown tournament"
            );
            return;
        };

        let mut tournament = entry.lock().await;
        match tournament.apply_result(outcome.match_id, outcome.score1, outcome.score2) {
            Ok(advance) => self.after_advance(&mut tournament, advance),
            Err(e) => {
                warn!(
                    tournament_id = %tournament_id,
                    match_id = %outcome.match_id,
                    error = %e,
                    "Failed to apply match outcome"
                );
            }
        }
    }

    /// Recovery for a fixture whose live match object is gone; re-derives
    /// both player ids from the fixture list. Only one of the fixture's own
    /// players may submit. A decisive submission is booked as a forfeit at
    /// the substituted score.
    pub async fn recover_result(
        &self,
        user_id: i64,
        match_id: Uuid,
        score1: u32,
        score2: u32,
    ) -> Result<(), TournamentError> {
        if self.registry.contains(&match_id) {
            return Err(TournamentError::MatchStillLive);
        }

        let entries: Vec<Arc<Mutex<Tournament>>> = self
            .tournaments
            .iter()
            .map(|e| e.value().clone())
            .collect();

        for entry in entries {
            let mut tournament = entry.lock().await;
            let Some(fixture) = tournament.find_fixture(match_id) else {
                continue;
            };
            if fixture.player1 != user_id && fixture.player2 != Some(user_id) {
                return Err(TournamentError::NotFixtureParticipant);
            }
            let winner_id = match score1.cmp(&score2) {
                std::cmp::Ordering::Greater => Some(fixture.player1),
                std::cmp::Ordering::Less => fixture.player2,
                std::cmp::Ordering::Equal => None,
            };

            let advance = match winner_id {
                Some(winner) => tournament.apply_forfeit(match_id, winner)?,
                None => tournament.apply_result(match_id, score1, score2)?,
            };
            self.after_advance(&mut tournament, advance);
            return Ok(());
        }

        Err(TournamentError::FixtureNotFound)
    }

    /// Broadcast the updated bracket and act on the round state machine
    fn after_advance(&self, tournament: &mut Tournament, advance: Advance) {
        let players = tournament.player_ids();
        self.fanout.send_many(&players, &tournament.state_msg());

        match advance {
            Advance::RoundContinues => {
                self.spawn_due_matches(tournament);
            }
            Advance::NextRound(round) => {
                info!(tournament_id = %tournament.id, round, "Tournament advanced");
                self.spawn_due_matches(tournament);
            }
            Advance::Complete { champion } => {
                info!(tournament_id = %tournament.id, champion, "Tournament complete");
                self.fanout.send_many(
                    &players,
                    &ServerMsg::TournamentOver {
                        tournament_id: tournament.id,
                        champion,
                        standings: tournament.standing_views(),
                    },
                );
                self.tournaments.remove(&tournament.id);
            }
        }
    }

    /// Standings snapshot for the HTTP surface
    pub async fn standings(
        &self,
        tournament_id: Uuid,
    ) -> Result<(Vec<FixtureView>, Vec<StandingView>), TournamentError> {
        let entry = self
            .tournaments
            .get(&tournament_id)
            .map(|e| e.value().clone())
            .ok_or(TournamentError::NotFound)?;
        let tournament = entry.lock().await;
        Ok((tournament.fixture_views(), tournament.standing_views()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::ResultsClient;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;
    use tokio::sync::mpsc;

    fn service() -> TournamentService {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".into(),
            results_api_url: "http://localhost:9".into(),
            results_api_key: "test".into(),
            jwt_secret: "test".into(),
            client_origin: "http://localhost".into(),
        };
        let fanout = Arc::new(Fanout::new());
        let store = Arc::new(ResultsClient::new(&config));
        let (outcome_tx, _outcome_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(MatchRegistry::new(fanout.clone(), store, outcome_tx));
        TournamentService::new(registry, fanout)
    }

    fn players(n: usize) -> Vec<TournamentPlayer> {
        (1..=n as i64)
            .map(|id| TournamentPlayer {
                id,
                display_name: format!("Player {}", id),
                is_temporary: false,
            })
            .collect()
    }

    fn new_tournament(n: usize, seed: u64) -> Tournament {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Tournament::new(Uuid::new_v4(), players(n), &mut rng).unwrap()
    }

    /// Play out every open fixture of the current round with the given
    /// score for player1's side.
    fn complete_round(t: &mut Tournament, score: (u32, u32)) -> Advance {
        let open: Vec<Uuid> = t
            .fixtures
            .iter()
            .filter(|f| {
                f.round == t.current_round
                    && matches!(f.status, FixtureStatus::Pending | FixtureStatus::InProgress)
            })
            .map(|f| f.match_id)
            .collect();
        let mut last = Advance::RoundContinues;
        for match_id in open {
            last = t.apply_result(match_id, score.0, score.1).unwrap();
        }
        last
    }

    #[test]
    fn player_count_outside_range_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(matches!(
            Tournament::new(Uuid::new_v4(), players(2), &mut rng),
            Err(TournamentError::InvalidPlayerCount(2))
        ));
        assert!(matches!(
            Tournament::new(Uuid::new_v4(), players(9), &mut rng),
            Err(TournamentError::InvalidPlayerCount(9))
        ));
    }

    #[test]
    fn four_players_derive_round_robin_with_all_fixtures_upfront() {
        let t = new_tournament(4, 1);
        assert_eq!(t.format, TournamentFormat::RoundRobin);
        assert_eq!(t.total_rounds, 3);
        assert_eq!(t.fixtures.len(), 6);
        assert_eq!(t.current_round, 1);
    }

    #[test]
    fn round_robin_runs_to_completion() {
        let mut t = new_tournament(4, 2);
        let mut advance = Advance::RoundContinues;
        let mut guard = 0;
        while !t.is_complete() {
            advance = complete_round(&mut t, (5, 3));
            guard += 1;
            assert!(guard <= 3, "round robin should finish within 3 rounds");
        }
        assert!(matches!(advance, Advance::Complete { .. }));
        assert!(t
            .fixtures
            .iter()
            .all(|f| f.status == FixtureStatus::Completed));

        // Every pair played exactly once
        let pairs: HashSet<(i64, i64)> = t
            .fixtures
            .iter()
            .map(|f| {
                let p2 = f.player2.unwrap();
                (f.player1.min(p2), f.player1.max(p2))
            })
            .collect();
        assert_eq!(pairs.len(), 6);
    }

    #[test]
    fn five_players_derive_swiss_with_three_rounds() {
        let t = new_tournament(5, 3);
        assert_eq!(t.format, TournamentFormat::Swiss);
        assert_eq!(t.total_rounds, SWISS_ROUNDS);
        // Round 1: two pairings plus a bye
        assert_eq!(t.fixtures.len(), 3);
        assert_eq!(
            t.fixtures
                .iter()
                .filter(|f| f.status == FixtureStatus::Bye)
                .count(),
            1
        );
    }

    #[test]
    fn swiss_bye_goes_to_lowest_ranked_without_one_and_no_repeats() {
        let mut t = new_tournament(5, 4);
        let round1_bye = t
            .fixtures
            .iter()
            .find(|f| f.status == FixtureStatus::Bye)
            .unwrap()
            .player1;

        let advance = complete_round(&mut t, (5, 2));
        assert_eq!(advance, Advance::NextRound(2));

        let round2_bye = t
            .fixtures
            .iter()
            .find(|f| f.round == 2 && f.player2.is_none())
            .unwrap()
            .player1;
        assert_ne!(round2_bye, round1_bye);

        // No pairing in round 2 repeats a round 1 matchup
        let round1_pairs: HashSet<(i64, i64)> = t
            .fixtures
            .iter()
            .filter(|f| f.round == 1 && f.player2.is_some())
            .map(|f| {
                let p2 = f.player2.unwrap();
                (f.player1.min(p2), f.player1.max(p2))
            })
            .collect();
        for f in t.fixtures.iter().filter(|f| f.round == 2) {
            if let Some(p2) = f.player2 {
                assert!(!round1_pairs.contains(&(f.player1.min(p2), f.player1.max(p2))));
            }
        }
    }

    #[test]
    fn swiss_tournament_completes_with_at_most_one_bye_each() {
        for seed in 0..10 {
            let mut t = new_tournament(5, seed);
            while !t.is_complete() {
                complete_round(&mut t, (4, 1));
            }
            assert_eq!(t.current_round, 3);

            for standing in t.standings.values() {
                assert!(standing.byes_taken <= 1, "player took multiple byes");
                let unique: HashSet<i64> = standing.opponents_faced.iter().copied().collect();
                assert_eq!(
                    unique.len(),
                    standing.opponents_faced.len(),
                    "player faced the same opponent twice"
                );
            }
        }
    }

    #[test]
    fn forfeit_books_substituted_score() {
        let mut t = new_tournament(4, 5);
        let fixture = t.fixtures[0].clone();
        let loser = fixture.player2.unwrap();
        t.apply_forfeit(fixture.match_id, fixture.player1).unwrap();

        let completed = t.find_fixture(fixture.match_id).unwrap();
        assert_eq!(completed.status, FixtureStatus::Completed);
        assert_eq!(completed.score, Some(FORFEIT_SCORE));

        let winner_standing = &t.standings[&fixture.player1];
        assert_eq!(winner_standing.match_points, 3);
        assert_eq!(winner_standing.score_differential, 5);
        let loser_standing = &t.standings[&loser];
        assert_eq!(loser_standing.losses, 1);
    }

    #[test]
    fn completed_fixture_rejects_a_second_result() {
        let mut t = new_tournament(4, 6);
        let match_id = t.fixtures[0].match_id;
        t.apply_result(match_id, 3, 1).unwrap();
        assert!(matches!(
            t.apply_result(match_id, 0, 3),
            Err(TournamentError::FixtureNotPlayable)
        ));
    }

    #[test]
    fn standing_views_assign_ranks_in_leaderboard_order() {
        let mut t = new_tournament(4, 7);
        while !t.is_complete() {
            complete_round(&mut t, (6, 2));
        }
        let views = t.standing_views();
        assert_eq!(views.len(), 4);
        for (idx, view) in views.iter().enumerate() {
            assert_eq!(view.rank, idx as u32 + 1);
        }
        for pair in views.windows(2) {
            assert!(pair[0].match_points >= pair[1].match_points);
        }
    }

    #[tokio::test]
    async fn result_submission_is_limited_to_fixture_participants() {
        let svc = service();
        let t = new_tournament(4, 11);
        let tid = t.id;
        let fixture = t.fixtures[0].clone();
        let p1 = fixture.player1;
        svc.tournaments.insert(tid, Arc::new(Mutex::new(t)));

        // An authenticated outsider cannot forfeit someone else's fixture
        let err = svc
            .recover_result(999, fixture.match_id, 5, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, TournamentError::NotFixtureParticipant));
        {
            let entry = svc.tournaments.get(&tid).unwrap().value().clone();
            let t = entry.lock().await;
            let untouched = t.find_fixture(fixture.match_id).unwrap();
            assert_eq!(untouched.status, FixtureStatus::Pending);
            assert!(untouched.score.is_none());
        }

        // A participant's decisive submission books the forfeit
        svc.recover_result(p1, fixture.match_id, 5, 0).await.unwrap();
        let entry = svc.tournaments.get(&tid).unwrap().value().clone();
        let t = entry.lock().await;
        let completed = t.find_fixture(fixture.match_id).unwrap();
        assert_eq!(completed.status, FixtureStatus::Completed);
        assert_eq!(completed.score, Some(FORFEIT_SCORE));
    }

    #[test]
    fn spawnable_fixtures_never_double_book_a_player() {
        let mut t = new_tournament(3, 8);
        // Three pairs over two rounds: round 1 holds an overlapping pair
        let due = t.spawnable_fixtures();
        let mut seen = HashSet::new();
        for f in &due {
            assert!(seen.insert(f.player1));
            assert!(seen.insert(f.player2.unwrap()));
        }
        for f in due {
            t.mark_in_progress(f.match_id);
        }
        assert!(t.spawnable_fixtures().is_empty());
    }
}
