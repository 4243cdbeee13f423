//! Match state and authoritative tick loop

use dashmap::DashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::store::ResultsClient;
use crate::util::time::{unix_millis, MATCH_DURATION_MS, TICK_DURATION_MICROS};
use crate::ws::fanout::Fanout;
use crate::ws::protocol::{
    ActiveEffect, Ball, MatchMode, MatchResult, MatchSnapshot, MatchStatus, MatchTimer,
    MoveDirection, Paddle, PlayerBrief, PowerUp, ServerMsg,
};

use super::physics::{GoalAgainst, PhysicsSystem};
use super::powerups::PowerUpSystem;
use super::MatchCommand;

/// A bound player slot. The identity is stable for the match's lifetime;
/// reconnects replace only the transport handle, which lives in the fan-out.
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub user_id: i64,
    pub display_name: String,
}

/// Match state (owned exclusively by the match task)
pub struct MatchState {
    pub id: Uuid,
    pub mode: MatchMode,
    pub tournament_id: Option<Uuid>,
    pub status: MatchStatus,
    pub tick: u64,
    pub started_at: Option<u64>,
    pub elapsed_ms: u64,
    pub remaining_ms: u64,
    pub ball: Ball,
    pub paddles: [Paddle; 2],
    pub score: (u32, u32),
    pub power_ups: Vec<PowerUp>,
    pub active_effect: Option<ActiveEffect>,
    pub last_spawn_ms: u64,
    pub slots: [Option<PlayerSlot>; 2],
    pub winner: Option<u8>,
    pub result: Option<MatchResult>,
    pub rng: ChaCha8Rng,
}

impl MatchState {
    pub fn new(id: Uuid, mode: MatchMode, tournament_id: Option<Uuid>, seed: u64) -> Self {
        Self {
            id,
            mode,
            tournament_id,
            status: MatchStatus::Waiting,
            tick: 0,
            started_at: None,
            elapsed_ms: 0,
            remaining_ms: MATCH_DURATION_MS,
            ball: PhysicsSystem::spawn_ball(),
            paddles: [PhysicsSystem::spawn_paddle(1), PhysicsSystem::spawn_paddle(2)],
            score: (0, 0),
            power_ups: Vec::new(),
            active_effect: None,
            last_spawn_ms: 0,
            slots: [None, None],
            winner: None,
            result: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Bind a user to the next open slot, returning the assigned role.
    /// A user already bound keeps their slot (reconnection case). In local
    /// mode the host fills both slots at once.
    pub fn join(&mut self, user_id: i64, display_name: String, now_ms: u64) -> Option<u8> {
        if let Some(role) = self.role_of(user_id) {
            return Some(role);
        }

        let slot = PlayerSlot {
            user_id,
            display_name,
        };

        match self.mode {
            MatchMode::Local => {
                self.slots = [Some(slot.clone()), Some(slot)];
                self.start(now_ms);
                Some(1)
            }
            MatchMode::Remote => {
                if self.slots[0].is_none() {
                    self.slots[0] = Some(slot);
                    Some(1)
                } else if self.slots[1].is_none() {
                    self.slots[1] = Some(slot);
                    // Second distinct joiner starts the loop
                    self.start(now_ms);
                    Some(2)
                } else {
                    None
                }
            }
        }
    }

    /// Which slot a user occupies, if any
    pub fn role_of(&self, user_id: i64) -> Option<u8> {
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.as_ref().is_some_and(|s| s.user_id == user_id) {
                return Some(idx as u8 + 1);
            }
        }
        None
    }

    fn start(&mut self, now_ms: u64) {
        if self.status != MatchStatus::Waiting {
            return;
        }
        self.status = MatchStatus::Playing;
        self.started_at = Some(now_ms);
        self.last_spawn_ms = 0;
        PhysicsSystem::serve_ball(&mut self.ball, &mut self.rng);
    }

    /// Apply paddle input. Invalid role/player combinations are dropped
    /// silently so spectators and stale clients cannot disturb the match.
    pub fn apply_input(&mut self, user_id: i64, player: u8, direction: MoveDirection) {
        if !(1..=2).contains(&player) {
            return;
        }
        let allowed = match self.mode {
            // The host drives both paddles
            MatchMode::Local => self.role_of(user_id) == Some(1),
            // Each player drives exactly their own paddle
            MatchMode::Remote => self.role_of(user_id) == Some(player),
        };
        if allowed {
            self.paddles[(player - 1) as usize].moving = direction;
        }
    }

    /// Advance the simulation one tick. Returns true once the match reached
    /// its terminal state during this tick.
    pub fn run_tick(&mut self, now_ms: u64) -> bool {
        if self.status != MatchStatus::Playing {
            return false;
        }
        self.tick += 1;

        // (1) match clock, clamped at zero
        let started = self.started_at.unwrap_or(now_ms);
        self.elapsed_ms = now_ms.saturating_sub(started);
        self.remaining_ms = MATCH_DURATION_MS.saturating_sub(self.elapsed_ms);

        // (2) paddles
        for paddle in &mut self.paddles {
            PhysicsSystem::step_paddle(paddle);
        }

        // (3) power-up spawn
        if PowerUpSystem::spawn_due(self.elapsed_ms, self.last_spawn_ms, self.power_ups.len()) {
            self.power_ups.push(PowerUpSystem::spawn(&mut self.rng));
            self.last_spawn_ms = self.elapsed_ms;
        }

        // (4) ball integration
        PhysicsSystem::integrate_ball(&mut self.ball);

        // (5) collisions
        PhysicsSystem::collide_walls(&mut self.ball);
        PhysicsSystem::collide_paddles(
            &mut self.ball,
            &self.paddles[0],
            &self.paddles[1],
            &mut self.rng,
        );

        // (6) goal detection
        if let Some(against) = PhysicsSystem::detect_goal(&self.ball) {
            match against {
                GoalAgainst::Left => self.score.1 += 1,
                GoalAgainst::Right => self.score.0 += 1,
            }
            // Effects do not survive a goal; the reset restores base speed/size
            self.active_effect = None;
            PhysicsSystem::reset_ball(&mut self.ball, against, &mut self.rng);
        }

        // (7) power-up pickup, at most one per tick
        if let Some(idx) = PowerUpSystem::find_pickup(&self.ball, &self.power_ups) {
            let picked = self.power_ups.remove(idx);
            // Effects are exclusive: undo the previous one first
            if let Some(effect) = self.active_effect.take() {
                PowerUpSystem::revert_effect(&mut self.ball, effect.kind);
            }
            PowerUpSystem::apply_effect(&mut self.ball, picked.kind);
            self.active_effect = Some(PowerUpSystem::effect_for(picked.kind, now_ms));
        }

        // (8) effect expiry, exact inverse scaling
        if let Some(effect) = self.active_effect {
            if now_ms >= effect.expires_at {
                PowerUpSystem::revert_effect(&mut self.ball, effect.kind);
                self.active_effect = None;
            }
        }

        // (9) win check
        if self.remaining_ms == 0 {
            self.finish_by_score();
            return true;
        }

        false
    }

    /// Settle winner/result from the current score
    pub fn finish_by_score(&mut self) {
        self.status = MatchStatus::Finished;
        let (s1, s2) = self.score;
        if s1 > s2 {
            self.winner = Some(1);
            self.result = Some(MatchResult::Win);
        } else if s2 > s1 {
            self.winner = Some(2);
            self.result = Some(MatchResult::Win);
        } else {
            self.winner = None;
            self.result = Some(MatchResult::Draw);
        }
    }

    /// Full authoritative state for broadcast
    pub fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            match_id: self.id,
            mode: self.mode,
            status: self.status,
            tick: self.tick,
            timer: MatchTimer {
                elapsed_ms: self.elapsed_ms,
                remaining_ms: self.remaining_ms,
            },
            ball: self.ball.clone(),
            paddle1: self.paddles[0].clone(),
            paddle2: self.paddles[1].clone(),
            score1: self.score.0,
            score2: self.score.1,
            power_ups: self.power_ups.clone(),
            active_effect: self.active_effect,
        }
    }

    /// Distinct user ids bound to this match
    pub fn bound_users(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .slots
            .iter()
            .flatten()
            .map(|slot| slot.user_id)
            .collect();
        ids.dedup();
        ids
    }
}

/// Terminal outcome reported to the tournament layer
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub match_id: Uuid,
    pub tournament_id: Option<Uuid>,
    pub mode: MatchMode,
    pub player1: Option<i64>,
    pub player2: Option<i64>,
    pub score1: u32,
    pub score2: u32,
    pub winner: Option<u8>,
    pub result: MatchResult,
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub cmd_tx: mpsc::Sender<MatchCommand>,
    pub player_count: Arc<std::sync::atomic::AtomicUsize>,
}

impl MatchHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// The authoritative game match task
pub struct GameMatch {
    state: MatchState,
    cmd_rx: mpsc::Receiver<MatchCommand>,
    fanout: Arc<Fanout>,
    store: Arc<ResultsClient>,
    outcome_tx: mpsc::UnboundedSender<MatchOutcome>,
    player_count: Arc<std::sync::atomic::AtomicUsize>,
    stop_requested: bool,
}

impl GameMatch {
    pub fn new(
        id: Uuid,
        mode: MatchMode,
        tournament_id: Option<Uuid>,
        seed: u64,
        fanout: Arc<Fanout>,
        store: Arc<ResultsClient>,
        outcome_tx: mpsc::UnboundedSender<MatchOutcome>,
    ) -> (Self, MatchHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let player_count = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let handle = MatchHandle {
            id,
            cmd_tx,
            player_count: player_count.clone(),
        };

        let game_match = Self {
            state: MatchState::new(id, mode, tournament_id, seed),
            cmd_rx,
            fanout,
            store,
            outcome_tx,
            player_count,
            stop_requested: false,
        };

        (game_match, handle)
    }

    /// Run the authoritative tick loop until the match finishes
    pub async fn run(mut self) {
        info!(match_id = %self.state.id, mode = ?self.state.mode, "Match task started");

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            self.process_commands();

            if self.stop_requested && self.state.status != MatchStatus::Finished {
                // Early stop settles on the current score
                self.state.finish_by_score();
            }

            let finished = self.state.run_tick(unix_millis());

            if self.state.status == MatchStatus::Playing {
                self.broadcast(ServerMsg::Snapshot {
                    state: self.state.snapshot(),
                });
            }

            if finished || self.state.status == MatchStatus::Finished {
                break;
            }
        }

        self.finish().await;
    }

    /// Drain pending commands; inputs only set flags read by the next tick
    fn process_commands(&mut self) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            match cmd {
                MatchCommand::Join {
                    user_id,
                    display_name,
                } => {
                    match self.state.join(user_id, display_name, unix_millis()) {
                        Some(role) => {
                            info!(
                                match_id = %self.state.id,
                                user_id,
                                role,
                                "Player bound to match slot"
                            );
                        }
                        None => {
                            warn!(match_id = %self.state.id, user_id, "Join with no open slot");
                        }
                    }
                    self.player_count.store(
                        self.state.bound_users().len(),
                        std::sync::atomic::Ordering::Relaxed,
                    );
                }
                MatchCommand::Input {
                    user_id,
                    player,
                    direction,
                } => {
                    self.state.apply_input(user_id, player, direction);
                }
                MatchCommand::Stop => {
                    self.stop_requested = true;
                }
            }
        }
    }

    /// Best-effort fan-out to the bound slots; a closed or absent connection
    /// is skipped, never fatal to the tick.
    fn broadcast(&self, msg: ServerMsg) {
        for user_id in self.state.bound_users() {
            self.fanout.send_to(user_id, msg.clone());
        }
    }

    /// Persist the result, emit the terminal event, report the outcome
    async fn finish(self) {
        let state = &self.state;
        let result = state.result.unwrap_or(MatchResult::Draw);

        info!(
            match_id = %state.id,
            score1 = state.score.0,
            score2 = state.score.1,
            winner = ?state.winner,
            "Match finished"
        );

        let player1 = state.slots[0].as_ref().map(|s| s.user_id);
        let player2 = state.slots[1].as_ref().map(|s| s.user_id);

        // Loss of a save must not block the terminal broadcast
        if let Err(e) = self
            .store
            .save_match_result(
                player1,
                player2,
                state.score.0,
                state.score.1,
                state.mode,
                state.tournament_id,
            )
            .await
        {
            error!(match_id = %state.id, error = %e, "Failed to persist match result");
        }

        self.broadcast(ServerMsg::GameOver {
            match_id: state.id,
            result,
            winner: state.winner,
            score1: state.score.0,
            score2: state.score.1,
        });

        let outcome = MatchOutcome {
            match_id: state.id,
            tournament_id: state.tournament_id,
            mode: state.mode,
            player1,
            player2,
            score1: state.score.0,
            score2: state.score.1,
            winner: state.winner,
            result,
        };

        if self.outcome_tx.send(outcome).is_err() {
            warn!(match_id = %state.id, "Outcome channel closed");
        }
    }
}

/// Registry of all active matches. The only component allowed to start or
/// stop a simulation's tick task.
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
    player_matches: DashMap<i64, Uuid>,
    fanout: Arc<Fanout>,
    store: Arc<ResultsClient>,
    outcome_tx: mpsc::UnboundedSender<MatchOutcome>,
}

impl MatchRegistry {
    pub fn new(
        fanout: Arc<Fanout>,
        store: Arc<ResultsClient>,
        outcome_tx: mpsc::UnboundedSender<MatchOutcome>,
    ) -> Self {
        Self {
            matches: DashMap::new(),
            player_matches: DashMap::new(),
            fanout,
            store,
            outcome_tx,
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.matches.contains_key(id)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches.iter().map(|m| m.value().player_count()).sum()
    }

    /// Current match a user is seated in
    pub fn match_of(&self, user_id: i64) -> Option<Uuid> {
        self.player_matches.get(&user_id).map(|r| *r)
    }

    /// Create a match, spawn its tick task, and bind the given players.
    /// Destroys the registry entry once the task's terminal broadcast ran.
    pub fn create_match(
        self: &Arc<Self>,
        match_id: Uuid,
        mode: MatchMode,
        tournament_id: Option<Uuid>,
        players: &[PlayerBrief],
    ) -> MatchHandle {
        let seed = rand::random::<u64>();
        let (game_match, handle) = GameMatch::new(
            match_id,
            mode,
            tournament_id,
            seed,
            self.fanout.clone(),
            self.store.clone(),
            self.outcome_tx.clone(),
        );

        self.matches.insert(match_id, handle.clone());
        for player in players {
            self.player_matches.insert(player.user_id, match_id);
        }

        info!(
            match_id = %match_id,
            mode = ?mode,
            player_count = players.len(),
            "Created match"
        );

        let registry = self.clone();
        let player_ids: Vec<i64> = players.iter().map(|p| p.user_id).collect();
        tokio::spawn(async move {
            game_match.run().await;

            registry.matches.remove(&match_id);
            for pid in player_ids {
                // Only unbind if the user is still mapped to this match
                registry
                    .player_matches
                    .remove_if(&pid, |_, mid| *mid == match_id);
            }
            info!(match_id = %match_id, "Match removed from registry");
        });

        // Bind each player to a slot
        for player in players {
            let join = MatchCommand::Join {
                user_id: player.user_id,
                display_name: player.display_name.clone(),
            };
            if handle.cmd_tx.try_send(join).is_err() {
                warn!(match_id = %match_id, user_id = player.user_id, "Failed to send join");
            }
        }

        handle
    }

    /// Route paddle input to the sender's current match. Unknown users and
    /// full channels are dropped silently (next tick self-corrects).
    pub fn route_input(&self, user_id: i64, player: u8, direction: MoveDirection) {
        if let Some(match_id) = self.match_of(user_id) {
            if let Some(handle) = self.get(&match_id) {
                let _ = handle.cmd_tx.try_send(MatchCommand::Input {
                    user_id,
                    player,
                    direction,
                });
            }
        }
    }

    /// Idempotent stop: the loop exits once, repeated signals are no-ops
    pub fn stop(&self, id: &Uuid) {
        if let Some(handle) = self.get(id) {
            let _ = handle.cmd_tx.try_send(MatchCommand::Stop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::time::MATCH_DURATION_MS;

    fn remote_match() -> MatchState {
        let mut state = MatchState::new(Uuid::new_v4(), MatchMode::Remote, None, 42);
        assert_eq!(state.join(10, "Ada".into(), 1_000), Some(1));
        assert_eq!(state.status, MatchStatus::Waiting);
        assert_eq!(state.join(20, "Grace".into(), 1_000), Some(2));
        assert_eq!(state.status, MatchStatus::Playing);
        state
    }

    #[test]
    fn second_distinct_joiner_starts_the_clock() {
        let state = remote_match();
        assert_eq!(state.started_at, Some(1_000));
        assert_eq!(state.ball.dx.abs(), super::super::physics::BALL_BASE_SPEED);
    }

    #[test]
    fn rejoin_keeps_slot_identity() {
        let mut state = remote_match();
        assert_eq!(state.join(10, "Ada".into(), 2_000), Some(1));
        assert_eq!(state.bound_users(), vec![10, 20]);
    }

    #[test]
    fn local_host_occupies_both_paddles() {
        let mut state = MatchState::new(Uuid::new_v4(), MatchMode::Local, None, 1);
        assert_eq!(state.join(7, "Host".into(), 500), Some(1));
        assert_eq!(state.status, MatchStatus::Playing);
        assert_eq!(state.bound_users(), vec![7]);

        state.apply_input(7, 1, MoveDirection::Up);
        state.apply_input(7, 2, MoveDirection::Down);
        assert_eq!(state.paddles[0].moving, MoveDirection::Up);
        assert_eq!(state.paddles[1].moving, MoveDirection::Down);
    }

    #[test]
    fn remote_input_is_scoped_to_own_slot() {
        let mut state = remote_match();
        // Player 2 cannot drive paddle 1; silently ignored
        state.apply_input(20, 1, MoveDirection::Up);
        assert_eq!(state.paddles[0].moving, MoveDirection::None);
        // Spectators are ignored too
        state.apply_input(99, 2, MoveDirection::Down);
        assert_eq!(state.paddles[1].moving, MoveDirection::None);

        state.apply_input(20, 2, MoveDirection::Down);
        assert_eq!(state.paddles[1].moving, MoveDirection::Down);
    }

    #[test]
    fn clock_expiry_declares_higher_score_winner() {
        let mut state = remote_match();
        state.score = (7, 3);
        let finished = state.run_tick(1_000 + MATCH_DURATION_MS);
        assert!(finished);
        assert_eq!(state.status, MatchStatus::Finished);
        assert_eq!(state.winner, Some(1));
        assert_eq!(state.result, Some(MatchResult::Win));
        assert_eq!(state.remaining_ms, 0);
    }

    #[test]
    fn clock_expiry_with_equal_score_is_a_draw() {
        let mut state = remote_match();
        state.score = (4, 4);
        assert!(state.run_tick(1_000 + MATCH_DURATION_MS + 50));
        assert_eq!(state.winner, None);
        assert_eq!(state.result, Some(MatchResult::Draw));
    }

    #[test]
    fn goal_scores_opponent_and_clears_effect() {
        let mut state = remote_match();
        state.active_effect = Some(crate::ws::protocol::ActiveEffect {
            kind: crate::ws::protocol::PowerUpKind::SizeUp,
            expires_at: u64::MAX,
        });
        // Push the ball fully past the left edge
        state.ball.x = -(state.ball.size / 2.0) - 10.0;
        state.ball.dx = -1.0;
        state.ball.dy = 0.0;
        state.run_tick(2_000);
        assert_eq!(state.score, (0, 1));
        assert!(state.active_effect.is_none());
        assert_eq!(state.ball.x, super::super::physics::FIELD_WIDTH / 2.0);
        assert_eq!(state.ball.dx, -super::super::physics::BALL_BASE_SPEED);
    }

    #[test]
    fn power_up_spawns_are_capped_at_two() {
        let mut state = remote_match();
        // Three spawn intervals elapse one tick at a time
        for i in 1..=3 {
            let now = 1_000 + i * crate::game::powerups::SPAWN_INTERVAL_MS;
            state.run_tick(now);
            // Keep the ball mid-field so nothing else interferes
            state.ball.x = super::super::physics::FIELD_WIDTH / 2.0;
            state.ball.dx = 0.0;
            state.ball.dy = 0.0;
        }
        assert!(state.power_ups.len() <= 2);
    }

    #[test]
    fn effect_expiry_reverses_scaling_exactly() {
        let mut state = remote_match();
        state.ball.x = 200.0;
        state.ball.y = 100.0;
        state.ball.dx = 4.0;
        state.ball.dy = 0.0;
        let base_size = state.ball.size;
        state.active_effect = Some(crate::ws::protocol::ActiveEffect {
            kind: crate::ws::protocol::PowerUpKind::SizeUp,
            expires_at: 5_000,
        });
        state.ball.size *= crate::game::powerups::SIZE_UP_FACTOR;

        state.run_tick(6_000);
        assert!(state.active_effect.is_none());
        assert_eq!(state.ball.size, base_size);
    }
}
