//! Room / matchmaking coordinator
//!
//! Owns pre-match lobbies and the matchmaking queues, and hands ready rooms
//! off to the match registry (2 players) or the tournament engine (3-8).

pub mod queue;

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::game::MatchRegistry;
use crate::tournament::{TournamentError, TournamentService};
use crate::ws::fanout::Fanout;
use crate::ws::protocol::{MatchMode, PlayerBrief, QueueKind, RoomSnapshot, ServerMsg};

use queue::{MatchmakingQueue, QueuedPlayer};

/// Length of the join-by-code share code
const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Room command rejections. Returned synchronously; no state is mutated on
/// the error path.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("Already in a room")]
    AlreadyInRoom,

    #[error("Room is full")]
    RoomFull,

    #[error("Room not found")]
    NotFound,

    #[error("Not in a room")]
    NotInRoom,

    #[error("Only the host can do that")]
    NotHost,

    #[error("No pending invite for that room")]
    NotInvited,

    #[error("User is already in a room")]
    InviteeInRoom,

    #[error("Room size must be between 2 and 8")]
    BadRoomSize,

    #[error("A room starts with 2 players for a match or 3-8 for a tournament, got {0}")]
    BadPlayerCount(usize),

    #[error(transparent)]
    Tournament(#[from] TournamentError),
}

impl RoomError {
    /// Stable machine-readable code for the wire
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::AlreadyInRoom => "already_in_room",
            RoomError::RoomFull => "room_full",
            RoomError::NotFound => "room_not_found",
            RoomError::NotInRoom => "not_in_room",
            RoomError::NotHost => "not_host",
            RoomError::NotInvited => "not_invited",
            RoomError::InviteeInRoom => "invitee_in_room",
            RoomError::BadRoomSize => "bad_room_size",
            RoomError::BadPlayerCount(_) => "bad_player_count",
            RoomError::Tournament(_) => "tournament_error",
        }
    }
}

/// A pre-match lobby
pub struct Room {
    pub id: Uuid,
    pub code: String,
    pub host_id: i64,
    /// Join order matters: the earliest remaining joiner inherits the host
    /// role if the host leaves
    pub joined: Vec<PlayerBrief>,
    pub invited: Vec<i64>,
    pub max_players: usize,
    pub matchmade: bool,
    pub tournament: bool,
}

impl Room {
    fn contains(&self, user_id: i64) -> bool {
        self.joined.iter().any(|p| p.user_id == user_id)
    }

    fn is_full(&self) -> bool {
        self.joined.len() >= self.max_players
    }

    fn member_ids(&self) -> Vec<i64> {
        self.joined.iter().map(|p| p.user_id).collect()
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id,
            code: self.code.clone(),
            host_id: self.host_id,
            max_players: self.max_players,
            players: self.joined.clone(),
            invited: self.invited.clone(),
            matchmade: self.matchmade,
            tournament: self.tournament,
        }
    }
}

/// Coordinates all lobbies and matchmaking queues. Operations on a single
/// room are serialized by its mutex; different rooms proceed concurrently.
pub struct RoomService {
    rooms: DashMap<Uuid, Arc<Mutex<Room>>>,
    codes: DashMap<String, Uuid>,
    user_rooms: DashMap<i64, Uuid>,
    single_queue: Mutex<MatchmakingQueue>,
    tournament_queue: Mutex<MatchmakingQueue>,
    registry: Arc<MatchRegistry>,
    tournaments: Arc<TournamentService>,
    fanout: Arc<Fanout>,
}

impl RoomService {
    pub fn new(
        registry: Arc<MatchRegistry>,
        tournaments: Arc<TournamentService>,
        fanout: Arc<Fanout>,
    ) -> Self {
        Self {
            rooms: DashMap::new(),
            codes: DashMap::new(),
            user_rooms: DashMap::new(),
            single_queue: Mutex::new(MatchmakingQueue::single()),
            tournament_queue: Mutex::new(MatchmakingQueue::tournament()),
            registry,
            tournaments,
            fanout,
        }
    }

    pub fn active_rooms(&self) -> usize {
        self.rooms.len()
    }

    pub async fn queue_sizes(&self) -> (usize, usize) {
        let single = self.single_queue.lock().await.len();
        let tournament = self.tournament_queue.lock().await.len();
        (single, tournament)
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (0..ROOM_CODE_LEN)
                .map(|_| ROOM_CODE_CHARS[rng.gen_range(0..ROOM_CODE_CHARS.len())] as char)
                .collect();
            if !self.codes.contains_key(&code) {
                return code;
            }
        }
    }

    /// Seat a user in a fresh room, enforcing the one-room-per-user
    /// invariant through the user->room map.
    fn seat_host(&self, host: &PlayerBrief, room_id: Uuid) -> Result<(), RoomError> {
        match self.user_rooms.entry(host.user_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RoomError::AlreadyInRoom),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(room_id);
                Ok(())
            }
        }
    }

    /// Create a host-owned lobby
    pub async fn create_room(
        &self,
        host: PlayerBrief,
        max_players: usize,
    ) -> Result<Uuid, RoomError> {
        if !(2..=8).contains(&max_players) {
            return Err(RoomError::BadRoomSize);
        }

        let room_id = Uuid::new_v4();
        self.seat_host(&host, room_id)?;

        let code = self.generate_code();
        let room = Room {
            id: room_id,
            code: code.clone(),
            host_id: host.user_id,
            joined: vec![host.clone()],
            invited: Vec::new(),
            max_players,
            matchmade: false,
            tournament: max_players > 2,
        };

        info!(room_id = %room_id, host_id = host.user_id, code, "Room created");

        self.fanout.send_to(
            host.user_id,
            ServerMsg::RoomState {
                room: room.snapshot(),
            },
        );
        self.codes.insert(code, room_id);
        self.rooms.insert(room_id, Arc::new(Mutex::new(room)));
        Ok(room_id)
    }

    fn room_entry(&self, room_id: Uuid) -> Result<Arc<Mutex<Room>>, RoomError> {
        self.rooms
            .get(&room_id)
            .map(|e| e.value().clone())
            .ok_or(RoomError::NotFound)
    }

    /// Push the caller's current room snapshot, if any
    pub async fn send_current_room(&self, user_id: i64) -> Result<(), RoomError> {
        let room_id = self
            .user_rooms
            .get(&user_id)
            .map(|r| *r)
            .ok_or(RoomError::NotInRoom)?;
        let entry = self.room_entry(room_id)?;
        let room = entry.lock().await;
        self.fanout.send_to(
            user_id,
            ServerMsg::RoomState {
                room: room.snapshot(),
            },
        );
        Ok(())
    }

    /// Invite another user; rejected if the invitee is already seated
    pub async fn invite(&self, inviter: i64, invitee_id: i64) -> Result<(), RoomError> {
        let room_id = self
            .user_rooms
            .get(&inviter)
            .map(|r| *r)
            .ok_or(RoomError::NotInRoom)?;
        if self.user_rooms.contains_key(&invitee_id) {
            return Err(RoomError::InviteeInRoom);
        }

        let entry = self.room_entry(room_id)?;
        let mut room = entry.lock().await;

        if !room.invited.contains(&invitee_id) {
            room.invited.push(invitee_id);
        }

        let host_name = room
            .joined
            .iter()
            .find(|p| p.user_id == room.host_id)
            .map(|p| p.display_name.clone())
            .unwrap_or_default();

        self.fanout.send_to(
            invitee_id,
            ServerMsg::InviteReceived {
                room_id,
                host_id: room.host_id,
                host_name,
            },
        );
        self.broadcast_room(&room);
        Ok(())
    }

    /// Accept or decline a pending invite. Accepting a full room drops the
    /// invite and tells the invitee so.
    pub async fn respond_invite(
        &self,
        user: PlayerBrief,
        room_id: Uuid,
        accept: bool,
    ) -> Result<(), RoomError> {
        let entry = self.room_entry(room_id)?;
        let mut room = entry.lock().await;

        let invite_pos = room
            .invited
            .iter()
            .position(|&id| id == user.user_id)
            .ok_or(RoomError::NotInvited)?;

        if !accept {
            room.invited.remove(invite_pos);
            self.broadcast_room(&room);
            return Ok(());
        }

        if room.is_full() {
            room.invited.remove(invite_pos);
            self.broadcast_room(&room);
            return Err(RoomError::RoomFull);
        }

        self.seat_host(&user, room_id)?;
        room.invited.remove(invite_pos);
        room.joined.push(user);
        self.broadcast_room(&room);
        Ok(())
    }

    /// Join-by-code: room must exist, not be full, and not already hold the
    /// caller. Rejections leave `joined` untouched.
    pub async fn join_by_code(&self, user: PlayerBrief, code: &str) -> Result<(), RoomError> {
        let room_id = self
            .codes
            .get(&code.to_uppercase())
            .map(|r| *r)
            .ok_or(RoomError::NotFound)?;
        let entry = self.room_entry(room_id)?;
        let mut room = entry.lock().await;

        if room.contains(user.user_id) {
            return Err(RoomError::AlreadyInRoom);
        }
        if room.is_full() {
            return Err(RoomError::RoomFull);
        }

        self.seat_host(&user, room_id)?;
        room.invited.retain(|&id| id != user.user_id);
        room.joined.push(user);
        self.broadcast_room(&room);
        Ok(())
    }

    /// Leave the current room: host role transfers to the earliest remaining
    /// joiner, and an emptied room is destroyed.
    pub async fn leave_room(&self, user_id: i64) -> Result<(), RoomError> {
        let (_, room_id) = self
            .user_rooms
            .remove(&user_id)
            .ok_or(RoomError::NotInRoom)?;
        let entry = self.room_entry(room_id)?;
        let mut room = entry.lock().await;

        room.joined.retain(|p| p.user_id != user_id);

        if room.joined.is_empty() {
            info!(room_id = %room_id, "Room emptied, destroying");
            self.codes.remove(&room.code);
            self.fanout.send_many(
                &room.invited,
                &ServerMsg::RoomClosed {
                    room_id,
                    reason: "empty".into(),
                },
            );
            drop(room);
            self.rooms.remove(&room_id);
            return Ok(());
        }

        if room.host_id == user_id {
            room.host_id = room.joined[0].user_id;
            info!(room_id = %room_id, new_host = room.host_id, "Host role transferred");
        }
        self.broadcast_room(&room);
        Ok(())
    }

    /// Host-only hand-off: 2 players becomes a remote match, 3-8 a
    /// tournament. The room is consumed by the hand-off.
    pub async fn start_room(&self, user_id: i64) -> Result<(), RoomError> {
        let room_id = self
            .user_rooms
            .get(&user_id)
            .map(|r| *r)
            .ok_or(RoomError::NotInRoom)?;
        let entry = self.room_entry(room_id)?;
        let room = entry.lock().await;

        if room.host_id != user_id {
            return Err(RoomError::NotHost);
        }
        self.hand_off(room).await
    }

    /// Move a ready room's players into a match or a tournament and retire
    /// the room.
    async fn hand_off(
        &self,
        room: tokio::sync::MutexGuard<'_, Room>,
    ) -> Result<(), RoomError> {
        let players = room.joined.clone();
        let room_id = room.id;

        match players.len() {
            2 => {
                let match_id = Uuid::new_v4();
                self.registry
                    .create_match(match_id, MatchMode::Remote, None, &players);
                for (idx, player) in players.iter().enumerate() {
                    let opponent = players[1 - idx].clone();
                    self.fanout.send_to(
                        player.user_id,
                        ServerMsg::MatchFound {
                            match_id,
                            room_id,
                            opponent,
                        },
                    );
                }
            }
            3..=8 => {
                let tournament_id = self.tournaments.create(players.clone()).await?;
                self.fanout.send_many(
                    &room.member_ids(),
                    &ServerMsg::TournamentFound {
                        tournament_id,
                        room_id,
                        players: players.clone(),
                    },
                );
            }
            n => return Err(RoomError::BadPlayerCount(n)),
        }

        // The lobby's job is done
        self.codes.remove(&room.code);
        self.fanout.send_many(
            &room.invited,
            &ServerMsg::RoomClosed {
                room_id,
                reason: "started".into(),
            },
        );
        for player in &players {
            self.user_rooms.remove(&player.user_id);
        }
        drop(room);
        self.rooms.remove(&room_id);
        Ok(())
    }

    /// Enter a matchmaking queue. Draining is attempted immediately; it is
    /// never time-based.
    pub async fn join_queue(&self, user: PlayerBrief, kind: QueueKind) -> Result<(), RoomError> {
        if self.user_rooms.contains_key(&user.user_id) {
            return Err(RoomError::AlreadyInRoom);
        }

        let entrant = QueuedPlayer::new(user.user_id, user.display_name.clone());
        let drained = {
            let mut queue = match kind {
                QueueKind::Single => self.single_queue.lock().await,
                QueueKind::Tournament => self.tournament_queue.lock().await,
            };
            let position = queue.enqueue(entrant);
            self.fanout.send_to(
                user.user_id,
                ServerMsg::Queued {
                    queue: kind,
                    position,
                },
            );
            queue.try_drain()
        };

        if let Some(batch) = drained {
            self.form_matchmade_room(batch, kind).await?;
        }
        Ok(())
    }

    pub async fn leave_queue(&self, user_id: i64) {
        self.single_queue.lock().await.dequeue(user_id);
        self.tournament_queue.lock().await.dequeue(user_id);
    }

    /// Build the matchmade room for a drained batch and hand it off at once
    async fn form_matchmade_room(
        &self,
        batch: Vec<QueuedPlayer>,
        kind: QueueKind,
    ) -> Result<(), RoomError> {
        let players: Vec<PlayerBrief> = batch.iter().map(|p| p.brief()).collect();
        let room_id = Uuid::new_v4();
        let code = self.generate_code();

        let room = Room {
            id: room_id,
            code: code.clone(),
            host_id: players[0].user_id,
            joined: players.clone(),
            invited: Vec::new(),
            max_players: batch.len().max(2),
            matchmade: true,
            tournament: kind == QueueKind::Tournament,
        };

        info!(
            room_id = %room_id,
            player_count = players.len(),
            queue = ?kind,
            "Matchmade room formed"
        );

        for player in &players {
            // A queued user already seated elsewhere was rejected at enqueue;
            // the map insert here is purely bookkeeping for the hand-off
            self.user_rooms.insert(player.user_id, room_id);
        }
        self.codes.insert(code, room_id);
        let entry = Arc::new(Mutex::new(room));
        self.rooms.insert(room_id, entry.clone());

        let guard = entry.lock().await;
        self.broadcast_room(&guard);
        self.hand_off(guard).await
    }

    /// Connection-closed cleanup: drop the user from the queues and their
    /// room, if any.
    pub async fn handle_disconnect(&self, user_id: i64) {
        self.leave_queue(user_id).await;
        let _ = self.leave_room(user_id).await;
    }

    fn broadcast_room(&self, room: &Room) {
        self.fanout.send_many(
            &room.member_ids(),
            &ServerMsg::RoomState {
                room: room.snapshot(),
            },
        );
    }
}
