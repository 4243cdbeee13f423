//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Match mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Single host drives both paddles
    Local,
    /// Two connected players, one paddle each
    Remote,
}

/// Match lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Waiting,
    Playing,
    Finished,
}

/// Paddle movement direction set by player input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    #[default]
    None,
    Up,
    Down,
}

/// Terminal match result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResult {
    Win,
    Draw,
}

/// Power-up kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpKind {
    SpeedUp,
    SpeedDown,
    SizeUp,
    SizeDown,
}

/// Matchmaking queue selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// 1v1 queue, drains exact pairs
    Single,
    /// Tournament queue, drains 3-8 entrants
    Tournament,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Paddle movement input for the player's current match
    PaddleMove {
        /// Paddle slot being driven (1 or 2; local mode hosts drive both)
        player: u8,
        direction: MoveDirection,
    },

    /// Start a local match (host occupies both paddles)
    StartLocal,

    /// Host-authoritative result submission, used to recover a tournament
    /// fixture whose live match object is gone
    SubmitResult {
        match_id: Uuid,
        score1: u32,
        score2: u32,
    },

    /// Create a lobby room
    CreateRoom {
        max_players: usize,
    },

    /// Fetch the caller's current room, if any
    GetRoom,

    /// Invite another user into the caller's room
    InviteToRoom {
        user_id: i64,
    },

    /// Accept or decline a pending invite
    RespondInvite {
        room_id: Uuid,
        accept: bool,
    },

    /// Join a room by its share code
    JoinRoomByCode {
        code: String,
    },

    /// Leave the current room
    LeaveRoom,

    /// Host starts the room (2 players -> match, 3-8 -> tournament)
    StartRoom,

    /// Enter a matchmaking queue
    JoinQueue {
        queue: QueueKind,
    },

    /// Leave the matchmaking queue
    LeaveQueue,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        user_id: i64,
        display_name: String,
        server_time: u64,
    },

    /// Current state of the caller's room
    RoomState {
        room: RoomSnapshot,
    },

    /// An invite arrived
    InviteReceived {
        room_id: Uuid,
        host_id: i64,
        host_name: String,
    },

    /// The caller's room was destroyed
    RoomClosed {
        room_id: Uuid,
        reason: String,
    },

    /// Queued confirmation
    Queued {
        queue: QueueKind,
        position: usize,
    },

    /// 1v1 matchmaking produced a match
    MatchFound {
        match_id: Uuid,
        room_id: Uuid,
        opponent: PlayerBrief,
    },

    /// Tournament matchmaking filled a bracket
    TournamentFound {
        tournament_id: Uuid,
        room_id: Uuid,
        players: Vec<PlayerBrief>,
    },

    /// Per-tick state snapshot of a running match
    Snapshot {
        state: MatchSnapshot,
    },

    /// Terminal match event, distinct from ordinary snapshots
    GameOver {
        match_id: Uuid,
        result: MatchResult,
        /// Winning paddle slot (1 or 2) on a decisive result
        winner: Option<u8>,
        score1: u32,
        score2: u32,
    },

    /// Fixture list + standings after every result application
    TournamentState {
        tournament_id: Uuid,
        current_round: u32,
        total_rounds: u32,
        fixtures: Vec<FixtureView>,
        standings: Vec<StandingView>,
    },

    /// Tournament completed
    TournamentOver {
        tournament_id: Uuid,
        champion: i64,
        standings: Vec<StandingView>,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Minimal player identity for lobby/matchmaking events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerBrief {
    pub user_id: i64,
    pub display_name: String,
}

/// Room state as seen by its members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: Uuid,
    /// Share code for join-by-code
    pub code: String,
    pub host_id: i64,
    pub max_players: usize,
    pub players: Vec<PlayerBrief>,
    pub invited: Vec<i64>,
    pub matchmade: bool,
    pub tournament: bool,
}

/// Ball state (x/y is the ball centre)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
    /// Current diameter (scaled by size effects)
    pub size: f32,
}

/// Paddle state (x/y is the top-left corner)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paddle {
    pub x: f32,
    pub y: f32,
    /// Current height (constant for now, kept on the wire for clients)
    pub height: f32,
    pub moving: MoveDirection,
}

/// Power-up waiting on the field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerUp {
    pub id: Uuid,
    pub x: f32,
    pub y: f32,
    pub kind: PowerUpKind,
}

/// Effect currently applied to the ball
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ActiveEffect {
    pub kind: PowerUpKind,
    /// Unix millis at which the effect is reversed
    pub expires_at: u64,
}

/// Match clock
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchTimer {
    pub elapsed_ms: u64,
    pub remaining_ms: u64,
}

/// Full authoritative state snapshot, broadcast every tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: Uuid,
    pub mode: MatchMode,
    pub status: MatchStatus,
    pub tick: u64,
    pub timer: MatchTimer,
    pub ball: Ball,
    pub paddle1: Paddle,
    pub paddle2: Paddle,
    pub score1: u32,
    pub score2: u32,
    pub power_ups: Vec<PowerUp>,
    pub active_effect: Option<ActiveEffect>,
}

/// Fixture status on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureStatus {
    Pending,
    InProgress,
    Completed,
    Bye,
}

/// One scheduled pairing within a tournament round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureView {
    pub match_id: Uuid,
    pub round: u32,
    pub player1: i64,
    /// None marks a bye fixture
    pub player2: Option<i64>,
    pub status: FixtureStatus,
    pub score1: Option<u32>,
    pub score2: Option<u32>,
}

/// One leaderboard row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingView {
    pub rank: u32,
    pub player_id: i64,
    pub display_name: String,
    pub match_points: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub score_differential: i64,
    pub total_points_scored: u64,
    pub byes_taken: u32,
}
