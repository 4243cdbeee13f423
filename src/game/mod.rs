//! Match simulation modules

pub mod engine;
pub mod physics;
pub mod powerups;

pub use engine::{GameMatch, MatchHandle, MatchOutcome, MatchRegistry};

use crate::ws::protocol::MoveDirection;

/// Commands delivered into a running match's tick loop
#[derive(Debug, Clone)]
pub enum MatchCommand {
    /// Bind a user to the next open slot (idempotent per identity)
    Join { user_id: i64, display_name: String },
    /// Paddle input; only sets a flag the next tick reads
    Input {
        user_id: i64,
        player: u8,
        direction: MoveDirection,
    },
    /// Idempotent stop signal
    Stop,
}
