//! Power-up spawning, pickup and effect lifecycle

use rand::Rng;
use uuid::Uuid;

use crate::ws::protocol::{ActiveEffect, Ball, PowerUp, PowerUpKind};

use super::physics::{FIELD_HEIGHT, FIELD_WIDTH};

/// Seconds between spawn attempts
pub const SPAWN_INTERVAL_MS: u64 = 10_000;
/// At most this many power-ups on the field at once
pub const MAX_ACTIVE: usize = 2;
/// Power-up diameter (circular pickup test uses half of this)
pub const POWER_UP_SIZE: f32 = 24.0;
/// Placement inset from the walls
pub const WALL_INSET: f32 = 40.0;
/// How long an effect lasts once picked up
pub const EFFECT_DURATION_MS: u64 = 8_000;

/// Ball speed scaling factors
pub const SPEED_UP_FACTOR: f32 = 1.5;
pub const SPEED_DOWN_FACTOR: f32 = 0.5;
/// Ball size scaling factors
pub const SIZE_UP_FACTOR: f32 = 2.0;
pub const SIZE_DOWN_FACTOR: f32 = 0.5;

/// Stateless power-up routines; the match state owns the collections
pub struct PowerUpSystem;

impl PowerUpSystem {
    /// Spawn a power-up at a random inset point with a uniformly drawn kind
    pub fn spawn<R: Rng>(rng: &mut R) -> PowerUp {
        let kind = match rng.gen_range(0..4) {
            0 => PowerUpKind::SpeedUp,
            1 => PowerUpKind::SpeedDown,
            2 => PowerUpKind::SizeUp,
            _ => PowerUpKind::SizeDown,
        };
        PowerUp {
            id: Uuid::new_v4(),
            x: rng.gen_range(WALL_INSET..FIELD_WIDTH - WALL_INSET),
            y: rng.gen_range(WALL_INSET..FIELD_HEIGHT - WALL_INSET),
            kind,
        }
    }

    /// Whether another spawn is due
    pub fn spawn_due(elapsed_ms: u64, last_spawn_ms: u64, active: usize) -> bool {
        active < MAX_ACTIVE && elapsed_ms.saturating_sub(last_spawn_ms) >= SPAWN_INTERVAL_MS
    }

    /// Circular pickup test between ball centre and power-up centre.
    /// Returns the index of the first overlapping power-up; at most one
    /// pickup is resolved per tick.
    pub fn find_pickup(ball: &Ball, power_ups: &[PowerUp]) -> Option<usize> {
        let radius = ball.size / 2.0 + POWER_UP_SIZE / 2.0;
        power_ups.iter().position(|p| {
            let dx = ball.x - p.x;
            let dy = ball.y - p.y;
            dx * dx + dy * dy <= radius * radius
        })
    }

    /// Apply an effect's scaling to the ball
    pub fn apply_effect(ball: &mut Ball, kind: PowerUpKind) {
        match kind {
            PowerUpKind::SpeedUp => {
                ball.dx *= SPEED_UP_FACTOR;
                ball.dy *= SPEED_UP_FACTOR;
            }
            PowerUpKind::SpeedDown => {
                ball.dx *= SPEED_DOWN_FACTOR;
                ball.dy *= SPEED_DOWN_FACTOR;
            }
            PowerUpKind::SizeUp => ball.size *= SIZE_UP_FACTOR,
            PowerUpKind::SizeDown => ball.size *= SIZE_DOWN_FACTOR,
        }
    }

    /// Reverse an effect's scaling exactly (division by the same factor)
    pub fn revert_effect(ball: &mut Ball, kind: PowerUpKind) {
        match kind {
            PowerUpKind::SpeedUp => {
                ball.dx /= SPEED_UP_FACTOR;
                ball.dy /= SPEED_UP_FACTOR;
            }
            PowerUpKind::SpeedDown => {
                ball.dx /= SPEED_DOWN_FACTOR;
                ball.dy /= SPEED_DOWN_FACTOR;
            }
            PowerUpKind::SizeUp => ball.size /= SIZE_UP_FACTOR,
            PowerUpKind::SizeDown => ball.size /= SIZE_DOWN_FACTOR,
        }
    }

    /// Build the active-effect record for a fresh pickup
    pub fn effect_for(kind: PowerUpKind, now_ms: u64) -> ActiveEffect {
        ActiveEffect {
            kind,
            expires_at: now_ms + EFFECT_DURATION_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::PhysicsSystem;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn spawn_respects_inset_and_cap() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..100 {
            let p = PowerUpSystem::spawn(&mut rng);
            assert!(p.x >= WALL_INSET && p.x <= FIELD_WIDTH - WALL_INSET);
            assert!(p.y >= WALL_INSET && p.y <= FIELD_HEIGHT - WALL_INSET);
        }
        assert!(!PowerUpSystem::spawn_due(SPAWN_INTERVAL_MS, 0, MAX_ACTIVE));
        assert!(PowerUpSystem::spawn_due(SPAWN_INTERVAL_MS, 0, 0));
        assert!(!PowerUpSystem::spawn_due(SPAWN_INTERVAL_MS - 1, 0, 0));
    }

    #[test]
    fn pickup_uses_combined_radius() {
        let mut ball = PhysicsSystem::spawn_ball();
        let radius = ball.size / 2.0 + POWER_UP_SIZE / 2.0;
        let near = PowerUp {
            id: Uuid::new_v4(),
            x: ball.x + radius - 0.1,
            y: ball.y,
            kind: PowerUpKind::SpeedUp,
        };
        let far = PowerUp {
            id: Uuid::new_v4(),
            x: ball.x + radius + 0.1,
            y: ball.y,
            kind: PowerUpKind::SpeedUp,
        };
        assert_eq!(PowerUpSystem::find_pickup(&ball, &[far.clone()]), None);
        assert_eq!(PowerUpSystem::find_pickup(&ball, &[far, near]), Some(1));
        ball.x = 0.0;
        assert_eq!(PowerUpSystem::find_pickup(&ball, &[]), None);
    }

    #[test]
    fn revert_is_exact_inverse_of_apply() {
        for kind in [
            PowerUpKind::SpeedUp,
            PowerUpKind::SpeedDown,
            PowerUpKind::SizeUp,
            PowerUpKind::SizeDown,
        ] {
            let mut ball = PhysicsSystem::spawn_ball();
            ball.dx = 5.0;
            ball.dy = -3.0;
            let before = (ball.dx, ball.dy, ball.size);
            PowerUpSystem::apply_effect(&mut ball, kind);
            PowerUpSystem::revert_effect(&mut ball, kind);
            assert_eq!((ball.dx, ball.dy, ball.size), before);
        }
    }

    #[test]
    fn speed_up_scales_both_components() {
        let mut ball = PhysicsSystem::spawn_ball();
        ball.dx = 4.0;
        ball.dy = 2.0;
        PowerUpSystem::apply_effect(&mut ball, PowerUpKind::SpeedUp);
        assert_eq!(ball.dx, 6.0);
        assert_eq!(ball.dy, 3.0);
        assert_eq!(ball.size, 12.0);
    }
}
