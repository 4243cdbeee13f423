//! Ball and paddle physics for the fixed-tick simulation

use rand::Rng;

use crate::ws::protocol::{Ball, MoveDirection, Paddle};

/// Field dimensions in world units
pub const FIELD_WIDTH: f32 = 800.0;
pub const FIELD_HEIGHT: f32 = 350.0;

/// Paddle dimensions and per-tick speed
pub const PADDLE_WIDTH: f32 = 12.0;
pub const PADDLE_HEIGHT: f32 = 80.0;
pub const PADDLE_SPEED: f32 = 6.0;
/// Horizontal inset of each paddle from its wall
pub const PADDLE_INSET: f32 = 10.0;

/// Ball diameter and base horizontal speed
pub const BALL_SIZE: f32 = 12.0;
pub const BALL_BASE_SPEED: f32 = 5.0;
/// Vertical serve speed magnitude (sign randomized per serve)
pub const SERVE_DY: f32 = 3.0;

/// Spin imparted per unit of offset between ball centre and paddle centre
pub const SPIN_FACTOR: f32 = 0.1;
/// Below this vertical speed a rally could stay horizontal forever
pub const MIN_VERTICAL_SPEED: f32 = 1.0;
/// Magnitude floor of the randomized kick that breaks such rallies
pub const KICK_VERTICAL_SPEED: f32 = 1.5;

/// Which side a goal was scored against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalAgainst {
    /// Ball exited the left edge, point for player 2
    Left,
    /// Ball exited the right edge, point for player 1
    Right,
}

/// Stateless physics routines operating on wire-shaped state
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Initial paddle for slot 1 or 2, vertically centred
    pub fn spawn_paddle(slot: u8) -> Paddle {
        let x = if slot == 1 {
            PADDLE_INSET
        } else {
            FIELD_WIDTH - PADDLE_INSET - PADDLE_WIDTH
        };
        Paddle {
            x,
            y: (FIELD_HEIGHT - PADDLE_HEIGHT) / 2.0,
            height: PADDLE_HEIGHT,
            moving: MoveDirection::None,
        }
    }

    /// Ball at field centre, stationary until the first serve
    pub fn spawn_ball() -> Ball {
        Ball {
            x: FIELD_WIDTH / 2.0,
            y: FIELD_HEIGHT / 2.0,
            dx: 0.0,
            dy: 0.0,
            size: BALL_SIZE,
        }
    }

    /// Move a paddle one tick toward its held direction, clamped to the field
    pub fn step_paddle(paddle: &mut Paddle) {
        match paddle.moving {
            MoveDirection::Up => paddle.y -= PADDLE_SPEED,
            MoveDirection::Down => paddle.y += PADDLE_SPEED,
            MoveDirection::None => {}
        }
        paddle.y = paddle.y.clamp(0.0, FIELD_HEIGHT - paddle.height);
    }

    /// Integrate ball position by its velocity
    pub fn integrate_ball(ball: &mut Ball) {
        ball.x += ball.dx;
        ball.y += ball.dy;
    }

    /// Reflect off the top/bottom walls, clamping position in-bounds
    pub fn collide_walls(ball: &mut Ball) {
        let half = ball.size / 2.0;
        if ball.y - half <= 0.0 {
            ball.y = half;
            ball.dy = ball.dy.abs();
        } else if ball.y + half >= FIELD_HEIGHT {
            ball.y = FIELD_HEIGHT - half;
            ball.dy = -ball.dy.abs();
        }
    }

    /// Resolve a collision against either paddle.
    ///
    /// Reverses horizontal velocity toward the field centre and imparts
    /// vertical spin proportional to the contact offset. A near-horizontal
    /// rebound gets a randomized vertical kick so rallies cannot degenerate
    /// into an infinite horizontal exchange.
    pub fn collide_paddles<R: Rng>(
        ball: &mut Ball,
        paddle1: &Paddle,
        paddle2: &Paddle,
        rng: &mut R,
    ) -> bool {
        let half = ball.size / 2.0;

        // Left paddle: only while the ball travels toward it
        if ball.dx < 0.0
            && ball.x - half <= paddle1.x + PADDLE_WIDTH
            && ball.x + half >= paddle1.x
            && Self::overlaps_vertically(ball, paddle1)
        {
            ball.dx = ball.dx.abs();
            Self::apply_spin(ball, paddle1, rng);
            return true;
        }

        // Right paddle
        if ball.dx > 0.0
            && ball.x + half >= paddle2.x
            && ball.x - half <= paddle2.x + PADDLE_WIDTH
            && Self::overlaps_vertically(ball, paddle2)
        {
            ball.dx = -ball.dx.abs();
            Self::apply_spin(ball, paddle2, rng);
            return true;
        }

        false
    }

    fn overlaps_vertically(ball: &Ball, paddle: &Paddle) -> bool {
        let half = ball.size / 2.0;
        ball.y + half >= paddle.y && ball.y - half <= paddle.y + paddle.height
    }

    fn apply_spin<R: Rng>(ball: &mut Ball, paddle: &Paddle, rng: &mut R) {
        let offset = ball.y - (paddle.y + paddle.height / 2.0);
        ball.dy += offset * SPIN_FACTOR;

        if ball.dy.abs() < MIN_VERTICAL_SPEED {
            let magnitude = rng.gen_range(KICK_VERTICAL_SPEED..KICK_VERTICAL_SPEED + 1.0);
            let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            ball.dy = sign * magnitude;
        }
    }

    /// Goal detection: the ball must fully exit an edge
    pub fn detect_goal(ball: &Ball) -> Option<GoalAgainst> {
        let half = ball.size / 2.0;
        if ball.x + half < 0.0 {
            Some(GoalAgainst::Left)
        } else if ball.x - half > FIELD_WIDTH {
            Some(GoalAgainst::Right)
        } else {
            None
        }
    }

    /// Re-centre the ball after a goal, serving toward the side that was just
    /// scored against, with a randomized vertical sign. Size and speed return
    /// to base values (goals clear any active effect first).
    pub fn reset_ball<R: Rng>(ball: &mut Ball, against: GoalAgainst, rng: &mut R) {
        ball.x = FIELD_WIDTH / 2.0;
        ball.y = FIELD_HEIGHT / 2.0;
        ball.size = BALL_SIZE;
        ball.dx = match against {
            GoalAgainst::Left => -BALL_BASE_SPEED,
            GoalAgainst::Right => BALL_BASE_SPEED,
        };
        ball.dy = if rng.gen_bool(0.5) {
            SERVE_DY
        } else {
            -SERVE_DY
        };
    }

    /// First serve of the match, direction randomized
    pub fn serve_ball<R: Rng>(ball: &mut Ball, rng: &mut R) {
        let against = if rng.gen_bool(0.5) {
            GoalAgainst::Left
        } else {
            GoalAgainst::Right
        };
        Self::reset_ball(ball, against, rng);
    }
}
