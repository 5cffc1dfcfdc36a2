//! Paddle and ball movement, wall and paddle bounces

use rand::Rng;

use super::state::{Ball, Direction, GameConstants, GameState, Paddle, Side};

/// Physics system for advancing a match by one tick
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Move a paddle along its intent, clamped to the canvas
    pub fn move_paddle(paddle: &mut Paddle, constants: &GameConstants, dt: f32) {
        let max_y = constants.canvas_height - constants.paddle_height;
        paddle.y = (paddle.y + paddle.direction.sign() * constants.paddle_speed * dt).clamp(0.0, max_y);
    }

    /// Advance paddles and ball. Returns the side that scored, if the ball
    /// left the canvas this tick.
    pub fn step(state: &mut GameState, dt: f32) -> Option<Side> {
        let constants = state.constants.clone();
        Self::move_paddle(&mut state.left, &constants, dt);
        Self::move_paddle(&mut state.right, &constants, dt);

        let ball = &mut state.ball;
        ball.x += ball.vx * dt;
        ball.y += ball.vy * dt;

        Self::bounce_walls(ball, &constants);
        Self::bounce_paddle(ball, &state.left, Side::Left, &constants);
        Self::bounce_paddle(ball, &state.right, Side::Right, &constants);

        let half = constants.ball_size / 2.0;
        if ball.x + half < 0.0 {
            Some(Side::Right)
        } else if ball.x - half > constants.canvas_width {
            Some(Side::Left)
        } else {
            None
        }
    }

    fn bounce_walls(ball: &mut Ball, constants: &GameConstants) {
        let half = constants.ball_size / 2.0;
        if ball.y - half <= 0.0 {
            ball.y = half;
            ball.vy = ball.vy.abs();
        } else if ball.y + half >= constants.canvas_height {
            ball.y = constants.canvas_height - half;
            ball.vy = -ball.vy.abs();
        }
    }

    /// Reflect the ball off `paddle` when they overlap and the ball is
    /// heading toward it. The outgoing angle follows the hit offset from the
    /// paddle centre.
    fn bounce_paddle(ball: &mut Ball, paddle: &Paddle, side: Side, constants: &GameConstants) {
        let approaching = match side {
            Side::Left => ball.vx < 0.0,
            Side::Right => ball.vx > 0.0,
        };
        if !approaching {
            return;
        }

        let half = constants.ball_size / 2.0;
        let paddle_x = constants.paddle_x(side);
        let overlaps_x =
            ball.x - half <= paddle_x + constants.paddle_width && ball.x + half >= paddle_x;
        let overlaps_y =
            ball.y + half >= paddle.y && ball.y - half <= paddle.y + constants.paddle_height;
        if !overlaps_x || !overlaps_y {
            return;
        }

        let paddle_centre = paddle.y + constants.paddle_height / 2.0;
        let offset = ((ball.y - paddle_centre) / (constants.paddle_height / 2.0)).clamp(-1.0, 1.0);
        let angle = offset * constants.max_bounce_angle_deg.to_radians();
        let speed = (ball.speed() * constants.ball_speedup).min(constants.max_ball_speed);

        let (dir, x) = match side {
            Side::Left => (1.0, paddle_x + constants.paddle_width + half),
            Side::Right => (-1.0, paddle_x - half),
        };
        ball.x = x;
        ball.vx = dir * speed * angle.cos();
        ball.vy = speed * angle.sin();
    }

    /// Put the ball at the centre heading toward `toward`, at serve speed
    /// and a random angle of up to 30 degrees
    pub fn serve<R: Rng>(state: &mut GameState, toward: Side, rng: &mut R) {
        let constants = &state.constants;
        let angle = rng.gen_range(-30.0f32..=30.0).to_radians();
        let dir = match toward {
            Side::Left => -1.0,
            Side::Right => 1.0,
        };
        state.ball = Ball {
            x: constants.canvas_width / 2.0,
            y: constants.canvas_height / 2.0,
            vx: dir * constants.ball_speed * angle.cos(),
            vy: constants.ball_speed * angle.sin(),
        };
    }

    /// Centre the ball at rest, paddles centred and still
    pub fn reset_positions(state: &mut GameState) {
        let start_y = state.constants.paddle_start_y();
        for side in [Side::Left, Side::Right] {
            let paddle = state.paddle_mut(side);
            paddle.y = start_y;
            paddle.direction = Direction::None;
            paddle.last_input_seq = 0;
        }
        state.ball = Ball {
            x: state.constants.canvas_width / 2.0,
            y: state.constants.canvas_height / 2.0,
            vx: 0.0,
            vy: 0.0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::time::tick_delta;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn state() -> GameState {
        GameState::new(GameConstants::default())
    }

    #[test]
    fn reset_clears_paddle_intent_and_sequence() {
        let mut s = state();
        s.left.direction = Direction::Up;
        s.left.last_input_seq = 42;
        s.right.y = 0.0;
        PhysicsSystem::reset_positions(&mut s);
        assert_eq!(s.left.direction, Direction::None);
        assert_eq!(s.left.last_input_seq, 0);
        assert_eq!(s.right.y, s.constants.paddle_start_y());
        assert_eq!(s.ball.vx, 0.0);
    }

    #[test]
    fn paddles_stay_on_canvas() {
        let mut s = state();
        s.left.direction = Direction::Up;
        s.right.direction = Direction::Down;
        for _ in 0..600 {
            PhysicsSystem::step(&mut s, tick_delta());
        }
        assert_eq!(s.left.y, 0.0);
        assert_eq!(s.right.y, s.constants.canvas_height - s.constants.paddle_height);
    }

    #[test]
    fn ball_bounces_off_top_wall() {
        let mut s = state();
        s.ball = Ball { x: 400.0, y: 6.0, vx: 0.0, vy: -300.0 };
        PhysicsSystem::step(&mut s, tick_delta());
        assert!(s.ball.vy > 0.0);
        assert!(s.ball.y >= s.constants.ball_size / 2.0);
    }

    #[test]
    fn ball_stays_within_vertical_bounds() {
        let mut s = state();
        s.ball = Ball { x: 400.0, y: 250.0, vx: 0.0, vy: 850.0 };
        let half = s.constants.ball_size / 2.0;
        for _ in 0..1000 {
            PhysicsSystem::step(&mut s, tick_delta());
            assert!(s.ball.y >= half && s.ball.y <= s.constants.canvas_height - half);
        }
    }

    #[test]
    fn centre_hit_returns_straight_and_faster() {
        let mut s = state();
        let paddle_right_edge = s.constants.paddle_x(Side::Left) + s.constants.paddle_width;
        let centre = s.left.y + s.constants.paddle_height / 2.0;
        s.ball = Ball { x: paddle_right_edge + 6.0, y: centre, vx: -300.0, vy: 0.0 };

        assert_eq!(PhysicsSystem::step(&mut s, tick_delta()), None);
        assert!(s.ball.vx > 0.0);
        assert!(s.ball.vy.abs() < 1e-3);
        assert!((s.ball.speed() - 315.0).abs() < 0.01);
    }

    #[test]
    fn edge_hit_deflects_up_to_sixty_degrees() {
        let mut s = state();
        let paddle_x = s.constants.paddle_x(Side::Right);
        // Ball centre just above the paddle's top edge
        s.ball = Ball { x: paddle_x - 4.0, y: s.right.y - 2.0, vx: 300.0, vy: 0.0 };

        PhysicsSystem::step(&mut s, tick_delta());
        assert!(s.ball.vx < 0.0);
        assert!(s.ball.vy < 0.0);
        let angle = (s.ball.vy.abs() / s.ball.vx.abs()).atan().to_degrees();
        assert!((angle - 60.0).abs() < 0.5, "angle was {angle}");
    }

    #[test]
    fn speed_is_capped() {
        let mut s = state();
        let paddle_right_edge = s.constants.paddle_x(Side::Left) + s.constants.paddle_width;
        let centre = s.left.y + s.constants.paddle_height / 2.0;
        s.ball = Ball { x: paddle_right_edge + 6.0, y: centre, vx: -890.0, vy: 0.0 };
        PhysicsSystem::step(&mut s, tick_delta());
        assert!((s.ball.speed() - s.constants.max_ball_speed).abs() < 0.01);
    }

    #[test]
    fn missed_ball_scores_for_the_opposite_side() {
        let mut s = state();
        s.left.y = 0.0;
        s.ball = Ball { x: 10.0, y: 450.0, vx: -600.0, vy: 0.0 };
        let mut scored = None;
        for _ in 0..10 {
            if let Some(side) = PhysicsSystem::step(&mut s, tick_delta()) {
                scored = Some(side);
                break;
            }
        }
        assert_eq!(scored, Some(Side::Right));
    }

    #[test]
    fn serve_heads_toward_requested_side() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut s = state();
        PhysicsSystem::serve(&mut s, Side::Left, &mut rng);
        assert!(s.ball.vx < 0.0);
        assert!((s.ball.speed() - s.constants.ball_speed).abs() < 0.01);
        PhysicsSystem::serve(&mut s, Side::Right, &mut rng);
        assert!(s.ball.vx > 0.0);
        assert_eq!(s.ball.x, s.constants.canvas_width / 2.0);
    }
}
