use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::games::Seat;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HockeyConfig {
    pub width: f32,
    pub height: f32,
    pub paddle_radius: f32,
    pub puck_radius: f32,
    /// Velocity multiplier applied every tick.
    pub friction: f32,
    pub max_speed: f32,
    pub goal_min_x: f32,
    pub goal_max_x: f32,
    /// Speed added to the puck on every paddle contact.
    pub hit_boost: f32,
    pub punch: f32,
    /// How far from center a reset puck starts, toward the side that conceded.
    pub reset_offset: f32,
    pub goal_cooldown_ms: u64,
    pub winning_score: u32,
    pub tick_rate: u32,
    pub send_interval_ms: u64,
}

impl Default for HockeyConfig {
    fn default() -> Self {
        Self {
            width: 400.0,
            height: 600.0,
            paddle_radius: 25.0,
            puck_radius: 15.0,
            friction: 0.99,
            max_speed: 15.0,
            goal_min_x: 120.0,
            goal_max_x: 280.0,
            hit_boost: 2.0,
            punch: 5.0,
            reset_offset: 50.0,
            goal_cooldown_ms: 1_000,
            winning_score: 7,
            tick_rate: 60,
            send_interval_ms: 100,
        }
    }
}

impl HockeyConfig {
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Host defends the bottom edge, guest the top.
    pub fn home(&self, seat: Seat) -> Vec2 {
        match seat {
            Seat::Host => Vec2::new(self.width / 2.0, self.height - 50.0),
            Seat::Guest => Vec2::new(self.width / 2.0, 50.0),
        }
    }

    /// Keeps a paddle on the table and in its own half.
    pub fn clamp_paddle(&self, seat: Seat, position: Vec2) -> Vec2 {
        let r = self.paddle_radius;
        let half = self.height / 2.0;
        let (min_y, max_y) = match seat {
            Seat::Host => (half + r, self.height - r),
            Seat::Guest => (r, half - r),
        };
        Vec2::new(position.x.clamp(r, self.width - r), position.y.clamp(min_y, max_y))
    }

    fn in_goal_mouth(&self, x: f32) -> bool {
        x > self.goal_min_x && x < self.goal_max_x
    }

    /// Puck placed after `scorer` scores, nudged toward the side that conceded.
    pub fn reset_puck(&self, scorer: Seat) -> Puck {
        let offset = match scorer {
            Seat::Host => -self.reset_offset,
            Seat::Guest => self.reset_offset,
        };
        Puck {
            position: self.center() + Vec2::new(0.0, offset),
            velocity: Vec2::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Puck {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// Advances the puck one tick. Returns the seat that scored, if any; the puck
/// is left where it crossed the goal line.
pub fn step(config: &HockeyConfig, puck: &mut Puck, paddles: &[Vec2]) -> Option<Seat> {
    puck.position += puck.velocity;
    puck.velocity *= config.friction;

    let r = config.puck_radius;
    if puck.position.x - r < 0.0 {
        puck.position.x = r;
        puck.velocity.x = -puck.velocity.x;
    }
    if puck.position.x + r > config.width {
        puck.position.x = config.width - r;
        puck.velocity.x = -puck.velocity.x;
    }

    if puck.position.y - r < 0.0 {
        if config.in_goal_mouth(puck.position.x) {
            return Some(Seat::Host);
        }
        puck.position.y = r;
        puck.velocity.y = -puck.velocity.y;
    }
    if puck.position.y + r > config.height {
        if config.in_goal_mouth(puck.position.x) {
            return Some(Seat::Guest);
        }
        puck.position.y = config.height - r;
        puck.velocity.y = -puck.velocity.y;
    }

    for &paddle in paddles {
        collide(config, puck, paddle);
    }
    None
}

/// Paddles are immovable: the puck is pushed out to exactly touching distance
/// and sent off along the contact normal.
pub fn collide(config: &HockeyConfig, puck: &mut Puck, paddle: Vec2) -> bool {
    let min_distance = config.paddle_radius + config.puck_radius;
    let offset = puck.position - paddle;
    let distance = offset.length();
    if distance >= min_distance {
        return false;
    }

    let normal = if distance > f32::EPSILON {
        offset / distance
    } else if paddle.y < config.height / 2.0 {
        Vec2::Y
    } else {
        Vec2::NEG_Y
    };
    puck.position = paddle + normal * min_distance;

    let speed = puck.velocity.length() + config.hit_boost + config.punch;
    puck.velocity = (normal * speed).clamp_length_max(config.max_speed);
    true
}

/// Swallows repeat reports of the same goal while the puck is still in the net
/// or a stale write is in flight.
#[derive(Debug, Clone)]
pub struct GoalGuard {
    cooldown_ms: u64,
    last_goal_at: Option<u64>,
}

impl GoalGuard {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            last_goal_at: None,
        }
    }

    /// True if this goal counts.
    pub fn register_goal(&mut self, now_ms: u64) -> bool {
        if let Some(last) = self.last_goal_at {
            if now_ms.saturating_sub(last) < self.cooldown_ms {
                return false;
            }
        }
        self.last_goal_at = Some(now_ms);
        true
    }

    pub fn reset(&mut self) {
        self.last_goal_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn puck(x: f32, y: f32, vx: f32, vy: f32) -> Puck {
        Puck {
            position: Vec2::new(x, y),
            velocity: Vec2::new(vx, vy),
        }
    }

    #[test]
    fn friction_slows_the_puck() {
        let config = HockeyConfig::default();
        let mut p = puck(200.0, 300.0, 10.0, 0.0);
        step(&config, &mut p, &[]);
        assert_eq!(p.position, Vec2::new(210.0, 300.0));
        assert!((p.velocity.x - 9.9).abs() < 1e-5);
    }

    #[test]
    fn side_wall_reflects() {
        let config = HockeyConfig::default();
        let mut p = puck(380.0, 300.0, 10.0, 0.0);
        step(&config, &mut p, &[]);
        assert_eq!(p.position.x, 385.0);
        assert!(p.velocity.x < 0.0);
    }

    #[test]
    fn end_wall_outside_mouth_reflects() {
        let config = HockeyConfig::default();
        let mut p = puck(50.0, 20.0, 0.0, -10.0);
        assert_eq!(step(&config, &mut p, &[]), None);
        assert_eq!(p.position.y, 15.0);
        assert!(p.velocity.y > 0.0);
    }

    #[test]
    fn goal_mouths_score_for_the_attacker() {
        let config = HockeyConfig::default();
        let mut top = puck(200.0, 20.0, 0.0, -10.0);
        assert_eq!(step(&config, &mut top, &[]), Some(Seat::Host));

        let mut bottom = puck(200.0, 580.0, 0.0, 10.0);
        assert_eq!(step(&config, &mut bottom, &[]), Some(Seat::Guest));
    }

    #[test]
    fn puck_resets_toward_conceding_side() {
        let config = HockeyConfig::default();
        let center = config.center();

        // Host scored through the top mouth; the guest defends the top half.
        let after_host_goal = config.reset_puck(Seat::Host);
        assert!(after_host_goal.position.y < center.y);
        assert_eq!(after_host_goal.position.x, center.x);
        assert_eq!(after_host_goal.velocity, Vec2::ZERO);

        let after_guest_goal = config.reset_puck(Seat::Guest);
        assert!(after_guest_goal.position.y > center.y);
    }

    #[test]
    fn paddle_contact_separates_and_caps_speed() {
        let config = HockeyConfig::default();
        let paddle = Vec2::new(200.0, 400.0);
        let mut p = puck(200.0, 380.0, 0.0, 14.0);

        assert!(collide(&config, &mut p, paddle));
        let gap = (p.position - paddle).length();
        assert!((gap - 40.0).abs() < 1e-3);
        assert!(p.velocity.y < 0.0);
        assert!(p.velocity.length() <= config.max_speed + 1e-4);
    }

    #[test]
    fn slow_contact_gets_punched() {
        let config = HockeyConfig::default();
        let mut p = puck(230.0, 400.0, 0.0, 0.0);
        collide(&config, &mut p, Vec2::new(200.0, 400.0));
        assert!((p.velocity.x - 7.0).abs() < 1e-4);
    }

    #[test]
    fn goal_counts_once_per_cooldown() {
        let mut guard = GoalGuard::new(1_000);
        assert!(guard.register_goal(5_000));
        assert!(!guard.register_goal(5_010));
        assert!(!guard.register_goal(5_999));
        assert!(guard.register_goal(6_000));
    }

    #[test]
    fn paddles_stay_in_their_half() {
        let config = HockeyConfig::default();
        let host = config.clamp_paddle(Seat::Host, Vec2::new(-10.0, 100.0));
        assert_eq!(host, Vec2::new(25.0, 325.0));
        let guest = config.clamp_paddle(Seat::Guest, Vec2::new(500.0, 590.0));
        assert_eq!(guest, Vec2::new(375.0, 275.0));
    }
}
