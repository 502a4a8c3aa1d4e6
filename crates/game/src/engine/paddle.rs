use glam::Vec2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.18,
            ki: 0.002,
            kd: 0.06,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaddleConfig {
    pub table_width: f32,
    pub puck_radius: f32,
    pub paddle_radius: f32,
    /// The line the paddle defends and returns to.
    pub home_y: f32,
    /// Puck distance from the home line inside which the paddle steps out to hit it.
    pub strike_distance: f32,
    pub max_speed: f32,
    /// Fraction of the vertical gap closed per tick.
    pub vertical_rate: f32,
    pub integral_limit: f32,
    pub gains: PidGains,
}

impl Default for PaddleConfig {
    fn default() -> Self {
        Self {
            table_width: 400.0,
            puck_radius: 15.0,
            paddle_radius: 25.0,
            home_y: 50.0,
            strike_distance: 100.0,
            max_speed: 5.0,
            vertical_rate: 0.05,
            integral_limit: 200.0,
            gains: PidGains::default(),
        }
    }
}

/// Mirrors `x` back into `[lo, hi]` as if it bounced off both ends.
pub fn reflect_into(x: f32, lo: f32, hi: f32) -> f32 {
    let span = hi - lo;
    if span <= 0.0 {
        return lo;
    }
    let folded = (x - lo).rem_euclid(2.0 * span);
    if folded <= span {
        lo + folded
    } else {
        lo + 2.0 * span - folded
    }
}

/// Where the puck will cross `defend_y`, or the table center if it is not
/// heading there.
pub fn predict_intercept_x(
    position: Vec2,
    velocity: Vec2,
    defend_y: f32,
    table_width: f32,
    puck_radius: f32,
) -> f32 {
    let center = table_width / 2.0;
    let gap = defend_y - position.y;
    if velocity.y == 0.0 || gap * velocity.y <= 0.0 {
        return center;
    }

    let time = gap / velocity.y;
    let raw = position.x + velocity.x * time;
    reflect_into(raw, puck_radius, table_width - puck_radius)
}

#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    integral: f32,
    integral_limit: f32,
    previous_error: Option<f32>,
}

impl PidController {
    pub fn new(gains: PidGains, integral_limit: f32) -> Self {
        Self {
            gains,
            integral: 0.0,
            integral_limit,
            previous_error: None,
        }
    }

    pub fn update(&mut self, error: f32, dt: f32) -> f32 {
        self.integral = (self.integral + error * dt).clamp(-self.integral_limit, self.integral_limit);
        let derivative = match self.previous_error {
            Some(previous) if dt > 0.0 => (error - previous) / dt,
            _ => 0.0,
        };
        self.previous_error = Some(error);

        self.gains.kp * error + self.gains.ki * self.integral + self.gains.kd * derivative
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerticalBehavior {
    Approach,
    Return,
}

/// Per-instance controller for a computer-driven paddle.
#[derive(Debug, Clone)]
pub struct PaddlePolicy {
    config: PaddleConfig,
    pid: PidController,
    behavior: VerticalBehavior,
}

impl PaddlePolicy {
    pub fn new(config: PaddleConfig) -> Self {
        Self {
            pid: PidController::new(config.gains, config.integral_limit),
            config,
            behavior: VerticalBehavior::Return,
        }
    }

    pub fn config(&self) -> &PaddleConfig {
        &self.config
    }

    pub fn behavior(&self) -> VerticalBehavior {
        self.behavior
    }

    pub fn reset(&mut self) {
        self.pid.reset();
        self.behavior = VerticalBehavior::Return;
    }

    /// Velocity command for this tick, each axis bounded by `max_speed`.
    pub fn step(&mut self, paddle: Vec2, puck: Vec2, puck_velocity: Vec2, dt: f32) -> Vec2 {
        let config = &self.config;
        let target_x = predict_intercept_x(
            puck,
            puck_velocity,
            config.home_y,
            config.table_width,
            config.puck_radius,
        );
        let vx = self
            .pid
            .update(target_x - paddle.x, dt)
            .clamp(-config.max_speed, config.max_speed);

        let approaching = (config.home_y - puck.y) * puck_velocity.y > 0.0;
        let in_reach = (puck.y - config.home_y).abs() <= config.strike_distance;
        self.behavior = if approaching && in_reach {
            VerticalBehavior::Approach
        } else {
            VerticalBehavior::Return
        };

        let goal_y = match self.behavior {
            VerticalBehavior::Approach => puck.y,
            VerticalBehavior::Return => config.home_y,
        };
        let vy = ((goal_y - paddle.y) * config.vertical_rate).clamp(-config.max_speed, config.max_speed);

        Vec2::new(vx, vy)
    }
}
