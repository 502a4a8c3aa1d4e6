/// Longest frame gap fed into the accumulator; anything above is dropped so a
/// stalled tab does not replay seconds of physics at once.
const MAX_FRAME_MS: u64 = 250;

/// Turns irregular frame times into a whole number of fixed physics ticks.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    tick_rate: u32,
    tick_ms: f32,
    accumulator_ms: f32,
    last_frame_ms: Option<u64>,
    ticks: u64,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            tick_ms: 1000.0 / tick_rate as f32,
            accumulator_ms: 0.0,
            last_frame_ms: None,
            ticks: 0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Seconds per tick.
    pub fn dt(&self) -> f32 {
        self.tick_ms / 1000.0
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Feeds the wall clock of this frame and returns how many ticks to run.
    pub fn advance(&mut self, now_ms: u64) -> u32 {
        let elapsed = match self.last_frame_ms {
            Some(last) => now_ms.saturating_sub(last).min(MAX_FRAME_MS),
            None => 0,
        };
        self.last_frame_ms = Some(now_ms);
        self.accumulator_ms += elapsed as f32;

        let mut due = 0;
        while self.accumulator_ms >= self.tick_ms {
            self.accumulator_ms -= self.tick_ms;
            due += 1;
        }
        self.ticks += u64::from(due);
        due
    }

    /// Fraction of the next tick already elapsed, for render interpolation.
    pub fn alpha(&self) -> f32 {
        self.accumulator_ms / self.tick_ms
    }

    pub fn reset(&mut self) {
        self.accumulator_ms = 0.0;
        self.last_frame_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_only_starts_the_clock() {
        let mut timestep = FixedTimestep::new(50);
        assert_eq!(timestep.advance(1_000), 0);
        assert_eq!(timestep.advance(1_020), 1);
        assert_eq!(timestep.advance(1_070), 2);
        assert!((timestep.alpha() - 0.5).abs() < 1e-4);
        assert_eq!(timestep.ticks(), 3);
    }

    #[test]
    fn long_stalls_are_capped() {
        let mut timestep = FixedTimestep::new(100);
        timestep.advance(0);
        assert_eq!(timestep.advance(10_000), 25);
    }

    #[test]
    fn reset_forgets_the_previous_frame() {
        let mut timestep = FixedTimestep::new(100);
        timestep.advance(0);
        timestep.reset();
        assert_eq!(timestep.advance(500), 0);
        assert!((timestep.dt() - 0.01).abs() < 1e-6);
    }
}
