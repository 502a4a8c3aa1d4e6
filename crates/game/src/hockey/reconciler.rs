use glam::Vec2;

const ERROR_CORRECTION_SPEED: f32 = 20.0;
const ERROR_THRESHOLD: f32 = 0.01;
/// Corrections larger than this (in table units) are applied instantly.
const SNAP_THRESHOLD: f32 = 60.0;

/// Local copy of one moving object. `predicted` advances every frame on every
/// participant; `authoritative` is the last value the host confirmed. Rendering
/// reads [`visual`](Self::visual), which hides small corrections by decaying
/// them over a few frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciled {
    pub predicted: Vec2,
    pub velocity: Vec2,
    authoritative: Option<Vec2>,
    error: Vec2,
}

impl Reconciled {
    pub fn new(position: Vec2) -> Self {
        Self {
            predicted: position,
            velocity: Vec2::ZERO,
            authoritative: None,
            error: Vec2::ZERO,
        }
    }

    pub fn authoritative(&self) -> Option<Vec2> {
        self.authoritative
    }

    pub fn error(&self) -> Vec2 {
        self.error
    }

    /// Takes the host's value as truth. Small differences are folded into the
    /// visual error so the rendered object does not jump.
    pub fn confirm(&mut self, position: Vec2, velocity: Vec2) {
        self.authoritative = Some(position);
        let correction = position - self.predicted;
        self.predicted = position;
        self.velocity = velocity;

        let magnitude = correction.length();
        if magnitude < ERROR_THRESHOLD {
            return;
        }
        if magnitude > SNAP_THRESHOLD {
            self.error = Vec2::ZERO;
        } else {
            self.error -= correction;
        }
    }

    /// Jumps straight to `position` with no smoothing, e.g. after a goal reset.
    pub fn snap(&mut self, position: Vec2, velocity: Vec2) {
        self.predicted = position;
        self.velocity = velocity;
        self.authoritative = Some(position);
        self.error = Vec2::ZERO;
    }

    pub fn decay(&mut self, dt: f32) {
        self.error *= (-ERROR_CORRECTION_SPEED * dt).exp();
    }

    pub fn visual(&self) -> Vec2 {
        self.predicted + self.error
    }
}

/// Rate limit for continuous writes: the first change in a quiet period goes out
/// at once, later ones are coalesced into one trailing write per interval.
#[derive(Debug, Clone)]
pub struct SendThrottle {
    interval_ms: u64,
    last_sent_at: Option<u64>,
    pending: bool,
}

impl SendThrottle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_sent_at: None,
            pending: false,
        }
    }

    fn open(&self, now_ms: u64) -> bool {
        self.last_sent_at
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.interval_ms)
    }

    /// Reports a new value. True means send it now.
    pub fn offer(&mut self, now_ms: u64) -> bool {
        if self.open(now_ms) {
            self.last_sent_at = Some(now_ms);
            self.pending = false;
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// True when a held-back value is due.
    pub fn flush(&mut self, now_ms: u64) -> bool {
        if self.pending && self.open(now_ms) {
            self.last_sent_at = Some(now_ms);
            self.pending = false;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_correction_is_smoothed() {
        let mut puck = Reconciled::new(Vec2::new(100.0, 100.0));
        puck.confirm(Vec2::new(105.0, 100.0), Vec2::ZERO);

        assert_eq!(puck.predicted, Vec2::new(105.0, 100.0));
        assert_eq!(puck.visual(), Vec2::new(100.0, 100.0));

        for _ in 0..60 {
            puck.decay(1.0 / 60.0);
        }
        assert!((puck.visual() - puck.predicted).length() < 0.01);
    }

    #[test]
    fn large_correction_snaps() {
        let mut puck = Reconciled::new(Vec2::new(100.0, 100.0));
        puck.confirm(Vec2::new(300.0, 500.0), Vec2::new(1.0, 0.0));
        assert_eq!(puck.visual(), Vec2::new(300.0, 500.0));
        assert_eq!(puck.authoritative(), Some(Vec2::new(300.0, 500.0)));
        assert_eq!(puck.velocity, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn throttle_sends_leading_and_trailing() {
        let mut throttle = SendThrottle::new(100);
        assert!(throttle.offer(0));
        assert!(!throttle.offer(10));
        assert!(!throttle.offer(50));
        assert!(!throttle.flush(90));
        assert!(throttle.flush(100));
        assert!(!throttle.flush(150));
        assert!(throttle.offer(250));
    }

    #[test]
    fn quiet_throttle_has_nothing_to_flush() {
        let mut throttle = SendThrottle::new(100);
        assert!(!throttle.flush(1_000));
        assert!(!throttle.is_pending());
    }
}
