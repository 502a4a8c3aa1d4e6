use glam::Vec2;
use serde_json::json;

use super::payload::HockeyState;
use super::physics::{self, GoalGuard, HockeyConfig, Puck};
use super::reconciler::{Reconciled, SendThrottle};
use super::timestep::FixedTimestep;
use crate::engine::paddle::{PaddleConfig, PaddlePolicy};
use crate::games::{Mode, PerSeat, Phase, Seat, Session};
use crate::sync::{ConnectionStatus, DocKey, GameSync, Patch, SyncError};

/// One participant's air hockey table.
///
/// Both sides step the puck locally every tick so it moves smoothly. Only the
/// host's simulation counts: it detects goals, owns the score, and publishes
/// the puck at a throttled rate. The guest folds each published puck into its
/// local copy through [`Reconciled`].
pub struct HockeySession {
    sync: GameSync<HockeyState>,
    config: HockeyConfig,
    timestep: FixedTimestep,
    throttle: SendThrottle,
    guard: GoalGuard,
    puck: Reconciled,
    paddles: PerSeat<Reconciled>,
    paddle_target: Option<Vec2>,
    computer: Option<PaddlePolicy>,
    last_remote_puck: Option<Puck>,
    seen_status: Phase,
    seen_goal_seq: u32,
}

impl HockeySession {
    pub fn new(sync: GameSync<HockeyState>, config: HockeyConfig) -> Self {
        let kickoff = HockeyState::kickoff(&config);
        Self {
            sync,
            timestep: FixedTimestep::new(config.tick_rate),
            throttle: SendThrottle::new(config.send_interval_ms),
            guard: GoalGuard::new(config.goal_cooldown_ms),
            puck: Reconciled::new(kickoff.puck.position),
            paddles: PerSeat {
                host: Reconciled::new(kickoff.paddles.host),
                guest: Reconciled::new(kickoff.paddles.guest),
            },
            paddle_target: None,
            computer: None,
            last_remote_puck: None,
            seen_status: Phase::Menu,
            seen_goal_seq: 0,
            config,
        }
    }

    pub fn state(&self) -> Option<&HockeyState> {
        self.sync.payload()
    }

    pub fn config(&self) -> &HockeyConfig {
        &self.config
    }

    pub fn seat(&self) -> Seat {
        Seat::of(self.sync.is_host())
    }

    pub fn puck(&self) -> &Reconciled {
        &self.puck
    }

    pub fn paddle(&self, seat: Seat) -> &Reconciled {
        self.paddles.get(seat)
    }

    pub fn start(&mut self, mode: Mode, now_ms: u64) -> Result<(), SyncError> {
        if !self.sync.is_host() {
            return Ok(());
        }
        let next = HockeyState {
            status: Phase::on_start(mode),
            mode,
            ..HockeyState::kickoff(&self.config)
        };
        log::info!("[hockey] starting {:?} match", mode);
        self.guard.reset();
        self.sync
            .propose_update(crate::games::transition_patch(&next)?, now_ms)
    }

    pub fn start_anyway(&mut self, now_ms: u64) -> Result<(), SyncError> {
        if !self.sync.is_host() || self.state().map(|s| s.status) != Some(Phase::Waiting) {
            return Ok(());
        }
        self.sync
            .propose_update(Patch::new().set("status", json!(Phase::Playing)), now_ms)
    }

    /// Host-only: sets the puck moving from wherever it rests.
    pub fn serve(&mut self, velocity: Vec2, now_ms: u64) -> Result<(), SyncError> {
        if !self.sync.is_host() {
            return Ok(());
        }
        self.puck.velocity = velocity.clamp_length_max(self.config.max_speed);
        self.publish(now_ms)
    }

    /// Where this participant wants its paddle. Clamped to its own half.
    pub fn move_paddle(&mut self, target: Vec2) {
        self.paddle_target = Some(self.config.clamp_paddle(self.seat(), target));
    }

    fn absorb_remote(&mut self) {
        let Some(state) = self.state().cloned() else {
            return;
        };
        let me = self.seat();
        let restarted = (state.status == Phase::Playing && self.seen_status != Phase::Playing)
            || state.goal_seq != self.seen_goal_seq;
        self.seen_status = state.status;
        self.seen_goal_seq = state.goal_seq;

        let puck_moved = self.last_remote_puck != Some(state.puck);
        self.last_remote_puck = Some(state.puck);

        if restarted {
            log::debug!("[hockey] {} kickoff (goal #{})", self.sync.key(), state.goal_seq);
            self.puck.snap(state.puck.position, state.puck.velocity);
            for seat in [Seat::Host, Seat::Guest] {
                if seat != me {
                    self.paddles.get_mut(seat).snap(*state.paddles.get(seat), Vec2::ZERO);
                }
            }
            self.timestep.reset();
            self.computer = (self.sync.is_host() && state.mode == Mode::Solo).then(|| {
                PaddlePolicy::new(PaddleConfig {
                    table_width: self.config.width,
                    puck_radius: self.config.puck_radius,
                    paddle_radius: self.config.paddle_radius,
                    home_y: self.config.home(Seat::Guest).y,
                    ..PaddleConfig::default()
                })
            });
            return;
        }

        // Own paddle writes echo back too; only a new host puck is news.
        if !self.sync.is_host() && puck_moved {
            self.puck.confirm(state.puck.position, state.puck.velocity);
        }

        let other = me.other();
        let remote_paddle = *state.paddles.get(other);
        let opponent = self.paddles.get_mut(other);
        if self.computer.is_none() && opponent.authoritative() != Some(remote_paddle) {
            opponent.confirm(remote_paddle, Vec2::ZERO);
        }
    }

    fn run_tick(&mut self, now_ms: u64) -> Result<(), SyncError> {
        let me = self.seat();
        if let Some(target) = self.paddle_target {
            self.paddles.get_mut(me).predicted = target;
        }

        if let Some(policy) = self.computer.as_mut() {
            let paddle = self.paddles.guest.predicted;
            let velocity = policy.step(paddle, self.puck.predicted, self.puck.velocity, 1.0);
            self.paddles.guest.predicted = self.config.clamp_paddle(Seat::Guest, paddle + velocity);
        }

        let mut puck = Puck {
            position: self.puck.predicted,
            velocity: self.puck.velocity,
        };
        let paddles = [self.paddles.host.predicted, self.paddles.guest.predicted];
        let goal = physics::step(&self.config, &mut puck, &paddles);
        self.puck.predicted = puck.position;
        self.puck.velocity = puck.velocity;

        let Some(scorer) = goal else {
            return Ok(());
        };
        if !self.sync.is_host() {
            // Hold the puck in the net until the host's reset arrives.
            self.puck.velocity = Vec2::ZERO;
            return Ok(());
        }

        let reset = self.config.reset_puck(scorer);
        self.puck.snap(reset.position, reset.velocity);
        if !self.guard.register_goal(now_ms) {
            log::debug!("[hockey] goal inside cooldown ignored");
            return Ok(());
        }
        self.write_goal(scorer, reset, now_ms)
    }

    /// Score, puck reset and goal counter go out as one write.
    fn write_goal(&mut self, scorer: Seat, reset: Puck, now_ms: u64) -> Result<(), SyncError> {
        let Some(state) = self.state() else {
            return Ok(());
        };
        let score = state.scores.get(scorer) + 1;
        let goal_seq = state.goal_seq + 1;
        log::info!("[hockey] {:?} scores ({} goals)", scorer, score);

        let mut patch = Patch::new()
            .set(format!("scores.{}", scorer.key()), score)
            .set("puck", json!(reset))
            .set("goalSeq", goal_seq)
            .set("lastGoal", json!(scorer));
        if score >= self.config.winning_score {
            patch.push("status", json!(Phase::Finished));
            patch.push("winner", json!(scorer));
        }
        self.sync.propose_update(patch, now_ms)
    }

    fn publish(&mut self, now_ms: u64) -> Result<(), SyncError> {
        let me = self.seat();
        let mut patch = Patch::new().set(
            format!("paddles.{}", me.key()),
            json!(self.paddles.get(me).predicted),
        );
        if self.sync.is_host() {
            let puck = Puck {
                position: self.puck.predicted,
                velocity: self.puck.velocity,
            };
            patch.push("puck", json!(puck));
            if self.computer.is_some() {
                patch.push("paddles.guest", json!(self.paddles.guest.predicted));
            }
        }
        self.sync.propose_update(patch, now_ms)
    }
}

impl Session for HockeySession {
    fn key(&self) -> &DocKey {
        self.sync.key()
    }

    fn is_host(&self) -> bool {
        self.sync.is_host()
    }

    fn connection(&self) -> ConnectionStatus {
        self.sync.status()
    }

    fn phase(&self) -> Phase {
        self.state().map(|state| state.status).unwrap_or_default()
    }

    fn update(&mut self, now_ms: u64) -> Result<(), SyncError> {
        if self.sync.poll(now_ms) > 0 || self.sync.is_offline() {
            self.absorb_remote();
        }
        if self.phase() != Phase::Playing {
            self.timestep.reset();
            return Ok(());
        }

        let ticks = self.timestep.advance(now_ms);
        for _ in 0..ticks {
            self.run_tick(now_ms)?;
            if self.phase() != Phase::Playing {
                break;
            }
        }

        let dt = self.timestep.dt() * ticks as f32;
        self.puck.decay(dt);
        self.paddles.host.decay(dt);
        self.paddles.guest.decay(dt);

        let send = if ticks > 0 {
            self.throttle.offer(now_ms)
        } else {
            self.throttle.flush(now_ms)
        };
        if send {
            self.publish(now_ms)?;
        }
        Ok(())
    }

    fn render(&self) -> Vec<String> {
        const COLS: usize = 20;
        const ROWS: usize = 15;

        let Some(state) = self.state() else {
            return vec!["connecting...".to_string()];
        };
        let cell = |position: Vec2| {
            let col = ((position.x / self.config.width) * COLS as f32) as usize;
            let row = ((position.y / self.config.height) * ROWS as f32) as usize;
            (row.min(ROWS - 1), col.min(COLS - 1))
        };

        let mut grid = vec![vec!['.'; COLS]; ROWS];
        let (r, c) = cell(self.paddles.guest.visual());
        grid[r][c] = 'G';
        let (r, c) = cell(self.paddles.host.visual());
        grid[r][c] = 'H';
        let (r, c) = cell(self.puck.visual());
        grid[r][c] = 'o';

        let mut lines: Vec<String> = grid.into_iter().map(|row| row.into_iter().collect()).collect();
        lines.push(format!(
            "{:?} host={} guest={} goals={} winner={:?}",
            state.status, state.scores.host, state.scores.guest, state.goal_seq, state.winner
        ));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{MemoryStore, ParticipantId, SyncConfig};

    fn session(store: &MemoryStore, id: &str) -> HockeySession {
        let sync = GameSync::attach(
            Box::new(store.connect()),
            "s1",
            ParticipantId::new(id),
            HockeyState::default(),
            SyncConfig::default(),
            0,
        );
        HockeySession::new(sync, HockeyConfig::default())
    }

    fn started_pair(store: &MemoryStore) -> (HockeySession, HockeySession) {
        let mut host = session(store, "a");
        let mut guest = session(store, "b");
        host.start(Mode::Pvp, 0).unwrap();
        host.update(0).unwrap();
        host.start_anyway(0).unwrap();
        host.update(0).unwrap();
        guest.update(0).unwrap();
        assert_eq!(host.phase(), Phase::Playing);
        assert_eq!(guest.phase(), Phase::Playing);
        (host, guest)
    }

    #[test]
    fn puck_in_goal_scores_once() {
        let store = MemoryStore::new();
        let (mut host, mut guest) = started_pair(&store);

        host.puck.snap(Vec2::new(200.0, 20.0), Vec2::new(0.0, -10.0));
        host.update(20).unwrap();
        host.update(40).unwrap();

        host.puck.snap(Vec2::new(200.0, 20.0), Vec2::new(0.0, -10.0));
        host.update(60).unwrap();
        host.update(80).unwrap();

        let state = host.state().unwrap();
        assert_eq!(state.scores.host, 1);
        assert_eq!(state.goal_seq, 1);
        assert_eq!(state.last_goal, Some(Seat::Host));

        guest.update(100).unwrap();
        let reset = HockeyConfig::default().reset_puck(Seat::Host);
        assert_eq!(guest.puck().visual(), reset.position);
        assert_eq!(guest.state().unwrap().scores.host, 1);
    }

    #[test]
    fn guest_blends_toward_host_puck() {
        let store = MemoryStore::new();
        let (mut host, mut guest) = started_pair(&store);

        host.serve(Vec2::new(0.0, -3.0), 10).unwrap();
        guest.update(10).unwrap();
        let confirmed = guest.puck().authoritative().unwrap();
        assert_eq!(confirmed, HockeyConfig::default().center());
        assert_eq!(guest.puck().velocity, Vec2::new(0.0, -3.0));

        guest.update(110).unwrap();
        assert!(guest.puck().predicted.y < confirmed.y);
    }

    #[test]
    fn guest_paddle_reaches_host() {
        let store = MemoryStore::new();
        let (mut host, mut guest) = started_pair(&store);

        guest.move_paddle(Vec2::new(120.0, 900.0));
        guest.update(20).unwrap();
        host.update(40).unwrap();

        let expected = HockeyConfig::default().clamp_paddle(Seat::Guest, Vec2::new(120.0, 900.0));
        assert_eq!(host.state().unwrap().paddles.guest, expected);
        assert_eq!(host.paddle(Seat::Guest).authoritative(), Some(expected));
    }

    #[test]
    fn solo_match_drives_the_computer_paddle() {
        let store = MemoryStore::new();
        let mut host = session(&store, "a");
        host.start(Mode::Solo, 0).unwrap();
        host.update(0).unwrap();
        host.serve(Vec2::new(2.0, -6.0), 0).unwrap();

        let start = host.paddle(Seat::Guest).predicted;
        for frame in 1..=30 {
            host.update(frame * 16).unwrap();
        }
        assert_ne!(host.paddle(Seat::Guest).predicted, start);
        assert!(host.paddle(Seat::Guest).predicted.y <= 275.0);
    }

    #[test]
    fn reaching_the_winning_score_finishes() {
        let store = MemoryStore::new();
        let (mut host, _guest) = started_pair(&store);
        host.sync
            .propose_update(Patch::new().set("scores.guest", 6), 1)
            .unwrap();
        host.update(1).unwrap();

        host.puck.snap(Vec2::new(200.0, 580.0), Vec2::new(0.0, 10.0));
        host.update(30).unwrap();
        host.update(31).unwrap();

        let state = host.state().unwrap();
        assert_eq!(state.status, Phase::Finished);
        assert_eq!(state.winner, Some(Seat::Guest));
    }
}
