use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::phase::{Mode, PerSeat, Phase, Seat};
use super::{Session, transition_patch};
use crate::sync::{ConnectionStatus, DocKey, GameSchema, GameSync, Patch, SyncError};

pub const GAME_ID: &str = "mathsprint_v1";
pub const ANSWER_SCORE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintDifficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Insane,
}

impl SprintDifficulty {
    pub fn range(self) -> i64 {
        match self {
            SprintDifficulty::Easy => 10,
            SprintDifficulty::Medium => 20,
            SprintDifficulty::Hard => 50,
            SprintDifficulty::Insane => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Add,
    Sub,
    Mult,
    Div,
    #[default]
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Sub,
    Mult,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub left: i64,
    pub right: i64,
    pub op: Operation,
    pub answer: i64,
}

impl Question {
    pub fn text(&self) -> String {
        let symbol = match self.op {
            Operation::Add => "+",
            Operation::Sub => "-",
            Operation::Mult => "×",
            Operation::Div => "÷",
        };
        format!("{} {} {}", self.left, symbol, self.right)
    }
}

/// Subtraction never goes negative and division always comes out even.
pub fn generate_question<R: Rng + ?Sized>(rng: &mut R, subject: Subject, difficulty: SprintDifficulty) -> Question {
    let op = match subject {
        Subject::Add => Operation::Add,
        Subject::Sub => Operation::Sub,
        Subject::Mult => Operation::Mult,
        Subject::Div => Operation::Div,
        Subject::Mixed => [Operation::Add, Operation::Sub, Operation::Mult, Operation::Div]
            [rng.random_range(0..4)],
    };
    let range = difficulty.range();

    let (left, right) = match op {
        Operation::Add => (rng.random_range(1..=range), rng.random_range(1..=range)),
        Operation::Sub => {
            let (a, b) = (rng.random_range(1..=range), rng.random_range(1..=range));
            (a.max(b), a.min(b))
        }
        Operation::Mult => (rng.random_range(1..=(range / 2).max(1)), rng.random_range(1..=12)),
        Operation::Div => {
            let divisor = rng.random_range(1..=12);
            (divisor * rng.random_range(1..=10), divisor)
        }
    };

    let answer = match op {
        Operation::Add => left + right,
        Operation::Sub => left - right,
        Operation::Mult => left * right,
        Operation::Div => left / right,
    };
    Question { left, right, op, answer }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub round: u32,
    pub value: i64,
    pub at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SprintConfig {
    pub round_ms: u64,
    pub match_ms: u64,
}

impl Default for SprintConfig {
    fn default() -> Self {
        Self {
            round_ms: 10_000,
            match_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SprintState {
    pub status: Phase,
    pub mode: Mode,
    pub subject: Subject,
    pub difficulty: SprintDifficulty,
    pub round: u32,
    pub question: Option<Question>,
    pub round_ends_at: u64,
    pub match_ends_at: u64,
    /// Each side writes only its own slot.
    pub answers: PerSeat<Option<Answer>>,
    pub scores: PerSeat<u32>,
    pub round_winners: Vec<Seat>,
    pub winner: Option<Seat>,
}

impl Default for SprintState {
    fn default() -> Self {
        Self {
            status: Phase::Menu,
            mode: Mode::Pvp,
            subject: Subject::Mixed,
            difficulty: SprintDifficulty::Medium,
            round: 0,
            question: None,
            round_ends_at: 0,
            match_ends_at: 0,
            answers: PerSeat::default(),
            scores: PerSeat::default(),
            round_winners: Vec::new(),
            winner: None,
        }
    }
}

impl GameSchema for SprintState {
    const GAME_ID: &'static str = GAME_ID;
}

impl SprintState {
    fn current_answer(&self, seat: Seat) -> Option<Answer> {
        self.answers.get(seat).filter(|answer| answer.round == self.round)
    }

    pub fn is_correct(&self, answer: &Answer) -> bool {
        answer.round == self.round && self.question.is_some_and(|q| q.answer == answer.value)
    }

    /// A side may keep answering a round until it gets it right.
    pub fn can_answer(&self, seat: Seat) -> bool {
        self.status == Phase::Playing
            && self.question.is_some()
            && !self.current_answer(seat).is_some_and(|answer| self.is_correct(&answer))
    }

    fn expected_seats(&self) -> &'static [Seat] {
        match self.mode {
            Mode::Solo => &[Seat::Host],
            Mode::Pvp => &[Seat::Host, Seat::Guest],
        }
    }

    /// Ready when the deadline passed or every side has a correct answer in.
    pub fn round_ready(&self, now_ms: u64) -> bool {
        now_ms >= self.round_ends_at
            || self.expected_seats().iter().all(|&seat| {
                self.current_answer(seat)
                    .is_some_and(|answer| self.is_correct(&answer))
            })
    }

    /// Earliest correct answer takes the round. Exact ties go to both sides.
    pub fn round_winners(&self) -> Vec<Seat> {
        let correct: Vec<(Seat, u64)> = [Seat::Host, Seat::Guest]
            .into_iter()
            .filter_map(|seat| {
                self.current_answer(seat)
                    .filter(|answer| self.is_correct(answer))
                    .map(|answer| (seat, answer.at))
            })
            .collect();
        let Some(earliest) = correct.iter().map(|&(_, at)| at).min() else {
            return Vec::new();
        };
        correct
            .into_iter()
            .filter(|&(_, at)| at == earliest)
            .map(|(seat, _)| seat)
            .collect()
    }

    fn final_winner(&self) -> Option<Seat> {
        match self.scores.host.cmp(&self.scores.guest) {
            std::cmp::Ordering::Greater => Some(Seat::Host),
            std::cmp::Ordering::Less if self.mode == Mode::Pvp => Some(Seat::Guest),
            _ => None,
        }
    }
}

/// Host deals questions and resolves rounds; both sides submit answers.
pub struct SprintSession {
    sync: GameSync<SprintState>,
    config: SprintConfig,
    rng: Pcg32,
}

impl SprintSession {
    pub fn new(sync: GameSync<SprintState>, config: SprintConfig, seed: u64) -> Self {
        Self {
            sync,
            config,
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    pub fn state(&self) -> Option<&SprintState> {
        self.sync.payload()
    }

    pub fn seat(&self) -> Seat {
        Seat::of(self.sync.is_host())
    }

    pub fn start(
        &mut self,
        mode: Mode,
        subject: Subject,
        difficulty: SprintDifficulty,
        now_ms: u64,
    ) -> Result<(), SyncError> {
        if !self.sync.is_host() {
            return Ok(());
        }
        let status = Phase::on_start(mode);
        let mut next = SprintState {
            status,
            mode,
            subject,
            difficulty,
            ..SprintState::default()
        };
        if status == Phase::Playing {
            self.begin_match(&mut next, now_ms);
        }
        log::info!("[sprint] starting {:?} {:?} match ({:?})", subject, difficulty, mode);
        self.sync.propose_update(transition_patch(&next)?, now_ms)
    }

    pub fn start_anyway(&mut self, now_ms: u64) -> Result<(), SyncError> {
        let Some(mut next) = self.state().filter(|s| s.status == Phase::Waiting).cloned() else {
            return Ok(());
        };
        if !self.sync.is_host() {
            return Ok(());
        }
        next.status = Phase::Playing;
        self.begin_match(&mut next, now_ms);
        self.sync.propose_update(transition_patch(&next)?, now_ms)
    }

    fn begin_match(&mut self, state: &mut SprintState, now_ms: u64) {
        state.match_ends_at = now_ms + self.config.match_ms;
        self.next_round(state, now_ms);
    }

    fn next_round(&mut self, state: &mut SprintState, now_ms: u64) {
        state.round += 1;
        state.question = Some(generate_question(&mut self.rng, state.subject, state.difficulty));
        state.round_ends_at = now_ms + self.config.round_ms;
    }

    /// Writes this side's answer for the current round.
    pub fn answer(&mut self, value: i64, now_ms: u64) -> Result<bool, SyncError> {
        let seat = self.seat();
        let Some(round) = self
            .state()
            .filter(|state| state.can_answer(seat))
            .map(|state| state.round)
        else {
            return Ok(false);
        };
        let answer = Answer {
            round,
            value,
            at: now_ms,
        };
        let patch = Patch::new().set(format!("answers.{}", seat.key()), json!(answer));
        self.sync.propose_update(patch, now_ms)?;
        Ok(true)
    }

    fn host_duties(&mut self, now_ms: u64) -> Result<(), SyncError> {
        let Some(state) = self.state().filter(|s| s.status == Phase::Playing).cloned() else {
            return Ok(());
        };

        if now_ms >= state.match_ends_at {
            let mut next = state;
            next.status = Phase::Finished;
            next.question = None;
            next.winner = next.final_winner();
            log::info!(
                "[sprint] match over {}-{}, winner {:?}",
                next.scores.host,
                next.scores.guest,
                next.winner
            );
            let patch = Patch::new()
                .set("status", json!(next.status))
                .set("question", json!(next.question))
                .set("winner", json!(next.winner));
            return self.sync.propose_update(patch, now_ms);
        }

        if !state.round_ready(now_ms) {
            return Ok(());
        }

        let winners = state.round_winners();
        let mut next = state;
        for &seat in &winners {
            *next.scores.get_mut(seat) += ANSWER_SCORE;
        }
        log::debug!("[sprint] round {} to {:?}", next.round, winners);
        next.round_winners = winners;
        self.next_round(&mut next, now_ms);

        let patch = Patch::new()
            .set("scores", json!(next.scores))
            .set("roundWinners", json!(next.round_winners))
            .set("round", next.round)
            .set("question", json!(next.question))
            .set("roundEndsAt", next.round_ends_at);
        self.sync.propose_update(patch, now_ms)
    }
}

impl Session for SprintSession {
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
        self.sync.poll(now_ms);
        if self.sync.is_host() {
            self.host_duties(now_ms)?;
        }
        Ok(())
    }

    fn render(&self) -> Vec<String> {
        let Some(state) = self.state() else {
            return vec!["connecting...".to_string()];
        };
        let question = state
            .question
            .map(|q| format!("{} = ?", q.text()))
            .unwrap_or_else(|| "-".to_string());
        vec![
            format!("round {}: {}", state.round, question),
            format!(
                "{:?} host={} guest={} last round={:?} winner={:?}",
                state.status, state.scores.host, state.scores.guest, state.round_winners, state.winner
            ),
        ]
    }
}
