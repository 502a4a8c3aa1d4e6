use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::phase::{Mode, Phase, Seat};
use super::{Session, transition_patch};
use crate::engine::connect4::{
    Board, CELLS, COLS, Difficulty, Disc, Outcome, ROWS, SearchConfig, best_move,
};
use crate::sync::{
    ConnectionStatus, DocKey, GameSchema, GameSync, Patch, SyncError, normalize_array_at,
};

pub const GAME_ID: &str = "connect4_v6";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Red,
    Yellow,
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scores {
    pub red: u32,
    pub yellow: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Connect4State {
    pub board: Board,
    pub turn: Disc,
    pub winner: Option<Winner>,
    pub winning_cells: Vec<usize>,
    pub status: Phase,
    pub mode: Mode,
    pub difficulty: Difficulty,
    pub scores: Scores,
    pub last_move: Option<usize>,
}

impl Default for Connect4State {
    fn default() -> Self {
        Self {
            board: Board::new(),
            turn: Disc::Red,
            winner: None,
            winning_cells: Vec::new(),
            status: Phase::Menu,
            mode: Mode::Pvp,
            difficulty: Difficulty::Medium,
            scores: Scores::default(),
            last_move: None,
        }
    }
}

impl GameSchema for Connect4State {
    const GAME_ID: &'static str = GAME_ID;

    fn normalize(payload: &mut Value) {
        normalize_array_at(payload, "board", CELLS);
    }
}

/// Host plays red, guest plays yellow. In solo games the computer is yellow.
pub fn disc_for(seat: Seat) -> Disc {
    match seat {
        Seat::Host => Disc::Red,
        Seat::Guest => Disc::Yellow,
    }
}

impl Connect4State {
    pub fn started(&self, mode: Mode, difficulty: Difficulty) -> Self {
        Self {
            status: Phase::on_start(mode),
            mode,
            difficulty,
            ..Self::default()
        }
    }

    pub fn rematch(&self) -> Self {
        Self {
            board: Board::new(),
            turn: Disc::Red,
            winner: None,
            winning_cells: Vec::new(),
            status: Phase::Playing,
            last_move: None,
            ..self.clone()
        }
    }

    pub fn can_move(&self, seat: Seat) -> bool {
        if self.status != Phase::Playing {
            return false;
        }
        match self.mode {
            Mode::Pvp => self.turn == disc_for(seat),
            Mode::Solo => seat == Seat::Host && self.turn == Disc::Red,
        }
    }

    pub fn ai_to_move(&self) -> bool {
        self.mode == Mode::Solo && self.status == Phase::Playing && self.turn == Disc::Yellow
    }

    /// Corrupt boards (floating discs) only ever come from a mangled write.
    pub fn needs_repair(&self) -> bool {
        self.status == Phase::Playing && !self.board.is_valid()
    }

    /// Drops the current player's disc in `col`. `None` if the column is full
    /// or the game is not running.
    pub fn play(&self, col: usize) -> Option<Self> {
        if self.status != Phase::Playing {
            return None;
        }

        let mut next = self.clone();
        let index = next.board.drop_disc(col, self.turn)?;
        next.last_move = Some(index);
        next.turn = self.turn.other();

        match next.board.outcome() {
            Some(Outcome::Win { disc, cells }) => {
                next.winner = Some(match disc {
                    Disc::Red => Winner::Red,
                    Disc::Yellow => Winner::Yellow,
                });
                next.winning_cells = cells.to_vec();
                next.status = Phase::Finished;
                match disc {
                    Disc::Red => next.scores.red += 1,
                    Disc::Yellow => next.scores.yellow += 1,
                }
            }
            Some(Outcome::Draw) => {
                next.winner = Some(Winner::Draw);
                next.status = Phase::Finished;
            }
            None => {}
        }

        Some(next)
    }
}

/// One participant's view of a Connect Four instance. The host also drives the
/// computer opponent in solo games and repairs corrupt boards.
pub struct Connect4Session {
    sync: GameSync<Connect4State>,
    ai_delay_ms: u64,
    ai_due_at: Option<u64>,
}

impl Connect4Session {
    pub fn new(sync: GameSync<Connect4State>, ai_delay_ms: u64) -> Self {
        Self {
            sync,
            ai_delay_ms,
            ai_due_at: None,
        }
    }

    pub fn sync(&self) -> &GameSync<Connect4State> {
        &self.sync
    }

    pub fn state(&self) -> Option<&Connect4State> {
        self.sync.payload()
    }

    pub fn seat(&self) -> Seat {
        Seat::of(self.sync.is_host())
    }

    fn write(&mut self, next: &Connect4State, now_ms: u64) -> Result<(), SyncError> {
        let patch = transition_patch(next)?;
        self.sync.propose_update(patch, now_ms)
    }

    pub fn start(&mut self, mode: Mode, difficulty: Difficulty, now_ms: u64) -> Result<(), SyncError> {
        let next = self.state().cloned().unwrap_or_default().started(mode, difficulty);
        log::info!("[connect4] starting {:?} game at {:?}", mode, difficulty);
        self.write(&next, now_ms)
    }

    /// Host-only: leave the lobby without an opponent.
    pub fn start_anyway(&mut self, now_ms: u64) -> Result<(), SyncError> {
        if !self.sync.is_host() || self.state().map(|s| s.status) != Some(Phase::Waiting) {
            return Ok(());
        }
        self.sync
            .propose_update(Patch::new().set("status", "PLAYING"), now_ms)
    }

    pub fn back_to_menu(&mut self, now_ms: u64) -> Result<(), SyncError> {
        self.sync.propose_update(Patch::new().set("status", "MENU"), now_ms)
    }

    pub fn rematch(&mut self, now_ms: u64) -> Result<(), SyncError> {
        let Some(next) = self.state().map(Connect4State::rematch) else {
            return Ok(());
        };
        self.write(&next, now_ms)
    }

    /// Plays this participant's own move. Returns false if it was not allowed.
    pub fn drop_disc(&mut self, col: usize, now_ms: u64) -> Result<bool, SyncError> {
        let seat = self.seat();
        let Some(next) = self
            .state()
            .filter(|state| state.can_move(seat))
            .and_then(|state| state.play(col))
        else {
            return Ok(false);
        };
        self.write(&next, now_ms)?;
        Ok(true)
    }

    fn host_duties(&mut self, now_ms: u64) -> Result<(), SyncError> {
        let Some(state) = self.state().cloned() else {
            return Ok(());
        };

        if state.needs_repair() {
            log::warn!("[connect4] {} has an invalid board, resetting", self.sync.key());
            let next = Connect4State {
                scores: state.scores,
                ..Connect4State::default()
            };
            return self.write(&next, now_ms);
        }

        if !state.ai_to_move() {
            self.ai_due_at = None;
            return Ok(());
        }

        let due = *self.ai_due_at.get_or_insert(now_ms + self.ai_delay_ms);
        if now_ms < due {
            return Ok(());
        }
        self.ai_due_at = None;

        let config = SearchConfig::from(state.difficulty);
        let Some(col) = best_move(&state.board, Disc::Yellow, &config) else {
            return Ok(());
        };
        match state.play(col) {
            Some(next) => self.write(&next, now_ms),
            None => Ok(()),
        }
    }
}

impl Session for Connect4Session {
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

        let mut lines: Vec<String> = (0..ROWS)
            .map(|row| {
                (0..COLS)
                    .map(|col| match state.board.get(row, col) {
                        Some(Disc::Red) => 'R',
                        Some(Disc::Yellow) => 'Y',
                        None => '.',
                    })
                    .collect()
            })
            .collect();
        lines.push(format!(
            "{:?} turn={:?} red={} yellow={} winner={:?}",
            state.status, state.turn, state.scores.red, state.scores.yellow, state.winner
        ));
        lines
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sync::{MemoryStore, ParticipantId, SyncConfig, decode_payload};

    fn session(store: &MemoryStore, id: &str) -> Connect4Session {
        let sync = GameSync::attach(
            Box::new(store.connect()),
            "s1",
            ParticipantId::new(id),
            Connect4State::default(),
            SyncConfig::default(),
            0,
        );
        Connect4Session::new(sync, 600)
    }

    #[test]
    fn sparse_board_decodes() {
        let payload = json!({
            "board": { "38": "red" },
            "turn": "yellow",
            "status": "PLAYING",
            "mode": "PVP",
            "difficulty": "HARD",
            "scores": { "red": 1 }
        });
        let state = decode_payload::<Connect4State>(&payload).unwrap();
        assert_eq!(state.board.get(5, 3), Some(Disc::Red));
        assert_eq!(state.turn, Disc::Yellow);
        assert_eq!(state.scores, Scores { red: 1, yellow: 0 });
        assert_eq!(state.winner, None);
    }

    #[test]
    fn winning_move_finishes_and_scores() {
        let mut state = Connect4State::default().started(Mode::Pvp, Difficulty::Medium);
        state.status = Phase::Playing;
        for col in [0, 6, 1, 6, 2, 5] {
            state = state.play(col).unwrap();
        }
        let done = state.play(3).unwrap();
        assert_eq!(done.winner, Some(Winner::Red));
        assert_eq!(done.status, Phase::Finished);
        assert_eq!(done.scores.red, 1);
        assert_eq!(done.winning_cells, vec![35, 36, 37, 38]);
        assert!(done.play(4).is_none());
    }

    #[test]
    fn turns_follow_seats() {
        let mut state = Connect4State::default().started(Mode::Pvp, Difficulty::Medium);
        assert!(!state.can_move(Seat::Host));
        state.status = Phase::Playing;
        assert!(state.can_move(Seat::Host));
        assert!(!state.can_move(Seat::Guest));
    }

    #[test]
    fn pvp_moves_replicate() {
        let store = MemoryStore::new();
        let mut host = session(&store, "a");
        let mut guest = session(&store, "b");

        host.start(Mode::Pvp, Difficulty::Medium, 1).unwrap();
        host.update(1).unwrap();
        host.start_anyway(2).unwrap();
        host.update(2).unwrap();
        guest.update(3).unwrap();
        assert_eq!(guest.phase(), Phase::Playing);

        assert!(!guest.drop_disc(3, 4).unwrap());
        assert!(host.drop_disc(3, 4).unwrap());
        guest.update(5).unwrap();
        assert!(guest.drop_disc(3, 6).unwrap());
        host.update(7).unwrap();

        let board = &host.state().unwrap().board;
        assert_eq!(board.get(5, 3), Some(Disc::Red));
        assert_eq!(board.get(4, 3), Some(Disc::Yellow));
    }

    #[test]
    fn host_answers_in_solo_after_delay() {
        let store = MemoryStore::new();
        let mut host = session(&store, "a");
        host.start(Mode::Solo, Difficulty::Beginner, 0).unwrap();
        host.update(0).unwrap();
        assert!(host.drop_disc(0, 10).unwrap());

        host.update(20).unwrap();
        assert_eq!(host.state().unwrap().turn, Disc::Yellow);
        host.update(700).unwrap();
        host.update(701).unwrap();
        assert_eq!(host.state().unwrap().turn, Disc::Red);
        assert!(host.state().unwrap().last_move.is_some());
    }

    #[test]
    fn host_repairs_floating_discs() {
        let store = MemoryStore::new();
        let mut host = session(&store, "a");
        host.start(Mode::Pvp, Difficulty::Medium, 0).unwrap();
        host.update(0).unwrap();
        host.start_anyway(0).unwrap();
        host.update(0).unwrap();
        assert_eq!(host.phase(), Phase::Playing);

        host.sync
            .propose_update(Patch::new().set("board/3", "red"), 1)
            .unwrap();
        host.update(2).unwrap();
        host.update(3).unwrap();
        assert_eq!(host.phase(), Phase::Menu);
        assert!(host.state().unwrap().board.is_empty());
    }
}
