use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::phase::{Mode, PerSeat, Phase, Seat};
use super::{Session, transition_patch};
use crate::engine::battleship::TargetingMemory;
use crate::sync::{
    ConnectionStatus, DocKey, GameSchema, GameSync, Patch, SyncError, normalize_array,
};

pub const GAME_ID: &str = "battleship_v1";
pub const GRID_SIZE: usize = 8;
pub const CELLS: usize = GRID_SIZE * GRID_SIZE;
pub const SHOT_LIMIT: u32 = 15;
pub const HIT_SCORE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cell {
    #[default]
    Empty,
    Ship,
    Miss,
    Hit,
}

impl Cell {
    pub fn is_tried(self) -> bool {
        matches!(self, Cell::Miss | Cell::Hit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shot {
    pub seat: Seat,
    pub index: usize,
    pub hit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BattleshipState {
    /// Bumped on every new game so hosts know to forget targeting memory.
    pub game: u32,
    pub status: Phase,
    pub mode: Mode,
    pub oceans: PerSeat<Vec<Cell>>,
    pub shots: PerSeat<u32>,
    pub scores: PerSeat<u32>,
    pub turn: Seat,
    /// Unset on a finished game means a draw.
    pub winner: Option<Seat>,
    pub last_shot: Option<Shot>,
}

impl Default for BattleshipState {
    fn default() -> Self {
        Self {
            game: 0,
            status: Phase::Menu,
            mode: Mode::Solo,
            oceans: PerSeat {
                host: vec![Cell::Empty; CELLS],
                guest: vec![Cell::Empty; CELLS],
            },
            shots: PerSeat::default(),
            scores: PerSeat::default(),
            turn: Seat::Host,
            winner: None,
            last_shot: None,
        }
    }
}

impl GameSchema for BattleshipState {
    const GAME_ID: &'static str = GAME_ID;

    fn normalize(payload: &mut Value) {
        let Some(oceans) = payload.get_mut("oceans").and_then(Value::as_object_mut) else {
            return;
        };
        for seat in [Seat::Host, Seat::Guest] {
            let ocean = oceans.entry(seat.key()).or_insert(Value::Null);
            normalize_array(ocean, CELLS);
            if let Value::Array(cells) = ocean {
                for cell in cells.iter_mut().filter(|cell| cell.is_null()) {
                    *cell = json!(Cell::Empty);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    pub ship_lengths: Vec<usize>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            ship_lengths: vec![1; 5],
        }
    }
}

/// Random non-overlapping placement, horizontal or vertical.
pub fn place_fleet<R: Rng + ?Sized>(rng: &mut R, fleet: &FleetConfig) -> Vec<Cell> {
    const ATTEMPTS: usize = 1_000;

    let mut ocean = vec![Cell::Empty; CELLS];
    for &length in &fleet.ship_lengths {
        if length == 0 || length > GRID_SIZE {
            log::warn!("[battleship] skipping ship of length {}", length);
            continue;
        }

        let placed = (0..ATTEMPTS).any(|_| {
            let horizontal = rng.random_bool(0.5);
            let (rows, cols) = if horizontal {
                (GRID_SIZE, GRID_SIZE - length + 1)
            } else {
                (GRID_SIZE - length + 1, GRID_SIZE)
            };
            let row = rng.random_range(0..rows);
            let col = rng.random_range(0..cols);
            let cells: Vec<usize> = (0..length)
                .map(|k| {
                    if horizontal {
                        row * GRID_SIZE + col + k
                    } else {
                        (row + k) * GRID_SIZE + col
                    }
                })
                .collect();

            if cells.iter().any(|&i| ocean[i] != Cell::Empty) {
                return false;
            }
            for i in cells {
                ocean[i] = Cell::Ship;
            }
            true
        });

        if !placed {
            log::warn!("[battleship] no room for ship of length {}", length);
        }
    }
    ocean
}

impl BattleshipState {
    pub fn started<R: Rng + ?Sized>(&self, mode: Mode, fleet: &FleetConfig, rng: &mut R) -> Self {
        Self {
            game: self.game + 1,
            status: Phase::on_start(mode),
            mode,
            oceans: PerSeat {
                host: place_fleet(rng, fleet),
                guest: place_fleet(rng, fleet),
            },
            ..Self::default()
        }
    }

    pub fn ships_left(&self, seat: Seat) -> usize {
        self.oceans
            .get(seat)
            .iter()
            .filter(|&&cell| cell == Cell::Ship)
            .count()
    }

    pub fn shots_left(&self, seat: Seat) -> u32 {
        SHOT_LIMIT.saturating_sub(*self.shots.get(seat))
    }

    pub fn can_fire(&self, seat: Seat) -> bool {
        self.status == Phase::Playing && self.turn == seat && self.shots_left(seat) > 0
    }

    /// `seat` fires at `index` in the other side's ocean. Returns the state after
    /// the shot and the patch that writes only what the shooter owns.
    pub fn fire(&self, seat: Seat, index: usize) -> Option<(Self, Patch)> {
        let target = seat.other();
        if !self.can_fire(seat) || self.oceans.get(target).get(index)?.is_tried() {
            return None;
        }

        let mut next = self.clone();
        let hit = next.oceans.get(target)[index] == Cell::Ship;
        next.oceans.get_mut(target)[index] = if hit { Cell::Hit } else { Cell::Miss };
        *next.shots.get_mut(seat) += 1;
        if hit {
            *next.scores.get_mut(seat) += HIT_SCORE;
        }
        next.last_shot = Some(Shot { seat, index, hit });

        if next.ships_left(target) == 0 {
            next.status = Phase::Finished;
            next.winner = Some(seat);
        } else if next.shots_left(seat) == 0 && next.shots_left(target) == 0 {
            next.status = Phase::Finished;
            let (mine, theirs) = (*next.scores.get(seat), *next.scores.get(target));
            next.winner = match mine.cmp(&theirs) {
                std::cmp::Ordering::Greater => Some(seat),
                std::cmp::Ordering::Less => Some(target),
                std::cmp::Ordering::Equal => None,
            };
        } else if next.shots_left(target) > 0 {
            next.turn = target;
        }

        let mut patch = Patch::new()
            .set(format!("oceans.{}.{}", target.key(), index), json!(next.oceans.get(target)[index]))
            .set(format!("shots.{}", seat.key()), *next.shots.get(seat))
            .set(format!("scores.{}", seat.key()), *next.scores.get(seat))
            .set("turn", json!(next.turn))
            .set("lastShot", json!(next.last_shot));
        if next.status == Phase::Finished {
            patch.push("status", json!(next.status));
            patch.push("winner", json!(next.winner));
        }
        Some((next, patch))
    }

    /// Cells of `seat`'s ocean the opponent has already fired at.
    pub fn tried(&self, seat: Seat) -> Vec<bool> {
        self.oceans.get(seat).iter().map(|cell| cell.is_tried()).collect()
    }
}

/// The host owns fleet placement and, in solo games, fires back at the
/// player's ocean with hunt/target memory.
pub struct BattleshipSession {
    sync: GameSync<BattleshipState>,
    fleet: FleetConfig,
    rng: Pcg32,
    targeting: TargetingMemory,
    targeting_game: u32,
    ai_delay_ms: u64,
    ai_due_at: Option<u64>,
}

impl BattleshipSession {
    pub fn new(sync: GameSync<BattleshipState>, fleet: FleetConfig, seed: u64, ai_delay_ms: u64) -> Self {
        Self {
            sync,
            fleet,
            rng: Pcg32::seed_from_u64(seed),
            targeting: TargetingMemory::new(GRID_SIZE),
            targeting_game: 0,
            ai_delay_ms,
            ai_due_at: None,
        }
    }

    pub fn state(&self) -> Option<&BattleshipState> {
        self.sync.payload()
    }

    pub fn seat(&self) -> Seat {
        Seat::of(self.sync.is_host())
    }

    pub fn targeting(&self) -> &TargetingMemory {
        &self.targeting
    }

    pub fn start(&mut self, mode: Mode, now_ms: u64) -> Result<(), SyncError> {
        if !self.sync.is_host() {
            return Ok(());
        }
        let current = self.state().cloned().unwrap_or_default();
        let next = current.started(mode, &self.fleet, &mut self.rng);
        log::info!("[battleship] game {} starting ({:?})", next.game, mode);
        self.sync.propose_update(transition_patch(&next)?, now_ms)
    }

    pub fn start_anyway(&mut self, now_ms: u64) -> Result<(), SyncError> {
        if !self.sync.is_host() || self.state().map(|s| s.status) != Some(Phase::Waiting) {
            return Ok(());
        }
        self.sync
            .propose_update(Patch::new().set("status", json!(Phase::Playing)), now_ms)
    }

    /// Fires this participant's own shot. Returns false if it was not allowed.
    pub fn fire(&mut self, index: usize, now_ms: u64) -> Result<bool, SyncError> {
        let seat = self.seat();
        let Some((_, patch)) = self.state().and_then(|state| state.fire(seat, index)) else {
            return Ok(false);
        };
        self.sync.propose_update(patch, now_ms)?;
        Ok(true)
    }

    fn host_duties(&mut self, now_ms: u64) -> Result<(), SyncError> {
        let Some(state) = self.state().cloned() else {
            return Ok(());
        };

        if state.game != self.targeting_game {
            self.targeting.reset();
            self.targeting_game = state.game;
        }

        if state.mode != Mode::Solo || !state.can_fire(Seat::Guest) {
            self.ai_due_at = None;
            return Ok(());
        }
        let due = *self.ai_due_at.get_or_insert(now_ms + self.ai_delay_ms);
        if now_ms < due {
            return Ok(());
        }
        self.ai_due_at = None;

        let tried = state.tried(Seat::Host);
        let Some(index) = self.targeting.next_shot(&tried, &mut self.rng) else {
            return Ok(());
        };
        let Some((next, patch)) = state.fire(Seat::Guest, index) else {
            return Ok(());
        };
        let hit = next.last_shot.is_some_and(|shot| shot.hit);
        self.targeting.record(index, hit);
        log::debug!("[battleship] computer fires at {} ({})", index, if hit { "hit" } else { "miss" });
        self.sync.propose_update(patch, now_ms)
    }
}

impl Session for BattleshipSession {
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
        let seat = self.seat();
        let mine = state.oceans.get(seat);
        let theirs = state.oceans.get(seat.other());

        let mut lines: Vec<String> = (0..GRID_SIZE)
            .map(|row| {
                let own: String = (0..GRID_SIZE)
                    .map(|col| match mine[row * GRID_SIZE + col] {
                        Cell::Empty => '.',
                        Cell::Ship => 'S',
                        Cell::Miss => 'o',
                        Cell::Hit => 'X',
                    })
                    .collect();
                let enemy: String = (0..GRID_SIZE)
                    .map(|col| match theirs[row * GRID_SIZE + col] {
                        Cell::Empty | Cell::Ship => '.',
                        Cell::Miss => 'o',
                        Cell::Hit => 'X',
                    })
                    .collect();
                format!("{own}   {enemy}")
            })
            .collect();
        lines.push(format!(
            "{:?} turn={:?} score={} shots left={} winner={:?}",
            state.status,
            state.turn,
            state.scores.get(seat),
            state.shots_left(seat),
            state.winner
        ));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{MemoryStore, ParticipantId, SyncConfig, decode_payload};

    fn playing(mode: Mode) -> BattleshipState {
        let mut rng = Pcg32::seed_from_u64(11);
        let mut state = BattleshipState::default().started(mode, &FleetConfig::default(), &mut rng);
        state.status = Phase::Playing;
        state
    }

    fn first(state: &BattleshipState, seat: Seat, cell: Cell) -> usize {
        state
            .oceans
            .get(seat)
            .iter()
            .position(|&c| c == cell)
            .unwrap()
    }

    #[test]
    fn fleet_has_requested_cells() {
        let mut rng = Pcg32::seed_from_u64(2);
        let fleet = FleetConfig {
            ship_lengths: vec![4, 3, 2, 1],
        };
        let ocean = place_fleet(&mut rng, &fleet);
        assert_eq!(ocean.iter().filter(|&&c| c == Cell::Ship).count(), 10);
    }

    #[test]
    fn hit_scores_and_passes_turn() {
        let state = playing(Mode::Pvp);
        let target = first(&state, Seat::Guest, Cell::Ship);
        let (next, patch) = state.fire(Seat::Host, target).unwrap();

        assert_eq!(next.oceans.guest[target], Cell::Hit);
        assert_eq!(next.scores.host, HIT_SCORE);
        assert_eq!(next.turn, Seat::Guest);
        assert!(patch.entries().iter().all(|(path, _)| !path.starts_with("scores.guest")));
        assert!(state.fire(Seat::Guest, 0).is_none());
    }

    #[test]
    fn cannot_fire_twice_at_a_cell() {
        let mut state = playing(Mode::Pvp);
        let water = first(&state, Seat::Guest, Cell::Empty);
        state = state.fire(Seat::Host, water).unwrap().0;
        state.turn = Seat::Host;
        assert!(state.fire(Seat::Host, water).is_none());
    }

    #[test]
    fn sinking_the_fleet_wins() {
        let mut state = playing(Mode::Solo);
        let ships: Vec<usize> = (0..CELLS)
            .filter(|&i| state.oceans.guest[i] == Cell::Ship)
            .collect();
        for index in ships {
            state.turn = Seat::Host;
            state = state.fire(Seat::Host, index).unwrap().0;
        }
        assert_eq!(state.status, Phase::Finished);
        assert_eq!(state.winner, Some(Seat::Host));
        assert_eq!(state.scores.host, 5 * HIT_SCORE);
    }

    #[test]
    fn running_out_of_shots_ends_on_score() {
        let mut state = playing(Mode::Pvp);
        state.shots = PerSeat { host: SHOT_LIMIT - 1, guest: SHOT_LIMIT };
        state.scores = PerSeat { host: 0, guest: 100 };
        let water = first(&state, Seat::Guest, Cell::Empty);

        let (next, _) = state.fire(Seat::Host, water).unwrap();
        assert_eq!(next.status, Phase::Finished);
        assert_eq!(next.winner, Some(Seat::Guest));
    }

    #[test]
    fn sparse_ocean_normalizes_to_water() {
        let payload = serde_json::json!({ "oceans": { "host": { "3": "ship" } }, "status": "PLAYING" });
        let state = decode_payload::<BattleshipState>(&payload).unwrap();
        assert_eq!(state.oceans.host.len(), CELLS);
        assert_eq!(state.oceans.host[3], Cell::Ship);
        assert_eq!(state.oceans.guest[0], Cell::Empty);
    }

    #[test]
    fn solo_host_fires_back() {
        let store = MemoryStore::new();
        let sync = GameSync::attach(
            Box::new(store.connect()),
            "s1",
            ParticipantId::new("a"),
            BattleshipState::default(),
            SyncConfig::default(),
            0,
        );
        let mut session = BattleshipSession::new(sync, FleetConfig::default(), 9, 0);
        session.start(Mode::Solo, 0).unwrap();
        session.update(0).unwrap();

        let water = first(session.state().unwrap(), Seat::Guest, Cell::Empty);
        assert!(session.fire(water, 1).unwrap());
        session.update(2).unwrap();
        session.update(3).unwrap();

        let state = session.state().unwrap();
        assert_eq!(state.shots.guest, 1);
        assert_eq!(state.turn, Seat::Host);
        assert!(state.last_shot.is_some_and(|shot| shot.seat == Seat::Guest));
    }
}
