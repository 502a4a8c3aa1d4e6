use serde::{Deserialize, Serialize};

pub const ROWS: usize = 6;
pub const COLS: usize = 7;
pub const CELLS: usize = ROWS * COLS;

const CENTER: usize = COLS / 2;
const MOVE_ORDER: [usize; COLS] = [3, 2, 4, 1, 5, 0, 6];
const WIN_SCORE: i32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disc {
    Red,
    Yellow,
}

impl Disc {
    pub fn other(self) -> Self {
        match self {
            Disc::Red => Disc::Yellow,
            Disc::Yellow => Disc::Red,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win { disc: Disc, cells: [usize; 4] },
    Draw,
}

/// Row-major 6x7 grid, row 0 at the top. Discs fall toward row 5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<Disc>>", into = "Vec<Option<Disc>>")]
pub struct Board {
    cells: [Option<Disc>; CELLS],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<Vec<Option<Disc>>> for Board {
    type Error = String;

    fn try_from(cells: Vec<Option<Disc>>) -> Result<Self, Self::Error> {
        let len = cells.len();
        let cells: [Option<Disc>; CELLS] = cells
            .try_into()
            .map_err(|_| format!("board must have {CELLS} cells, got {len}"))?;
        Ok(Self { cells })
    }
}

impl From<Board> for Vec<Option<Disc>> {
    fn from(board: Board) -> Self {
        board.cells.to_vec()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            cells: [None; CELLS],
        }
    }

    pub fn index(row: usize, col: usize) -> usize {
        row * COLS + col
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Disc> {
        self.cells[Self::index(row, col)]
    }

    pub fn cells(&self) -> &[Option<Disc>; CELLS] {
        &self.cells
    }

    /// Row a disc dropped in `col` would land on.
    pub fn drop_row(&self, col: usize) -> Option<usize> {
        if col >= COLS {
            return None;
        }
        (0..ROWS).rev().find(|&row| self.get(row, col).is_none())
    }

    pub fn valid_columns(&self) -> Vec<usize> {
        (0..COLS).filter(|&col| self.cells[col].is_none()).collect()
    }

    /// Places a disc and returns its cell index, or `None` if the column is full.
    pub fn drop_disc(&mut self, col: usize, disc: Disc) -> Option<usize> {
        let row = self.drop_row(col)?;
        let index = Self::index(row, col);
        self.cells[index] = Some(disc);
        Some(index)
    }

    fn clear(&mut self, index: usize) {
        self.cells[index] = None;
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub fn fill_ratio(&self) -> f32 {
        self.cells.iter().filter(|cell| cell.is_some()).count() as f32 / CELLS as f32
    }

    /// False if any disc floats above an empty cell.
    pub fn is_valid(&self) -> bool {
        (0..COLS).all(|col| {
            let mut seen_empty = false;
            for row in (0..ROWS).rev() {
                match self.get(row, col) {
                    None => seen_empty = true,
                    Some(_) if seen_empty => return false,
                    Some(_) => {}
                }
            }
            true
        })
    }

    pub fn outcome(&self) -> Option<Outcome> {
        for window in windows() {
            if let Some(disc) = self.cells[window[0]] {
                if window.iter().all(|&i| self.cells[i] == Some(disc)) {
                    return Some(Outcome::Win {
                        disc,
                        cells: window,
                    });
                }
            }
        }
        self.is_full().then_some(Outcome::Draw)
    }

    fn winner(&self) -> Option<Disc> {
        match self.outcome()? {
            Outcome::Win { disc, .. } => Some(disc),
            Outcome::Draw => None,
        }
    }
}

/// Every horizontal, vertical and diagonal run of four cells.
fn windows() -> impl Iterator<Item = [usize; 4]> {
    let horizontal = (0..ROWS).flat_map(|r| (0..=COLS - 4).map(move |c| run(r, c, 0, 1)));
    let vertical = (0..=ROWS - 4).flat_map(|r| (0..COLS).map(move |c| run(r, c, 1, 0)));
    let falling = (0..=ROWS - 4).flat_map(|r| (0..=COLS - 4).map(move |c| run(r, c, 1, 1)));
    let rising = (3..ROWS).flat_map(|r| (0..=COLS - 4).map(move |c| run(r, c, -1, 1)));
    horizontal.chain(vertical).chain(falling).chain(rising)
}

fn run(row: usize, col: usize, dr: isize, dc: isize) -> [usize; 4] {
    std::array::from_fn(|k| {
        let r = row as isize + dr * k as isize;
        let c = col as isize + dc * k as isize;
        Board::index(r as usize, c as usize)
    })
}

fn score_window(board: &Board, window: &[usize; 4], me: Disc) -> i32 {
    let mut own = 0;
    let mut empty = 0;
    let mut enemy = 0;
    for &i in window {
        match board.cells[i] {
            Some(disc) if disc == me => own += 1,
            Some(_) => enemy += 1,
            None => empty += 1,
        }
    }

    match (own, empty, enemy) {
        (4, _, _) => 100,
        (3, 1, _) => 5,
        (2, 2, _) => 2,
        (_, 1, 3) => -4,
        _ => 0,
    }
}

/// Static score of `board` from `me`'s point of view.
pub fn evaluate(board: &Board, me: Disc) -> i32 {
    let center = (0..ROWS)
        .filter(|&row| board.get(row, CENTER) == Some(me))
        .count() as i32;
    center * 3
        + windows()
            .map(|window| score_window(board, &window, me))
            .sum::<i32>()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Beginner,
    #[default]
    Medium,
    Hard,
    Expert,
    Impossible,
}

impl Difficulty {
    pub const ALL: [Difficulty; 5] = [
        Difficulty::Beginner,
        Difficulty::Medium,
        Difficulty::Hard,
        Difficulty::Expert,
        Difficulty::Impossible,
    ];

    pub fn depth(self) -> u8 {
        match self {
            Difficulty::Beginner => 1,
            Difficulty::Medium => 2,
            Difficulty::Hard => 3,
            Difficulty::Expert => 4,
            Difficulty::Impossible => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    /// Plies searched, clamped to 1..=5.
    pub depth: u8,
    /// Board fill at which the must-block shortcut skips the search.
    pub shortcut_fill_ratio: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            depth: Difficulty::default().depth(),
            shortcut_fill_ratio: 0.5,
        }
    }
}

impl From<Difficulty> for SearchConfig {
    fn from(difficulty: Difficulty) -> Self {
        Self {
            depth: difficulty.depth(),
            ..Default::default()
        }
    }
}

fn immediate_win(board: &mut Board, disc: Disc) -> Option<usize> {
    MOVE_ORDER.into_iter().find(|&col| {
        let Some(index) = board.drop_disc(col, disc) else {
            return false;
        };
        let wins = board.winner() == Some(disc);
        board.clear(index);
        wins
    })
}

/// Column `me` should play next, or `None` on a full board.
pub fn best_move(board: &Board, me: Disc, config: &SearchConfig) -> Option<usize> {
    if board.valid_columns().is_empty() {
        return None;
    }
    if board.is_empty() {
        return Some(CENTER);
    }

    let mut scratch = board.clone();
    if let Some(col) = immediate_win(&mut scratch, me) {
        return Some(col);
    }
    if board.fill_ratio() >= config.shortcut_fill_ratio {
        if let Some(col) = immediate_win(&mut scratch, me.other()) {
            log::debug!("[connect4] blocking column {}", col);
            return Some(col);
        }
    }

    let depth = config.depth.clamp(1, 5);
    let (col, score) = minimax(&mut scratch, me, depth, i32::MIN, i32::MAX, true);
    log::debug!("[connect4] depth {} picked {:?} ({})", depth, col, score);
    col.or_else(|| board.valid_columns().first().copied())
}

fn minimax(
    board: &mut Board,
    me: Disc,
    depth: u8,
    mut alpha: i32,
    mut beta: i32,
    maximizing: bool,
) -> (Option<usize>, i32) {
    match board.outcome() {
        Some(Outcome::Win { disc, .. }) if disc == me => return (None, WIN_SCORE + depth as i32),
        Some(Outcome::Win { .. }) => return (None, -(WIN_SCORE + depth as i32)),
        Some(Outcome::Draw) => return (None, 0),
        None => {}
    }
    if depth == 0 {
        return (None, evaluate(board, me));
    }

    let mover = if maximizing { me } else { me.other() };
    let mut best_col = None;
    let mut best = if maximizing { i32::MIN } else { i32::MAX };

    for col in MOVE_ORDER {
        let Some(index) = board.drop_disc(col, mover) else {
            continue;
        };
        let (_, score) = minimax(board, me, depth - 1, alpha, beta, !maximizing);
        board.clear(index);

        if maximizing {
            if best_col.is_none() || score > best {
                best = score;
                best_col = Some(col);
            }
            alpha = alpha.max(score);
        } else {
            if best_col.is_none() || score < best {
                best = score;
                best_col = Some(col);
            }
            beta = beta.min(score);
        }
        if beta <= alpha {
            break;
        }
    }

    (best_col, best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board_from(rows: [&str; ROWS]) -> Board {
        let mut board = Board::new();
        for (r, line) in rows.iter().enumerate() {
            for (c, ch) in line.chars().enumerate() {
                board.cells[Board::index(r, c)] = match ch {
                    'R' => Some(Disc::Red),
                    'Y' => Some(Disc::Yellow),
                    _ => None,
                };
            }
        }
        board
    }

    #[test]
    fn discs_stack_from_the_bottom() {
        let mut board = Board::new();
        assert_eq!(board.drop_disc(2, Disc::Red), Some(Board::index(5, 2)));
        assert_eq!(board.drop_disc(2, Disc::Yellow), Some(Board::index(4, 2)));
        assert_eq!(board.drop_row(2), Some(3));
        assert_eq!(board.drop_row(9), None);
    }

    #[test]
    fn empty_board_opens_center() {
        assert_eq!(best_move(&Board::new(), Disc::Yellow, &SearchConfig::default()), Some(3));
    }

    #[test]
    fn full_board_has_no_move() {
        let mut board = Board::new();
        for r in 0..ROWS {
            for c in 0..COLS {
                let disc = if (c + r / 2) % 2 == 0 { Disc::Red } else { Disc::Yellow };
                board.cells[Board::index(r, c)] = Some(disc);
            }
        }
        assert_eq!(board.outcome(), Some(Outcome::Draw));
        assert_eq!(best_move(&board, Disc::Yellow, &SearchConfig::default()), None);
    }

    #[test]
    fn immediate_win_found_at_every_depth() {
        let board = board_from([
            ".......",
            ".......",
            ".......",
            ".......",
            "R......",
            "RYY.YRR",
        ]);
        for depth in 1..=5 {
            let config = SearchConfig {
                depth,
                shortcut_fill_ratio: 1.0,
            };
            assert_eq!(best_move(&board, Disc::Yellow, &config), Some(3), "depth {depth}");
        }
    }

    #[test]
    fn search_finds_win_without_shortcut() {
        let mut board = board_from([
            ".......",
            ".......",
            ".......",
            "...Y...",
            "...Y...",
            "RR.Y.R.",
        ]);
        for depth in 1..=5 {
            let (col, score) = minimax(&mut board, Disc::Yellow, depth, i32::MIN, i32::MAX, true);
            assert_eq!(col, Some(3));
            assert_eq!(score, WIN_SCORE + depth as i32 - 1);
        }
    }

    #[test]
    fn blocks_opponent_when_board_is_busy() {
        let board = board_from([
            ".......",
            ".......",
            ".......",
            ".......",
            ".......",
            "RRR.YY.",
        ]);
        let config = SearchConfig {
            depth: 1,
            shortcut_fill_ratio: 0.0,
        };
        assert_eq!(best_move(&board, Disc::Yellow, &config), Some(3));
    }

    #[test]
    fn evaluation_weights() {
        let board = board_from([
            ".......",
            ".......",
            ".......",
            ".......",
            ".......",
            "YYY....",
        ]);
        // own three with a gap at columns 0..4, own two with two gaps at 1..5
        assert_eq!(evaluate(&board, Disc::Yellow), 5 + 2);
        assert_eq!(evaluate(&board, Disc::Red), -4);
    }

    #[test]
    fn center_discs_count_triple() {
        let board = board_from([
            ".......",
            ".......",
            ".......",
            ".......",
            ".......",
            "...R...",
        ]);
        assert_eq!(evaluate(&board, Disc::Red), 3);
    }

    #[test]
    fn floating_disc_is_invalid() {
        let mut board = Board::new();
        assert!(board.is_valid());
        board.cells[Board::index(3, 4)] = Some(Disc::Red);
        assert!(!board.is_valid());
    }

    #[test]
    fn rising_diagonal_wins() {
        let board = board_from([
            ".......",
            ".......",
            "...R...",
            "..RY...",
            ".RYY...",
            "RYYR...",
        ]);
        match board.outcome() {
            Some(Outcome::Win { disc, cells }) => {
                assert_eq!(disc, Disc::Red);
                assert_eq!(cells, [35, 29, 23, 17]);
            }
            other => panic!("expected red win, got {other:?}"),
        }
    }

    #[test]
    fn wrong_length_board_fails_to_decode() {
        let cells: Vec<Option<Disc>> = vec![None; 10];
        assert!(Board::try_from(cells).is_err());
    }
}
