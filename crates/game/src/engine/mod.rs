//! Move and control policies. Everything here is a pure function of the state
//! handed in plus an explicit scratch object owned by the caller.

pub mod battleship;
pub mod connect4;
pub mod paddle;

pub use battleship::{TargetingMemory, TargetingMode};
pub use connect4::{Board, Difficulty, Disc, Outcome, SearchConfig, best_move};
pub use paddle::{PaddleConfig, PaddlePolicy, PidController, PidGains, predict_intercept_x};
