pub mod battleship;
pub mod connect4;
pub mod phase;
pub mod sprint;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hockey::HockeyState;
use crate::sync::{
    ConnectionStatus, DocKey, GameSchema, Patch, SchemaError, SyncError, decode_payload,
};

pub use battleship::{BattleshipSession, BattleshipState, Cell, FleetConfig};
pub use connect4::{Connect4Session, Connect4State};
pub use phase::{Mode, PerSeat, Phase, Seat};
pub use sprint::{Question, SprintConfig, SprintDifficulty, SprintSession, SprintState, Subject};

/// What the demo runner and the TUI need from any game a participant is in.
pub trait Session {
    fn key(&self) -> &DocKey;
    fn is_host(&self) -> bool;
    fn connection(&self) -> ConnectionStatus;
    fn phase(&self) -> Phase;

    /// Drains remote changes, then runs whatever this participant owns
    /// (physics, computer moves, round resolution).
    fn update(&mut self, now_ms: u64) -> Result<(), SyncError>;

    fn render(&self) -> Vec<String>;
}

/// A full-state transition as a patch with one entry per payload field.
pub(crate) fn transition_patch<P: GameSchema>(next: &P) -> Result<Patch, SyncError> {
    Patch::from_fields(next).map_err(|source| {
        SyncError::Schema(SchemaError::Encode {
            game_id: P::GAME_ID.to_string(),
            source,
        })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameKind {
    Connect4,
    Battleship,
    Sprint,
    AirHockey,
}

impl GameKind {
    pub const ALL: [GameKind; 4] = [
        GameKind::Connect4,
        GameKind::Battleship,
        GameKind::Sprint,
        GameKind::AirHockey,
    ];

    pub fn game_id(self) -> &'static str {
        match self {
            GameKind::Connect4 => Connect4State::GAME_ID,
            GameKind::Battleship => BattleshipState::GAME_ID,
            GameKind::Sprint => SprintState::GAME_ID,
            GameKind::AirHockey => HockeyState::GAME_ID,
        }
    }

    pub fn from_game_id(game_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.game_id() == game_id)
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.game_id())
    }
}

/// Any known payload, tagged by its versioned game id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "game", content = "payload")]
pub enum GamePayload {
    #[serde(rename = "connect4_v6")]
    Connect4(Connect4State),
    #[serde(rename = "battleship_v1")]
    Battleship(BattleshipState),
    #[serde(rename = "mathsprint_v1")]
    Sprint(SprintState),
    #[serde(rename = "airhockey_v3")]
    AirHockey(HockeyState),
}

impl GamePayload {
    /// Validates a raw payload for `game_id`, repairing known store mangling first.
    pub fn decode(game_id: &str, payload: &Value) -> Result<Self, SchemaError> {
        match GameKind::from_game_id(game_id) {
            Some(GameKind::Connect4) => decode_payload(payload).map(GamePayload::Connect4),
            Some(GameKind::Battleship) => decode_payload(payload).map(GamePayload::Battleship),
            Some(GameKind::Sprint) => decode_payload(payload).map(GamePayload::Sprint),
            Some(GameKind::AirHockey) => decode_payload(payload).map(GamePayload::AirHockey),
            None => Err(SchemaError::UnknownGame(game_id.to_string())),
        }
    }

    pub fn kind(&self) -> GameKind {
        match self {
            GamePayload::Connect4(_) => GameKind::Connect4,
            GamePayload::Battleship(_) => GameKind::Battleship,
            GamePayload::Sprint(_) => GameKind::Sprint,
            GamePayload::AirHockey(_) => GameKind::AirHockey,
        }
    }

    pub fn initial(kind: GameKind) -> Self {
        match kind {
            GameKind::Connect4 => GamePayload::Connect4(Connect4State::default()),
            GameKind::Battleship => GamePayload::Battleship(BattleshipState::default()),
            GameKind::Sprint => GamePayload::Sprint(SprintState::default()),
            GameKind::AirHockey => GamePayload::AirHockey(HockeyState::default()),
        }
    }
}
