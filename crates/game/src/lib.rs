pub mod engine;
pub mod games;
pub mod hockey;
pub mod sync;
pub mod time;

pub use games::{
    BattleshipSession, Connect4Session, GameKind, GamePayload, Mode, PerSeat, Phase, Seat,
    Session, SprintSession,
};
pub use hockey::{HockeyConfig, HockeySession, HockeyState};
pub use sync::{
    ConnectionStatus, DocKey, DocumentStore, GameSchema, GameSync, HostPolicy, MemoryStore,
    ParticipantId, Patch, SyncConfig, SyncError,
};
