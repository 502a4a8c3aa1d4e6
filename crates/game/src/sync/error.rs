use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unreachable")]
    Unreachable,
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("invalid path `{0}`")]
    InvalidPath(String),
    #[error("document `{0}` not found")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown game `{0}`")]
    UnknownGame(String),
    #[error("payload for `{game_id}` failed to decode: {source}")]
    Decode {
        game_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("payload for `{game_id}` failed to encode: {source}")]
    Encode {
        game_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("document is missing `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("game instance terminated")]
    Terminated,
}
