mod authority;
mod client;
mod config;
mod document;
mod error;
mod identity;
mod schema;
mod store;

pub use authority::{AuthorityAction, PeerPresence, RoleResolver, presence_of};
pub use client::{ConnectionStatus, GameSync};
pub use config::{HostPolicy, SyncConfig};
pub use document::{
    DocKey, GameDocument, HOST_ID, LAST_UPDATED, PAYLOAD, PLAYERS, Patch, PlayerEntry, Role,
    get_path, normalize_array, normalize_array_at, set_path,
};
pub use error::{SchemaError, StoreError, SyncError};
pub use identity::{IdentityRegistry, ParticipantId};
pub use schema::{GameSchema, decode_document, decode_payload, encode_document};
pub use store::{
    CreateOutcome, DocumentChange, DocumentStore, MemoryConnection, MemoryStore, StoreFaults,
    StoreStats, Subscription,
};
