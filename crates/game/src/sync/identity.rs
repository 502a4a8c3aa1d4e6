use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

const ID_LEN: usize = 7;
const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Opaque participant identity. Stable for one tab session, not globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let id = (0..ID_LEN)
            .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
            .collect::<String>();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-tab identity storage. Each game namespace gets its own identity so two
/// games open in the same tab never share one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityRegistry {
    ids: HashMap<String, ParticipantId>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity_for<R: Rng + ?Sized>(&mut self, namespace: &str, rng: &mut R) -> ParticipantId {
        self.ids
            .entry(namespace.to_string())
            .or_insert_with(|| {
                let id = ParticipantId::generate(rng);
                log::debug!("[identity] new id {} for {}", id, namespace);
                id
            })
            .clone()
    }

    pub fn get(&self, namespace: &str) -> Option<&ParticipantId> {
        self.ids.get(namespace)
    }

    pub fn forget(&mut self, namespace: &str) -> Option<ParticipantId> {
        self.ids.remove(namespace)
    }
}
