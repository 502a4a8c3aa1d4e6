use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::StoreError;
use super::identity::ParticipantId;

pub const HOST_ID: &str = "hostId";
pub const PLAYERS: &str = "players";
pub const PAYLOAD: &str = "payload";
pub const LAST_UPDATED: &str = "lastUpdated";

/// Address of one game instance: a session plus a versioned game id such as
/// `connect4_v6`. Bumping the version addresses a fresh document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocKey {
    pub session: String,
    pub game: String,
}

impl DocKey {
    pub fn new(session: impl Into<String>, game: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            game: game.into(),
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sessions/{}/games/{}", self.session, self.game)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    #[default]
    Client,
}

/// A half-written entry (e.g. a heartbeat racing a disconnect cleanup) still
/// decodes; the role is advisory, `hostId` decides authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerEntry {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub last_seen: u64,
}

/// Typed view of the shared record for one game instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDocument<P> {
    pub host_id: ParticipantId,
    #[serde(default)]
    pub players: BTreeMap<ParticipantId, PlayerEntry>,
    pub payload: P,
    #[serde(default)]
    pub last_updated: u64,
}

impl<P> GameDocument<P> {
    pub fn new(host_id: ParticipantId, payload: P, now_ms: u64) -> Self {
        let mut players = BTreeMap::new();
        players.insert(
            host_id.clone(),
            PlayerEntry {
                role: Role::Host,
                last_seen: now_ms,
            },
        );
        Self {
            host_id,
            players,
            payload,
            last_updated: now_ms,
        }
    }

    pub fn is_host(&self, id: &ParticipantId) -> bool {
        &self.host_id == id
    }

    pub fn peer_of(&self, id: &ParticipantId) -> Option<(&ParticipantId, &PlayerEntry)> {
        self.players.iter().find(|(pid, _)| *pid != id)
    }
}

/// An ordered set of dotted-path writes. `null` values delete the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    entries: Vec<(String, Value)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((path.into(), value.into()));
        self
    }

    pub fn push(&mut self, path: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((path.into(), value.into()));
    }

    pub fn remove(self, path: impl Into<String>) -> Self {
        self.set(path, Value::Null)
    }

    /// One entry per top-level field of `value`, i.e. a whole-transition write.
    pub fn from_fields<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let mut patch = Self::new();
        match serde_json::to_value(value)? {
            Value::Object(fields) => {
                for (key, field) in fields {
                    patch.push(key, field);
                }
            }
            other => patch.push("", other),
        }
        Ok(patch)
    }

    /// Re-roots every path under `prefix`.
    pub fn prefixed(self, prefix: &str) -> Self {
        let entries = self
            .entries
            .into_iter()
            .map(|(path, value)| {
                if path.is_empty() {
                    (prefix.to_string(), value)
                } else {
                    (format!("{prefix}.{path}"), value)
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        for (path, _) in &self.entries {
            split_path(path)?;
        }
        Ok(())
    }

    pub fn apply_to(&self, target: &mut Value) -> Result<(), StoreError> {
        for (path, value) in &self.entries {
            set_path(target, path, value.clone())?;
        }
        Ok(())
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let segments: Vec<&str> = path.split(['.', '/']).collect();
    if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

pub fn set_path(target: &mut Value, path: &str, value: Value) -> Result<(), StoreError> {
    let segments = split_path(path)?;
    if value.is_null() {
        remove_path(target, &segments);
        return Ok(());
    }

    let mut node = target;
    for segment in &segments {
        node = child_mut(node, segment);
    }
    *node = value;
    Ok(())
}

fn child_mut<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = match &*node {
        Value::Array(items) => segment.parse::<usize>().ok().filter(|i| *i < items.len()),
        _ => None,
    };
    if let Some(index) = index {
        return &mut node[index];
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    &mut node[segment]
}

fn remove_path(target: &mut Value, segments: &[&str]) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut node = target;
    for segment in parents {
        let next = match node {
            Value::Object(fields) => fields.get_mut(*segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        };
        match next {
            Some(child) => node = child,
            None => return,
        }
    }

    match node {
        Value::Object(fields) => {
            fields.remove(*last);
        }
        Value::Array(items) => {
            if let Some(slot) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *slot = Value::Null;
            }
        }
        _ => {}
    }
}

pub fn get_path<'a>(target: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = split_path(path).ok()?;
    segments.iter().try_fold(target, |node, segment| match node {
        Value::Object(fields) => fields.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Stores sometimes hand arrays back as objects keyed by index, or drop trailing
/// nulls. Rebuilds a dense array of exactly `len` slots.
pub fn normalize_array(value: &mut Value, len: usize) {
    let mut dense = vec![Value::Null; len];
    match value.take() {
        Value::Array(items) => {
            for (index, item) in items.into_iter().enumerate().take(len) {
                dense[index] = item;
            }
        }
        Value::Object(fields) => {
            for (key, item) in fields {
                if let Ok(index) = key.parse::<usize>() {
                    if index < len {
                        dense[index] = item;
                    }
                }
            }
        }
        _ => {}
    }
    *value = Value::Array(dense);
}

pub fn normalize_array_at(payload: &mut Value, field: &str, len: usize) {
    if let Value::Object(fields) = payload {
        let slot = fields.entry(field.to_string()).or_insert(Value::Null);
        normalize_array(slot, len);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_path_creates_intermediate_objects() {
        let mut doc = json!({});
        set_path(&mut doc, "players.abc.role", json!("client")).unwrap();
        assert_eq!(doc, json!({ "players": { "abc": { "role": "client" } } }));
    }

    #[test]
    fn null_deletes_key() {
        let mut doc = json!({ "players": { "a": 1, "b": 2 } });
        set_path(&mut doc, "players.a", Value::Null).unwrap();
        assert_eq!(doc, json!({ "players": { "b": 2 } }));

        set_path(&mut doc, "missing.deep.key", Value::Null).unwrap();
        assert!(get_path(&doc, "missing").is_none());
    }

    #[test]
    fn slash_paths_address_array_slots() {
        let mut doc = json!({ "board": [null, null, null] });
        set_path(&mut doc, "board/1", json!("red")).unwrap();
        assert_eq!(doc["board"], json!([null, "red", null]));
    }

    #[test]
    fn empty_segments_are_rejected() {
        let mut doc = json!({});
        assert!(set_path(&mut doc, "a..b", json!(1)).is_err());
        assert!(set_path(&mut doc, "", json!(1)).is_err());
    }

    #[test]
    fn sparse_object_becomes_dense_array() {
        let mut board = json!({ "0": "red", "5": "yellow", "99": "ignored" });
        normalize_array(&mut board, 6);
        assert_eq!(board, json!(["red", null, null, null, null, "yellow"]));

        let mut short = json!(["red"]);
        normalize_array(&mut short, 3);
        assert_eq!(short, json!(["red", null, null]));
    }

    #[test]
    fn patch_prefix_and_fields() {
        #[derive(Serialize)]
        struct Turn {
            turn: u32,
            winner: Option<u32>,
        }

        let patch = Patch::from_fields(&Turn {
            turn: 1,
            winner: None,
        })
        .unwrap()
        .prefixed(PAYLOAD);

        let mut doc = json!({ "payload": { "turn": 0, "winner": 3 } });
        patch.apply_to(&mut doc).unwrap();
        assert_eq!(doc, json!({ "payload": { "turn": 1 } }));
    }
}
