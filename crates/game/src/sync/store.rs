use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::document::{DocKey, Patch};
use super::error::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub key: DocKey,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created,
    Existing(Value),
}

/// Live feed of changes to one document. Dropping it cancels the subscription.
#[derive(Debug)]
pub struct Subscription {
    key: DocKey,
    receiver: UnboundedReceiver<DocumentChange>,
}

impl Subscription {
    pub fn new(key: DocKey, receiver: UnboundedReceiver<DocumentChange>) -> Self {
        Self { key, receiver }
    }

    pub fn key(&self) -> &DocKey {
        &self.key
    }

    pub fn try_next(&mut self) -> Option<DocumentChange> {
        self.receiver.try_recv().ok()
    }

    pub async fn next(&mut self) -> Option<DocumentChange> {
        self.receiver.recv().await
    }
}

/// The replicated key-value store the sync layer runs on. Any realtime pub/sub
/// backend offering these primitives can sit behind it.
pub trait DocumentStore: Send + Sync {
    fn read(&self, key: &DocKey) -> Result<Option<Value>, StoreError>;

    /// Atomic compare-and-create. Exactly one concurrent caller sees `Created`.
    fn create_if_absent(&self, key: &DocKey, document: Value) -> Result<CreateOutcome, StoreError>;

    fn merge(&self, key: &DocKey, patch: &Patch) -> Result<(), StoreError>;

    /// Full overwrite, reserved for explicit resets.
    fn replace(&self, key: &DocKey, document: Value) -> Result<(), StoreError>;

    /// The current value (if any) is delivered immediately.
    fn subscribe(&self, key: &DocKey) -> Result<Subscription, StoreError>;

    fn on_disconnect_remove(&self, key: &DocKey, path: &str) -> Result<(), StoreError>;

    fn disconnect(&self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreFaults {
    pub unreachable: bool,
    pub reject_writes: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
    pub rejected: u64,
    pub notifications: u64,
}

type ConnectionId = u32;

#[derive(Debug, Default)]
struct Backend {
    documents: HashMap<DocKey, Value>,
    subscribers: HashMap<DocKey, Vec<(ConnectionId, UnboundedSender<DocumentChange>)>>,
    disconnect_hooks: HashMap<ConnectionId, Vec<(DocKey, String)>>,
    connection_faults: HashMap<ConnectionId, StoreFaults>,
    global_faults: Option<StoreFaults>,
    next_connection: ConnectionId,
    stats: StoreStats,
}

impl Backend {
    fn faults(&self, connection: ConnectionId) -> StoreFaults {
        let local = self
            .connection_faults
            .get(&connection)
            .copied()
            .unwrap_or_default();
        let global = self.global_faults.unwrap_or_default();
        StoreFaults {
            unreachable: local.unreachable || global.unreachable,
            reject_writes: local.reject_writes || global.reject_writes,
        }
    }

    fn check_reachable(&self, connection: ConnectionId) -> Result<(), StoreError> {
        if self.faults(connection).unreachable {
            return Err(StoreError::Unreachable);
        }
        Ok(())
    }

    fn check_writable(&mut self, connection: ConnectionId) -> Result<(), StoreError> {
        self.check_reachable(connection)?;
        if self.faults(connection).reject_writes {
            self.stats.rejected += 1;
            return Err(StoreError::Rejected("write rejected by fault injection".into()));
        }
        self.stats.writes += 1;
        Ok(())
    }

    fn notify(&mut self, key: &DocKey) {
        let value = self.documents.get(key).cloned();
        let Some(subscribers) = self.subscribers.get_mut(key) else {
            return;
        };

        let mut delivered = 0;
        subscribers.retain(|(_, sender)| {
            let ok = sender
                .send(DocumentChange {
                    key: key.clone(),
                    value: value.clone(),
                })
                .is_ok();
            if ok {
                delivered += 1;
            }
            ok
        });
        self.stats.notifications += delivered;
    }

    fn run_disconnect_hooks(&mut self, connection: ConnectionId) {
        let hooks = self.disconnect_hooks.remove(&connection).unwrap_or_default();
        for (key, path) in hooks {
            if let Some(document) = self.documents.get_mut(&key) {
                if Patch::new().remove(path.clone()).apply_to(document).is_ok() {
                    log::debug!("[store] removed {} from {} on disconnect", path, key);
                    self.notify(&key);
                }
            }
        }

        for subscribers in self.subscribers.values_mut() {
            subscribers.retain(|(id, _)| *id != connection);
        }
    }
}

/// In-process store shared by every participant in one process. Each participant
/// talks to it through its own [`MemoryConnection`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    backend: Arc<Mutex<Backend>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Backend> {
        self.backend
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn connect(&self) -> MemoryConnection {
        let mut backend = self.lock();
        backend.next_connection += 1;
        MemoryConnection {
            store: self.clone(),
            id: backend.next_connection,
        }
    }

    pub fn set_global_faults(&self, faults: Option<StoreFaults>) {
        self.lock().global_faults = faults;
    }

    pub fn set_faults(&self, connection: &MemoryConnection, faults: StoreFaults) {
        self.lock().connection_faults.insert(connection.id, faults);
    }

    pub fn snapshot(&self, key: &DocKey) -> Option<Value> {
        self.lock().documents.get(key).cloned()
    }

    pub fn stats(&self) -> StoreStats {
        self.lock().stats
    }

    pub fn document_count(&self) -> usize {
        self.lock().documents.len()
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    store: MemoryStore,
    id: ConnectionId,
}

impl MemoryConnection {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl DocumentStore for MemoryConnection {
    fn read(&self, key: &DocKey) -> Result<Option<Value>, StoreError> {
        let mut backend = self.store.lock();
        backend.check_reachable(self.id)?;
        backend.stats.reads += 1;
        Ok(backend.documents.get(key).cloned())
    }

    fn create_if_absent(&self, key: &DocKey, document: Value) -> Result<CreateOutcome, StoreError> {
        let mut backend = self.store.lock();
        backend.check_reachable(self.id)?;

        if let Some(existing) = backend.documents.get(key) {
            return Ok(CreateOutcome::Existing(existing.clone()));
        }

        backend.check_writable(self.id)?;
        backend.documents.insert(key.clone(), document);
        backend.notify(key);
        Ok(CreateOutcome::Created)
    }

    fn merge(&self, key: &DocKey, patch: &Patch) -> Result<(), StoreError> {
        patch.validate()?;
        let mut backend = self.store.lock();
        backend.check_writable(self.id)?;

        let document = backend
            .documents
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Default::default()));
        patch.apply_to(document)?;
        backend.notify(key);
        Ok(())
    }

    fn replace(&self, key: &DocKey, document: Value) -> Result<(), StoreError> {
        let mut backend = self.store.lock();
        backend.check_writable(self.id)?;
        backend.documents.insert(key.clone(), document);
        backend.notify(key);
        Ok(())
    }

    fn subscribe(&self, key: &DocKey) -> Result<Subscription, StoreError> {
        let mut backend = self.store.lock();
        backend.check_reachable(self.id)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let current = backend.documents.get(key).cloned();
        if current.is_some() {
            let _ = sender.send(DocumentChange {
                key: key.clone(),
                value: current,
            });
        }
        backend
            .subscribers
            .entry(key.clone())
            .or_default()
            .push((self.id, sender));
        Ok(Subscription::new(key.clone(), receiver))
    }

    fn on_disconnect_remove(&self, key: &DocKey, path: &str) -> Result<(), StoreError> {
        Patch::new().remove(path).validate()?;
        let mut backend = self.store.lock();
        backend.check_reachable(self.id)?;
        backend
            .disconnect_hooks
            .entry(self.id)
            .or_default()
            .push((key.clone(), path.to_string()));
        Ok(())
    }

    fn disconnect(&self) {
        self.store.lock().run_disconnect_hooks(self.id);
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn key() -> DocKey {
        DocKey::new("s1", "g1")
    }

    #[test]
    fn first_creator_wins() {
        let store = MemoryStore::new();
        let a = store.connect();
        let b = store.connect();

        let first = a.create_if_absent(&key(), json!({ "hostId": "a" })).unwrap();
        let second = b.create_if_absent(&key(), json!({ "hostId": "b" })).unwrap();

        assert_eq!(first, CreateOutcome::Created);
        assert_eq!(second, CreateOutcome::Existing(json!({ "hostId": "a" })));
    }

    #[test]
    fn subscribe_replays_current_value() {
        let store = MemoryStore::new();
        let a = store.connect();
        a.create_if_absent(&key(), json!({ "turn": 0 })).unwrap();

        let mut sub = a.subscribe(&key()).unwrap();
        let change = sub.try_next().unwrap();
        assert_eq!(change.value, Some(json!({ "turn": 0 })));
        assert!(sub.try_next().is_none());

        a.merge(&key(), &Patch::new().set("turn", 1)).unwrap();
        assert_eq!(sub.try_next().unwrap().value, Some(json!({ "turn": 1 })));
    }

    #[test]
    fn disconnect_runs_removal_hooks() {
        let store = MemoryStore::new();
        let a = store.connect();
        let b = store.connect();
        a.create_if_absent(&key(), json!({ "players": { "a": {}, "b": {} } }))
            .unwrap();
        b.on_disconnect_remove(&key(), "players.b").unwrap();

        drop(b);

        assert_eq!(
            store.snapshot(&key()),
            Some(json!({ "players": { "a": {} } }))
        );
    }

    #[test]
    fn faults_block_reads_and_writes() {
        let store = MemoryStore::new();
        let a = store.connect();
        store.set_faults(
            &a,
            StoreFaults {
                unreachable: true,
                ..Default::default()
            },
        );
        assert_eq!(a.read(&key()), Err(StoreError::Unreachable));

        store.set_faults(
            &a,
            StoreFaults {
                reject_writes: true,
                ..Default::default()
            },
        );
        assert!(matches!(
            a.merge(&key(), &Patch::new().set("x", 1)),
            Err(StoreError::Rejected(_))
        ));
        assert_eq!(store.stats().rejected, 1);
        assert!(store.snapshot(&key()).is_none());
    }
}
