use serde_json::{Value, json};

use super::authority::{AuthorityAction, PeerPresence, RoleResolver};
use super::config::SyncConfig;
use super::document::{DocKey, GameDocument, HOST_ID, LAST_UPDATED, PAYLOAD, PLAYERS, Patch, Role};
use super::error::{SchemaError, SyncError};
use super::identity::ParticipantId;
use super::schema::{GameSchema, decode_document, encode_document};
use super::store::{CreateOutcome, DocumentStore, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Online,
    /// Store was unreachable at attach; the game runs solo on a local document.
    Offline,
    /// The host was gone past the policy timeout; proposals are refused.
    Terminated,
}

type Listener<P> = Box<dyn FnMut(&GameDocument<P>)>;

/// One participant's handle on the shared document for a (session, game) pair.
///
/// Consumers read [`state`](Self::state), check [`is_host`](Self::is_host),
/// send changes through [`propose_update`](Self::propose_update) and drain
/// remote changes with [`poll`](Self::poll) once per frame.
pub struct GameSync<P: GameSchema> {
    key: DocKey,
    initial: P,
    config: SyncConfig,
    resolver: RoleResolver,
    store: Option<Box<dyn DocumentStore>>,
    subscription: Option<Subscription>,
    local: Value,
    document: Option<GameDocument<P>>,
    is_host: bool,
    status: ConnectionStatus,
    last_heartbeat_ms: u64,
    listeners: Vec<Listener<P>>,
}

impl<P: GameSchema> GameSync<P> {
    pub fn attach(
        store: Box<dyn DocumentStore>,
        session: &str,
        me: ParticipantId,
        initial: P,
        config: SyncConfig,
        now_ms: u64,
    ) -> Self {
        let key = DocKey::new(session, P::GAME_ID);
        let resolver = RoleResolver::new(me, config.host_policy, config.presence_timeout_ms);
        let mut sync = Self {
            key,
            initial,
            config,
            resolver,
            store: None,
            subscription: None,
            local: Value::Null,
            document: None,
            is_host: false,
            status: ConnectionStatus::Online,
            last_heartbeat_ms: now_ms,
            listeners: Vec::new(),
        };

        match sync.join(store.as_ref(), now_ms) {
            Ok(subscription) => {
                sync.subscription = Some(subscription);
                sync.store = Some(store);
                sync.drain_changes();
            }
            Err(err) => {
                log::warn!("[sync] {} unavailable ({}), playing offline", sync.key, err);
                sync.go_offline(now_ms);
            }
        }

        sync
    }

    /// Attach with no store at all, e.g. when the backend was never configured.
    pub fn offline(session: &str, me: ParticipantId, initial: P, config: SyncConfig, now_ms: u64) -> Self {
        let key = DocKey::new(session, P::GAME_ID);
        let resolver = RoleResolver::new(me, config.host_policy, config.presence_timeout_ms);
        let mut sync = Self {
            key,
            initial,
            config,
            resolver,
            store: None,
            subscription: None,
            local: Value::Null,
            document: None,
            is_host: true,
            status: ConnectionStatus::Offline,
            last_heartbeat_ms: now_ms,
            listeners: Vec::new(),
        };
        sync.go_offline(now_ms);
        sync
    }

    fn join(&mut self, store: &dyn DocumentStore, now_ms: u64) -> Result<Subscription, SyncError> {
        let me = self.resolver.me().clone();
        let fresh = self.fresh_document(now_ms)?;

        match store.create_if_absent(&self.key, fresh)? {
            CreateOutcome::Created => {
                log::info!("[sync] {} created, {} is host", self.key, me);
                self.is_host = true;
            }
            CreateOutcome::Existing(existing) => {
                let host_id = existing
                    .get(HOST_ID)
                    .and_then(Value::as_str)
                    .map(ParticipantId::new);
                let role = match &host_id {
                    Some(host_id) => RoleResolver::role_against(&me, host_id),
                    None => Role::Client,
                };
                self.is_host = role == Role::Host;
                if self.is_host {
                    log::info!("[sync] {} resuming as host {}", self.key, me);
                } else {
                    log::info!("[sync] {} joining as client {}", self.key, me);
                }
                store.merge(&self.key, &self.presence_patch(role, now_ms))?;
            }
        }

        let subscription = store.subscribe(&self.key)?;
        store.on_disconnect_remove(&self.key, &format!("{PLAYERS}.{me}"))?;
        Ok(subscription)
    }

    fn fresh_document(&self, now_ms: u64) -> Result<Value, SyncError> {
        let document = GameDocument::new(self.resolver.me().clone(), self.initial.clone(), now_ms);
        encode_document(&document).map_err(|source| {
            SyncError::Schema(SchemaError::Encode {
                game_id: P::GAME_ID.to_string(),
                source,
            })
        })
    }

    fn presence_patch(&self, role: Role, now_ms: u64) -> Patch {
        Patch::new().set(
            format!("{PLAYERS}.{}", self.resolver.me()),
            json!({ "role": role, "lastSeen": now_ms }),
        )
    }

    fn go_offline(&mut self, now_ms: u64) {
        self.store = None;
        self.subscription = None;
        self.status = ConnectionStatus::Offline;
        self.is_host = true;
        self.local = match self.fresh_document(now_ms) {
            Ok(value) => value,
            Err(err) => {
                log::error!("[sync] {} cannot build local document: {}", self.key, err);
                Value::Null
            }
        };
        self.refresh_local();
    }

    fn refresh_local(&mut self) {
        match decode_document::<P>(&self.local) {
            Ok(document) => self.accept(document),
            Err(err) => log::warn!("[sync] {} local document invalid: {}", self.key, err),
        }
    }

    pub fn on_change(&mut self, listener: impl FnMut(&GameDocument<P>) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn key(&self) -> &DocKey {
        &self.key
    }

    pub fn me(&self) -> &ParticipantId {
        self.resolver.me()
    }

    pub fn state(&self) -> Option<&GameDocument<P>> {
        self.document.as_ref()
    }

    pub fn payload(&self) -> Option<&P> {
        self.document.as_ref().map(|document| &document.payload)
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_offline(&self) -> bool {
        self.status == ConnectionStatus::Offline
    }

    pub fn peer_presence(&self, now_ms: u64) -> PeerPresence {
        match &self.document {
            Some(document) => self.resolver.peer_presence(document, now_ms),
            None => PeerPresence::Absent,
        }
    }

    /// Merge-writes `patch` (paths relative to the payload). A failed write is
    /// logged and dropped; game transitions are whole-state writes, so the next
    /// one carries everything this one would have.
    pub fn propose_update(&mut self, patch: Patch, now_ms: u64) -> Result<(), SyncError> {
        if self.status == ConnectionStatus::Terminated {
            return Err(SyncError::Terminated);
        }
        if patch.is_empty() {
            return Ok(());
        }

        let mut patch = patch.prefixed(PAYLOAD);
        patch.push(LAST_UPDATED, now_ms);
        patch.validate()?;
        self.write(&patch);
        Ok(())
    }

    /// Puts the payload back to its initial value, keeping host and players.
    /// With no usable document at all the whole record is recreated with the
    /// caller as host.
    pub fn reset_to_initial(&mut self, now_ms: u64) -> Result<(), SyncError> {
        if self.status == ConnectionStatus::Terminated {
            return Err(SyncError::Terminated);
        }

        let initial = serde_json::to_value(&self.initial).map_err(|source| {
            SyncError::Schema(SchemaError::Encode {
                game_id: P::GAME_ID.to_string(),
                source,
            })
        })?;

        if self.document.is_some() {
            let patch = Patch::new().set(PAYLOAD, initial).set(LAST_UPDATED, now_ms);
            self.write(&patch);
            return Ok(());
        }

        let fresh = self.fresh_document(now_ms)?;
        match &self.store {
            Some(store) => {
                log::info!("[sync] {} recreated by {}", self.key, self.resolver.me());
                if let Err(err) = store.replace(&self.key, fresh) {
                    log::warn!("[sync] {} reset failed: {}", self.key, err);
                }
            }
            None => {
                self.local = fresh;
                self.refresh_local();
            }
        }
        Ok(())
    }

    fn write(&mut self, patch: &Patch) {
        match &self.store {
            Some(store) => {
                if let Err(err) = store.merge(&self.key, patch) {
                    log::warn!("[sync] {} write dropped: {}", self.key, err);
                }
            }
            None => {
                if let Err(err) = patch.apply_to(&mut self.local) {
                    log::warn!("[sync] {} local write dropped: {}", self.key, err);
                    return;
                }
                self.refresh_local();
            }
        }
    }

    /// Drains remote changes, runs the heartbeat and the host policy. Returns
    /// how many new document states were accepted.
    pub fn poll(&mut self, now_ms: u64) -> usize {
        if self.store.is_none() {
            return 0;
        }

        let accepted = self.drain_changes();
        self.heartbeat(now_ms);
        self.apply_host_policy(now_ms);
        accepted
    }

    fn drain_changes(&mut self) -> usize {
        let mut accepted = 0;
        while let Some(change) = self.subscription.as_mut().and_then(Subscription::try_next) {
            let Some(value) = change.value else {
                log::warn!("[sync] {} was deleted remotely", self.key);
                continue;
            };
            match decode_document::<P>(&value) {
                Ok(document) => {
                    self.accept(document);
                    accepted += 1;
                }
                Err(err) => {
                    log::warn!("[sync] {} ignoring malformed update: {}", self.key, err);
                }
            }
        }
        accepted
    }

    fn accept(&mut self, document: GameDocument<P>) {
        let is_host = self.is_offline() || document.is_host(self.resolver.me());
        if is_host != self.is_host {
            log::info!(
                "[sync] {} role changed: {} is now {}",
                self.key,
                self.resolver.me(),
                if is_host { "host" } else { "client" }
            );
        }
        self.is_host = is_host;

        for listener in &mut self.listeners {
            listener(&document);
        }
        self.document = Some(document);
    }

    fn heartbeat(&mut self, now_ms: u64) {
        if self.status != ConnectionStatus::Online
            || now_ms.saturating_sub(self.last_heartbeat_ms) < self.config.heartbeat_interval_ms
        {
            return;
        }
        self.last_heartbeat_ms = now_ms;

        // The whole entry: cleanup may have removed it while we stayed attached.
        let role = match &self.document {
            Some(document) => self.resolver.role(document),
            None if self.is_host => Role::Host,
            None => Role::Client,
        };
        let patch = self.presence_patch(role, now_ms);
        if let Some(store) = &self.store {
            if let Err(err) = store.merge(&self.key, &patch) {
                log::warn!("[sync] {} heartbeat dropped: {}", self.key, err);
            }
        }
    }

    fn apply_host_policy(&mut self, now_ms: u64) {
        if self.status != ConnectionStatus::Online {
            return;
        }
        let Some(document) = &self.document else {
            return;
        };

        match self.resolver.observe(document, now_ms) {
            AuthorityAction::None => {}
            AuthorityAction::ClaimHost => {
                log::info!(
                    "[sync] {} host {} gone, {} claiming",
                    self.key,
                    document.host_id,
                    self.resolver.me()
                );
                let patch = self.resolver.claim_patch(document, now_ms);
                if let Some(store) = &self.store {
                    if let Err(err) = store.merge(&self.key, &patch) {
                        log::warn!("[sync] {} claim dropped: {}", self.key, err);
                    }
                }
            }
            AuthorityAction::Terminate => {
                log::info!("[sync] {} host {} gone, terminating", self.key, document.host_id);
                self.status = ConnectionStatus::Terminated;
            }
        }
    }

    /// Stops listening and lets the store drop this participant's presence.
    /// Already written state stays in the document.
    pub fn detach(mut self) {
        self.subscription = None;
        if let Some(store) = self.store.take() {
            store.disconnect();
        }
        log::debug!("[sync] {} detached", self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::sync::config::HostPolicy;
    use crate::sync::store::{MemoryStore, StoreFaults};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        turn: u32,
    }

    impl GameSchema for Counter {
        const GAME_ID: &'static str = "counter_v1";
    }

    fn attach(store: &MemoryStore, id: &str, now: u64) -> GameSync<Counter> {
        GameSync::attach(
            Box::new(store.connect()),
            "s1",
            ParticipantId::new(id),
            Counter { turn: 0 },
            SyncConfig::default(),
            now,
        )
    }

    #[test]
    fn first_attach_becomes_host() {
        let store = MemoryStore::new();
        let a = attach(&store, "a", 0);
        let b = attach(&store, "b", 0);

        assert!(a.is_host());
        assert!(!b.is_host());
        assert_eq!(b.state().unwrap().host_id, ParticipantId::new("a"));
        assert_eq!(b.payload(), Some(&Counter { turn: 0 }));
    }

    #[test]
    fn refresh_resumes_host_role() {
        let store = MemoryStore::new();
        let a = attach(&store, "a", 0);
        let _b = attach(&store, "b", 0);
        drop(a);

        let again = attach(&store, "a", 10);
        assert!(again.is_host());
    }

    #[test]
    fn listeners_see_remote_updates() {
        let store = MemoryStore::new();
        let mut a = attach(&store, "a", 0);
        let mut b = attach(&store, "b", 0);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        b.on_change(move |document| sink.borrow_mut().push(document.payload.turn));

        a.propose_update(Patch::new().set("turn", 1), 5).unwrap();
        assert_eq!(b.poll(5), 1);
        assert_eq!(*seen.borrow(), vec![1]);
    }

    #[test]
    fn unreachable_store_falls_back_offline() {
        let store = MemoryStore::new();
        store.set_global_faults(Some(StoreFaults {
            unreachable: true,
            ..Default::default()
        }));

        let mut solo = attach(&store, "solo", 0);
        assert_eq!(solo.status(), ConnectionStatus::Offline);
        assert!(solo.is_host());

        solo.propose_update(Patch::new().set("turn", 4), 1).unwrap();
        assert_eq!(solo.payload(), Some(&Counter { turn: 4 }));
        assert!(solo.is_host());
        assert_eq!(store.document_count(), 0);
    }

    #[test]
    fn rejected_writes_are_dropped() {
        let store = MemoryStore::new();
        let mut a = attach(&store, "a", 0);
        let mut b = attach(&store, "b", 0);
        store.set_global_faults(Some(StoreFaults {
            reject_writes: true,
            ..Default::default()
        }));

        a.propose_update(Patch::new().set("turn", 9), 1).unwrap();
        assert_eq!(b.poll(1), 0);
        assert_eq!(b.payload(), Some(&Counter { turn: 0 }));

        store.set_global_faults(None);
        a.propose_update(Patch::new().set("turn", 10), 2).unwrap();
        b.poll(2);
        assert_eq!(b.payload(), Some(&Counter { turn: 10 }));
    }

    #[test]
    fn heartbeat_refreshes_last_seen() {
        let store = MemoryStore::new();
        let mut a = attach(&store, "a", 0);
        let mut b = attach(&store, "b", 0);

        a.poll(6_000);
        b.poll(6_000);
        let document = b.state().unwrap();
        assert_eq!(document.players[&ParticipantId::new("a")].last_seen, 6_000);
        assert_eq!(b.peer_presence(6_000), PeerPresence::Live);
    }

    #[test]
    fn heartbeat_restores_removed_presence() {
        let store = MemoryStore::new();
        let mut a = attach(&store, "a", 0);
        let mut b = attach(&store, "b", 0);
        let key = DocKey::new("s1", Counter::GAME_ID);

        store
            .connect()
            .merge(&key, &Patch::new().remove("players.b"))
            .unwrap();
        b.poll(6_000);
        a.propose_update(Patch::new().set("turn", 1), 6_001).unwrap();

        assert!(a.poll(6_002) > 0);
        assert!(b.poll(6_002) > 0);
        assert_eq!(b.payload(), Some(&Counter { turn: 1 }));
        let entry = &a.state().unwrap().players[&ParticipantId::new("b")];
        assert_eq!(entry.role, Role::Client);
        assert_eq!(entry.last_seen, 6_000);
    }

    #[test]
    fn entry_without_role_does_not_block_updates() {
        let store = MemoryStore::new();
        let mut a = attach(&store, "a", 0);
        let mut b = attach(&store, "b", 0);
        let key = DocKey::new("s1", Counter::GAME_ID);

        store
            .connect()
            .merge(&key, &Patch::new().set("players.c.lastSeen", 5))
            .unwrap();
        a.propose_update(Patch::new().set("turn", 2), 6).unwrap();

        b.poll(7);
        assert_eq!(b.payload(), Some(&Counter { turn: 2 }));
        assert_eq!(b.state().unwrap().players[&ParticipantId::new("c")].role, Role::Client);
    }

    #[test]
    fn former_host_rejoins_recreated_document_as_client() {
        let store = MemoryStore::new();
        let a = attach(&store, "a", 0);
        a.detach();

        let key = DocKey::new("s1", Counter::GAME_ID);
        let recreated = json!({
            "hostId": "b",
            "players": { "b": { "role": "host", "lastSeen": 10 } },
            "payload": { "turn": 5 },
            "lastUpdated": 10
        });
        store.connect().replace(&key, recreated).unwrap();

        let again = attach(&store, "a", 20);
        assert!(!again.is_host());
        let document = again.state().unwrap();
        assert_eq!(document.host_id, ParticipantId::new("b"));
        assert_eq!(document.payload, Counter { turn: 5 });
        assert_eq!(document.players[&ParticipantId::new("a")].role, Role::Client);
    }

    #[test]
    fn client_claims_orphaned_document_when_allowed() {
        let store = MemoryStore::new();
        let a = attach(&store, "a", 0);
        let mut b = GameSync::<Counter>::attach(
            Box::new(store.connect()),
            "s1",
            ParticipantId::new("b"),
            Counter { turn: 0 },
            SyncConfig {
                host_policy: HostPolicy::ClaimAfterTimeout { timeout_ms: 1_000 },
                ..Default::default()
            },
            0,
        );

        a.detach();
        b.poll(100);
        assert!(!b.is_host());
        b.poll(1_200);
        b.poll(1_201);
        assert!(b.is_host());
    }

    #[test]
    fn terminated_instance_refuses_proposals() {
        let store = MemoryStore::new();
        let a = attach(&store, "a", 0);
        let mut b = GameSync::<Counter>::attach(
            Box::new(store.connect()),
            "s1",
            ParticipantId::new("b"),
            Counter { turn: 0 },
            SyncConfig {
                host_policy: HostPolicy::Terminate { timeout_ms: 500 },
                ..Default::default()
            },
            0,
        );

        a.detach();
        b.poll(10);
        b.poll(600);
        assert_eq!(b.status(), ConnectionStatus::Terminated);
        assert!(matches!(
            b.propose_update(Patch::new().set("turn", 1), 601),
            Err(SyncError::Terminated)
        ));
    }

    #[test]
    fn reset_restores_initial_payload() {
        let store = MemoryStore::new();
        let mut a = attach(&store, "a", 0);
        a.propose_update(Patch::new().set("turn", 3), 1).unwrap();
        a.poll(1);
        a.reset_to_initial(2).unwrap();
        a.poll(2);
        assert_eq!(a.payload(), Some(&Counter { turn: 0 }));
        assert!(a.is_host());
    }
}
