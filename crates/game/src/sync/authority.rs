use serde_json::json;

use super::config::HostPolicy;
use super::document::{GameDocument, HOST_ID, Patch, PlayerEntry, PLAYERS, Role};
use super::identity::ParticipantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPresence {
    Absent,
    Live,
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityAction {
    None,
    ClaimHost,
    Terminate,
}

pub fn presence_of(entry: Option<&PlayerEntry>, now_ms: u64, timeout_ms: u64) -> PeerPresence {
    match entry {
        None => PeerPresence::Absent,
        Some(entry) if now_ms.saturating_sub(entry.last_seen) > timeout_ms => PeerPresence::Silent,
        Some(_) => PeerPresence::Live,
    }
}

/// Host is whoever `hostId` names. Nothing is negotiated: the first creator of the
/// document holds the role until the document is recreated or the configured
/// [`HostPolicy`] lets a survivor claim it.
#[derive(Debug, Clone)]
pub struct RoleResolver {
    me: ParticipantId,
    policy: HostPolicy,
    presence_timeout_ms: u64,
    host_missing_since: Option<u64>,
}

impl RoleResolver {
    pub fn new(me: ParticipantId, policy: HostPolicy, presence_timeout_ms: u64) -> Self {
        Self {
            me,
            policy,
            presence_timeout_ms,
            host_missing_since: None,
        }
    }

    pub fn me(&self) -> &ParticipantId {
        &self.me
    }

    pub fn policy(&self) -> HostPolicy {
        self.policy
    }

    pub fn role<P>(&self, document: &GameDocument<P>) -> Role {
        Self::role_against(&self.me, &document.host_id)
    }

    /// A reattaching participant takes whatever role `hostId` gives it, even if it
    /// held the host role before disconnecting.
    pub fn role_against(me: &ParticipantId, host_id: &ParticipantId) -> Role {
        if me == host_id { Role::Host } else { Role::Client }
    }

    pub fn peer_presence<P>(&self, document: &GameDocument<P>, now_ms: u64) -> PeerPresence {
        let entry = document.peer_of(&self.me).map(|(_, entry)| entry);
        presence_of(entry, now_ms, self.presence_timeout_ms)
    }

    /// Checks whether the host has been gone long enough for the policy to act.
    pub fn observe<P>(&mut self, document: &GameDocument<P>, now_ms: u64) -> AuthorityAction {
        if document.is_host(&self.me) {
            self.host_missing_since = None;
            return AuthorityAction::None;
        }

        let timeout_ms = match self.policy {
            HostPolicy::Orphan => return AuthorityAction::None,
            HostPolicy::ClaimAfterTimeout { timeout_ms } | HostPolicy::Terminate { timeout_ms } => {
                timeout_ms
            }
        };

        let gone_for = match document.players.get(&document.host_id) {
            Some(entry) => {
                self.host_missing_since = None;
                now_ms.saturating_sub(entry.last_seen)
            }
            None => {
                let since = *self.host_missing_since.get_or_insert(now_ms);
                now_ms.saturating_sub(since)
            }
        };

        if gone_for <= timeout_ms {
            return AuthorityAction::None;
        }

        match self.policy {
            HostPolicy::ClaimAfterTimeout { .. } => AuthorityAction::ClaimHost,
            HostPolicy::Terminate { .. } => AuthorityAction::Terminate,
            HostPolicy::Orphan => AuthorityAction::None,
        }
    }

    pub fn claim_patch<P>(&self, document: &GameDocument<P>, now_ms: u64) -> Patch {
        let mut patch = Patch::new().set(HOST_ID, self.me.as_str()).set(
            format!("{PLAYERS}.{}", self.me),
            json!({ "role": Role::Host, "lastSeen": now_ms }),
        );
        if document.players.contains_key(&document.host_id) {
            patch.push(format!("{PLAYERS}.{}.role", document.host_id), json!(Role::Client));
        }
        patch
    }
}
