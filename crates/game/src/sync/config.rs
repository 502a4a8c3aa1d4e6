/// What a client does when the host has been gone longer than a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostPolicy {
    /// Leave the document orphaned until someone resets it.
    #[default]
    Orphan,
    ClaimAfterTimeout {
        timeout_ms: u64,
    },
    Terminate {
        timeout_ms: u64,
    },
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub heartbeat_interval_ms: u64,
    pub presence_timeout_ms: u64,
    pub host_policy: HostPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            presence_timeout_ms: 15_000,
            host_policy: HostPolicy::Orphan,
        }
    }
}
