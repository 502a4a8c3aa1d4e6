use arcade::engine::Difficulty;
use arcade::sync::{HostPolicy, StoreFaults, SyncConfig};
use arcade::{GameKind, Mode};

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub game: GameKind,
    pub mode: Mode,
    /// Skip the store entirely; one participant plays solo on a local document.
    pub offline: bool,
    pub session: String,
    pub difficulty: Difficulty,
    pub seed: u64,
    pub frame_rate: u32,
    /// Stop after this many frames; 0 runs until every table is finished.
    pub max_frames: u64,
    pub ai_delay_ms: u64,
    pub sync: SyncConfig,
    pub global_faults: Option<StoreFaults>,
    pub guest_faults: Option<StoreFaults>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            game: GameKind::Connect4,
            mode: Mode::Pvp,
            offline: false,
            session: "demo".to_string(),
            difficulty: Difficulty::Medium,
            seed: 7,
            frame_rate: 60,
            max_frames: 0,
            ai_delay_ms: 400,
            sync: SyncConfig {
                host_policy: HostPolicy::ClaimAfterTimeout { timeout_ms: 15_000 },
                ..SyncConfig::default()
            },
            global_faults: None,
            guest_faults: None,
        }
    }
}

impl SimConfig {
    pub fn frame_ms(&self) -> u64 {
        (1000 / self.frame_rate.max(1)).max(1) as u64
    }

    /// Offline play has nobody to wait for.
    pub fn effective_mode(&self) -> Mode {
        if self.offline { Mode::Solo } else { self.mode }
    }
}
