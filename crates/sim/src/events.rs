use arcade::{ConnectionStatus, Phase};

#[derive(Debug, Clone)]
pub enum SimEvent {
    Joined {
        name: String,
        is_host: bool,
        connection: ConnectionStatus,
    },
    PhaseChanged {
        name: String,
        phase: Phase,
    },
    RoleChanged {
        name: String,
        is_host: bool,
    },
    ConnectionChanged {
        name: String,
        connection: ConnectionStatus,
    },
    FaultsChanged {
        description: String,
    },
    Error {
        message: String,
    },
}
