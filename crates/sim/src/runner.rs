use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use glam::Vec2;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use arcade::engine::{Board, SearchConfig, best_move};
use arcade::games::connect4::disc_for;
use arcade::games::{
    BattleshipSession, BattleshipState, Connect4Session, Connect4State, FleetConfig, SprintConfig,
    SprintSession, SprintState, Subject, SprintDifficulty,
};
use arcade::hockey::{HockeyConfig, HockeySession, HockeyState};
use arcade::sync::{
    DocKey, GameSchema, GameSync, IdentityRegistry, MemoryStore, PAYLOAD, ParticipantId, StoreStats,
    SyncError,
};
use arcade::{ConnectionStatus, GameKind, GamePayload, Mode, Phase, Seat, Session};

use crate::config::SimConfig;
use crate::events::SimEvent;

/// The per-game handle a bot drives. Everything common goes through [`Session`].
pub enum Table {
    Connect4(Connect4Session),
    Battleship(BattleshipSession),
    Sprint(SprintSession),
    Hockey(HockeySession),
}

impl Table {
    fn session(&self) -> &dyn Session {
        match self {
            Table::Connect4(session) => session,
            Table::Battleship(session) => session,
            Table::Sprint(session) => session,
            Table::Hockey(session) => session,
        }
    }

    fn session_mut(&mut self) -> &mut dyn Session {
        match self {
            Table::Connect4(session) => session,
            Table::Battleship(session) => session,
            Table::Sprint(session) => session,
            Table::Hockey(session) => session,
        }
    }
}

/// A simulated participant: one sync handle plus a bot standing in for input.
pub struct Participant {
    pub name: String,
    /// Stands in for the tab's session storage.
    identities: IdentityRegistry,
    table: Table,
    /// Earliest time the bot acts again.
    think_until: u64,
    last_phase: Phase,
    was_host: bool,
    last_connection: ConnectionStatus,
}

#[derive(Debug, Clone)]
pub struct ParticipantView {
    pub name: String,
    pub id: Option<ParticipantId>,
    pub is_host: bool,
    pub connection: ConnectionStatus,
    pub phase: Phase,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SimStats {
    pub frame: u64,
    pub elapsed_ms: u64,
    pub store: StoreStats,
    pub documents: usize,
    /// Game the stored document decodes as, if it exists and is valid.
    pub stored: Option<GameKind>,
    pub finished: bool,
}

pub struct Simulation {
    config: SimConfig,
    store: MemoryStore,
    participants: Vec<Participant>,
    rng: Pcg32,
    frame: u64,
    started_at: u64,
    running: Arc<AtomicBool>,
    pending_events: VecDeque<SimEvent>,
}

fn attach<P: GameSchema>(
    config: &SimConfig,
    store: &MemoryStore,
    identities: &mut IdentityRegistry,
    rng: &mut Pcg32,
    seat: Seat,
    initial: P,
    now_ms: u64,
) -> GameSync<P> {
    let me = identities.identity_for(P::GAME_ID, rng);
    if config.offline {
        return GameSync::offline(&config.session, me, initial, config.sync.clone(), now_ms);
    }

    let connection = store.connect();
    if let (Seat::Guest, Some(faults)) = (seat, config.guest_faults) {
        store.set_faults(&connection, faults);
    }
    GameSync::attach(
        Box::new(connection),
        &config.session,
        me,
        initial,
        config.sync.clone(),
        now_ms,
    )
}

fn open_table(
    config: &SimConfig,
    store: &MemoryStore,
    identities: &mut IdentityRegistry,
    rng: &mut Pcg32,
    seat: Seat,
    now_ms: u64,
) -> Table {
    let seed = config.seed.wrapping_add(seat as u64);
    match config.game {
        GameKind::Connect4 => {
            let sync = attach(config, store, identities, rng, seat, Connect4State::default(), now_ms);
            Table::Connect4(Connect4Session::new(sync, config.ai_delay_ms))
        }
        GameKind::Battleship => {
            let sync = attach(config, store, identities, rng, seat, BattleshipState::default(), now_ms);
            Table::Battleship(BattleshipSession::new(
                sync,
                FleetConfig::default(),
                seed,
                config.ai_delay_ms,
            ))
        }
        GameKind::Sprint => {
            let sync = attach(config, store, identities, rng, seat, SprintState::default(), now_ms);
            Table::Sprint(SprintSession::new(sync, SprintConfig::default(), seed))
        }
        GameKind::AirHockey => {
            let sync = attach(config, store, identities, rng, seat, HockeyState::default(), now_ms);
            Table::Hockey(HockeySession::new(sync, HockeyConfig::default()))
        }
    }
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        let store = MemoryStore::new();
        store.set_global_faults(config.global_faults);
        let started_at = arcade::time::now_ms();

        let mut seats = vec![Seat::Host];
        if config.effective_mode() == Mode::Pvp {
            seats.push(Seat::Guest);
        }

        let mut rng = Pcg32::seed_from_u64(config.seed);
        let mut pending_events = VecDeque::new();
        let participants = seats
            .into_iter()
            .map(|seat| {
                let name = format!("{}-{}", config.session, seat.key());
                let mut identities = IdentityRegistry::new();
                let table = open_table(&config, &store, &mut identities, &mut rng, seat, started_at);
                let session = table.session();
                pending_events.push_back(SimEvent::Joined {
                    name: name.clone(),
                    is_host: session.is_host(),
                    connection: session.connection(),
                });
                Participant {
                    was_host: session.is_host(),
                    last_phase: session.phase(),
                    last_connection: session.connection(),
                    name,
                    identities,
                    table,
                    think_until: 0,
                }
            })
            .collect();

        Self {
            rng,
            config,
            store,
            participants,
            frame: 0,
            started_at,
            running: Arc::new(AtomicBool::new(true)),
            pending_events,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = SimEvent> + '_ {
        self.pending_events.drain(..)
    }

    /// Simulated clock; frames advance it by a fixed step so a seed replays.
    fn now_ms(&self) -> u64 {
        self.started_at + self.frame * self.config.frame_ms()
    }

    /// True once every table is finished or has been terminated.
    pub fn is_finished(&self) -> bool {
        !self.participants.is_empty()
            && self.participants.iter().all(|p| {
                let session = p.table.session();
                session.phase() == Phase::Finished || session.connection() == ConnectionStatus::Terminated
            })
    }

    pub fn frame_once(&mut self) {
        self.frame += 1;
        let now_ms = self.now_ms();

        for participant in &mut self.participants {
            // A terminated table is reported once and then left alone.
            if participant.last_connection == ConnectionStatus::Terminated {
                continue;
            }
            match participant.table.session_mut().update(now_ms) {
                Ok(()) | Err(SyncError::Terminated) => {}
                Err(err) => self.pending_events.push_back(SimEvent::Error {
                    message: format!("{}: {}", participant.name, err),
                }),
            }

            let connection = participant.table.session().connection();
            if connection != participant.last_connection {
                participant.last_connection = connection;
                self.pending_events.push_back(SimEvent::ConnectionChanged {
                    name: participant.name.clone(),
                    connection,
                });
                if connection == ConnectionStatus::Terminated {
                    continue;
                }
            }

            let session = participant.table.session();
            let phase = session.phase();
            if phase != participant.last_phase {
                participant.last_phase = phase;
                self.pending_events.push_back(SimEvent::PhaseChanged {
                    name: participant.name.clone(),
                    phase,
                });
            }
            if session.is_host() != participant.was_host {
                participant.was_host = session.is_host();
                self.pending_events.push_back(SimEvent::RoleChanged {
                    name: participant.name.clone(),
                    is_host: participant.was_host,
                });
            }

            if now_ms < participant.think_until {
                continue;
            }
            match drive(&self.config, &mut self.rng, participant, now_ms) {
                Ok(true) => {
                    let pause = self.rng.random_range(150..=self.config.ai_delay_ms.max(151) * 2);
                    participant.think_until = now_ms + pause;
                }
                Ok(false) => {}
                Err(err) => self.pending_events.push_back(SimEvent::Error {
                    message: format!("{}: {}", participant.name, err),
                }),
            }
        }
    }

    /// Headless loop on a tokio interval. Stops on Ctrl-C, the frame limit, or
    /// once every table is finished.
    pub async fn run(&mut self) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.frame_ms()));
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = interval.tick() => {}
                _ = &mut ctrl_c => {
                    log::info!("interrupted");
                    break;
                }
            }

            self.frame_once();
            for event in self.pending_events.drain(..) {
                log_event(&event);
            }

            if self.is_finished() {
                log::info!("all tables finished after {} frames", self.frame);
                break;
            }
            if self.config.max_frames > 0 && self.frame >= self.config.max_frames {
                log::info!("frame limit {} reached", self.config.max_frames);
                break;
            }
        }

        for view in self.views() {
            for line in view.lines {
                log::info!("[{}] {}", view.name, line);
            }
        }
    }

    /// Makes the whole store reject writes, or lifts that again.
    pub fn toggle_global_outage(&mut self) {
        let next = match self.config.global_faults {
            Some(_) => None,
            None => Some(arcade::sync::StoreFaults {
                reject_writes: true,
                ..Default::default()
            }),
        };
        self.config.global_faults = next;
        self.store.set_global_faults(next);
        self.pending_events.push_back(SimEvent::FaultsChanged {
            description: match next {
                Some(_) => "store now rejects all writes".to_string(),
                None => "store accepting writes again".to_string(),
            },
        });
    }

    pub fn stats(&self) -> SimStats {
        SimStats {
            frame: self.frame,
            elapsed_ms: self.frame * self.config.frame_ms(),
            store: self.store.stats(),
            documents: self.store.document_count(),
            stored: self.stored_game(),
            finished: self.is_finished(),
        }
    }

    /// Decodes the shared document's payload the way any participant would.
    fn stored_game(&self) -> Option<GameKind> {
        let key = DocKey::new(&self.config.session, self.config.game.game_id());
        let document = self.store.snapshot(&key)?;
        match GamePayload::decode(&key.game, document.get(PAYLOAD)?) {
            Ok(payload) => Some(payload.kind()),
            Err(err) => {
                log::warn!("{} holds an invalid payload: {}", key, err);
                None
            }
        }
    }

    pub fn views(&self) -> Vec<ParticipantView> {
        self.participants
            .iter()
            .map(|p| {
                let session = p.table.session();
                ParticipantView {
                    name: p.name.clone(),
                    id: p.identities.get(self.config.game.game_id()).cloned(),
                    is_host: session.is_host(),
                    connection: session.connection(),
                    phase: session.phase(),
                    lines: session.render(),
                }
            })
            .collect()
    }
}

pub fn log_event(event: &SimEvent) {
    match event {
        SimEvent::Joined {
            name,
            is_host,
            connection,
        } => log::info!(
            "{} joined as {} ({:?})",
            name,
            if *is_host { "host" } else { "guest" },
            connection
        ),
        SimEvent::PhaseChanged { name, phase } => log::info!("{} -> {:?}", name, phase),
        SimEvent::RoleChanged { name, is_host } => {
            log::info!("{} is now {}", name, if *is_host { "host" } else { "guest" })
        }
        SimEvent::ConnectionChanged { name, connection } => {
            log::warn!("{} connection {:?}", name, connection)
        }
        SimEvent::FaultsChanged { description } => log::warn!("{}", description),
        SimEvent::Error { message } => log::error!("{}", message),
    }
}

/// One bot decision. Returns true when the bot did something and should pause.
fn drive(
    config: &SimConfig,
    rng: &mut Pcg32,
    participant: &mut Participant,
    now_ms: u64,
) -> Result<bool, arcade::SyncError> {
    let mode = config.effective_mode();
    // Only the host moves a table between phases.
    let is_host = participant.table.session().is_host();
    match &mut participant.table {
        Table::Connect4(session) => {
            let Some(state) = session.state().cloned() else {
                return Ok(false);
            };
            match state.status {
                Phase::Menu if is_host => {
                    session.start(mode, config.difficulty, now_ms)?;
                    Ok(true)
                }
                Phase::Waiting if is_host => {
                    session.start_anyway(now_ms)?;
                    Ok(true)
                }
                Phase::Playing if state.can_move(session.seat()) => {
                    let col = pick_column(&state.board, session.seat(), rng);
                    match col {
                        Some(col) => session.drop_disc(col, now_ms),
                        None => Ok(false),
                    }
                }
                _ => Ok(false),
            }
        }
        Table::Battleship(session) => {
            let Some(state) = session.state().cloned() else {
                return Ok(false);
            };
            let seat = session.seat();
            match state.status {
                Phase::Menu if is_host => {
                    session.start(mode, now_ms)?;
                    Ok(true)
                }
                Phase::Waiting if is_host => {
                    session.start_anyway(now_ms)?;
                    Ok(true)
                }
                Phase::Playing if state.can_fire(seat) => {
                    let open: Vec<usize> = state
                        .tried(seat.other())
                        .iter()
                        .enumerate()
                        .filter(|(_, tried)| !**tried)
                        .map(|(index, _)| index)
                        .collect();
                    match open.choose(rng) {
                        Some(&index) => session.fire(index, now_ms),
                        None => Ok(false),
                    }
                }
                _ => Ok(false),
            }
        }
        Table::Sprint(session) => {
            let Some(state) = session.state().cloned() else {
                return Ok(false);
            };
            match state.status {
                Phase::Menu if is_host => {
                    session.start(mode, Subject::Mixed, SprintDifficulty::Medium, now_ms)?;
                    Ok(true)
                }
                Phase::Waiting if is_host => {
                    session.start_anyway(now_ms)?;
                    Ok(true)
                }
                Phase::Playing if state.can_answer(session.seat()) => {
                    let Some(question) = state.question else {
                        return Ok(false);
                    };
                    let value = if rng.random_bool(0.8) {
                        question.answer
                    } else {
                        question.answer + rng.random_range(1..=3)
                    };
                    session.answer(value, now_ms)
                }
                _ => Ok(false),
            }
        }
        Table::Hockey(session) => {
            let Some(state) = session.state().cloned() else {
                return Ok(false);
            };
            match state.status {
                Phase::Menu if is_host => {
                    session.start(mode, now_ms)?;
                    Ok(true)
                }
                Phase::Waiting if is_host => {
                    session.start_anyway(now_ms)?;
                    Ok(true)
                }
                Phase::Playing => {
                    let seat = session.seat();
                    let home = session.config().home(seat);
                    let puck = session.puck().visual();
                    session.move_paddle(Vec2::new(puck.x, home.y));

                    if seat == Seat::Host && session.puck().velocity.length() < 0.05 {
                        let angle = rng.random_range(-0.6f32..0.6);
                        let toward = if rng.random_bool(0.5) { -1.0 } else { 1.0 };
                        let velocity = Vec2::new(angle.sin(), toward * angle.cos()) * 6.0;
                        session.serve(velocity, now_ms)?;
                        return Ok(true);
                    }
                    Ok(false)
                }
                _ => Ok(false),
            }
        }
    }
}

/// Shallow search with a little noise so bot-vs-bot games differ.
fn pick_column(board: &Board, seat: Seat, rng: &mut Pcg32) -> Option<usize> {
    if rng.random_bool(0.25) {
        return board.valid_columns().choose(rng).copied();
    }
    let config = SearchConfig {
        depth: 2,
        ..SearchConfig::default()
    };
    best_move(board, disc_for(seat), &config)
}
