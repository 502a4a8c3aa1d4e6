mod config;
mod events;
mod runner;
mod tui;

use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use arcade::engine::Difficulty;
use arcade::sync::{HostPolicy, StoreFaults};
use arcade::{GameKind, Mode};
use config::SimConfig;
use events::SimEvent;
use runner::Simulation;
use tui::TuiState;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GameArg {
    Connect4,
    Battleship,
    Sprint,
    Hockey,
}

impl From<GameArg> for GameKind {
    fn from(game: GameArg) -> Self {
        match game {
            GameArg::Connect4 => GameKind::Connect4,
            GameArg::Battleship => GameKind::Battleship,
            GameArg::Sprint => GameKind::Sprint,
            GameArg::Hockey => GameKind::AirHockey,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    Orphan,
    Claim,
    Terminate,
}

#[derive(Parser)]
#[command(name = "arcade-sim")]
#[command(about = "Runs bot participants against an in-process document store")]
struct Args {
    #[arg(short, long, value_enum, default_value = "connect4")]
    game: GameArg,

    #[arg(long, help = "Host plays against the computer; no guest joins")]
    solo: bool,

    #[arg(long, help = "Run without a store, solo on a local document")]
    offline: bool,

    #[arg(short, long, default_value = "demo")]
    session: String,

    #[arg(short, long, default_value_t = 3, help = "Connect Four computer depth, 1-5")]
    difficulty: u8,

    #[arg(long, default_value_t = 7)]
    seed: u64,

    #[arg(short, long, default_value_t = 60)]
    frame_rate: u32,

    #[arg(long, default_value_t = 0, help = "Stop after this many frames (0 = until finished)")]
    frames: u64,

    #[arg(long, default_value_t = 400)]
    ai_delay_ms: u64,

    #[arg(long, value_enum, default_value = "claim")]
    host_policy: PolicyArg,

    #[arg(long, default_value_t = 15_000)]
    host_timeout_ms: u64,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Store is unreachable for everyone")]
    unreachable: bool,

    #[arg(long, help = "Store rejects every write from the guest")]
    reject_guest_writes: bool,
}

fn difficulty_for(depth: u8) -> Result<Difficulty> {
    match Difficulty::ALL.into_iter().find(|d| d.depth() == depth) {
        Some(difficulty) => Ok(difficulty),
        None => bail!("difficulty must be between 1 and 5, got {}", depth),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let host_policy = match args.host_policy {
        PolicyArg::Orphan => HostPolicy::Orphan,
        PolicyArg::Claim => HostPolicy::ClaimAfterTimeout {
            timeout_ms: args.host_timeout_ms,
        },
        PolicyArg::Terminate => HostPolicy::Terminate {
            timeout_ms: args.host_timeout_ms,
        },
    };

    let defaults = SimConfig::default();
    let config = SimConfig {
        game: args.game.into(),
        mode: if args.solo { Mode::Solo } else { Mode::Pvp },
        offline: args.offline,
        session: args.session,
        difficulty: difficulty_for(args.difficulty)?,
        seed: args.seed,
        frame_rate: args.frame_rate,
        max_frames: args.frames,
        ai_delay_ms: args.ai_delay_ms,
        sync: arcade::SyncConfig {
            host_policy,
            ..defaults.sync.clone()
        },
        global_faults: args.unreachable.then(|| StoreFaults {
            unreachable: true,
            ..StoreFaults::default()
        }),
        guest_faults: args.reject_guest_writes.then(|| StoreFaults {
            reject_writes: true,
            ..StoreFaults::default()
        }),
    };

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!(
            "running {} ({:?}{}) session {}",
            config.game,
            config.effective_mode(),
            if config.offline { ", offline" } else { "" },
            config.session
        );
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let mut sim = Simulation::new(config);
        runtime.block_on(sim.run());
        log::info!("simulation done");
    } else {
        let mut sim = Simulation::new(config);
        run_with_tui(&mut sim)?;
    }

    Ok(())
}

fn run_with_tui(sim: &mut Simulation) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = sim.running();
    let mut tui_state = TuiState::new();
    let title = format!("arcade-sim {}", sim.config().game);
    let frame_time = Duration::from_millis(sim.config().frame_ms());

    tui_state.log_info(format!("Session '{}' started", sim.config().session));

    while running.load(Ordering::SeqCst) {
        if !tui_state.is_paused() && !sim.is_finished() {
            sim.frame_once();
        }

        for event in sim.drain_events() {
            match event {
                SimEvent::Joined {
                    name,
                    is_host,
                    connection,
                } => {
                    let role = if is_host { "host" } else { "guest" };
                    tui_state.log_info(format!("{} joined as {} ({:?})", name, role, connection));
                }
                SimEvent::PhaseChanged { name, phase } => {
                    tui_state.log_info(format!("{} -> {:?}", name, phase));
                }
                SimEvent::RoleChanged { name, is_host } => {
                    let role = if is_host { "host" } else { "guest" };
                    tui_state.log_warn(format!("{} is now {}", name, role));
                }
                SimEvent::ConnectionChanged { name, connection } => {
                    tui_state.log_warn(format!("{} connection {:?}", name, connection));
                }
                SimEvent::FaultsChanged { description } => tui_state.log_warn(description),
                SimEvent::Error { message } => tui_state.log_error(message),
            }
        }

        if event::poll(frame_time)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            running.store(false, Ordering::SeqCst);
                        }
                        KeyCode::Char(' ') => tui_state.toggle_pause(),
                        KeyCode::Char('f') => sim.toggle_global_outage(),
                        KeyCode::PageUp => tui_state.scroll_up(),
                        KeyCode::PageDown => tui_state.scroll_down(),
                        KeyCode::End => tui_state.scroll_to_bottom(),
                        _ => {}
                    }
                }
            }
        }

        let stats = sim.stats();
        let views = sim.views();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &title, &stats, &views);
        })?;
    }

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
