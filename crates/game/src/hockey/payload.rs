use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::physics::{HockeyConfig, Puck};
use crate::games::{Mode, PerSeat, Phase, Seat};
use crate::sync::{GameSchema, normalize_array};

pub const GAME_ID: &str = "airhockey_v3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HockeyState {
    pub status: Phase,
    pub mode: Mode,
    /// Written by the host only.
    pub puck: Puck,
    /// Each side writes its own paddle.
    pub paddles: PerSeat<Vec2>,
    pub scores: PerSeat<u32>,
    /// Bumped with every counted goal; lets a guest tell a reset from a bounce.
    pub goal_seq: u32,
    pub last_goal: Option<Seat>,
    pub winner: Option<Seat>,
}

impl Default for HockeyState {
    fn default() -> Self {
        Self::kickoff(&HockeyConfig::default())
    }
}

impl HockeyState {
    pub fn kickoff(config: &HockeyConfig) -> Self {
        Self {
            status: Phase::Menu,
            mode: Mode::Solo,
            puck: Puck {
                position: config.center(),
                velocity: Vec2::ZERO,
            },
            paddles: PerSeat {
                host: config.home(Seat::Host),
                guest: config.home(Seat::Guest),
            },
            scores: PerSeat::default(),
            goal_seq: 0,
            last_goal: None,
            winner: None,
        }
    }
}

/// Vec2 travels as a two-element array; stores may hand it back keyed by index
/// or with holes.
fn normalize_vec2(value: &mut Value) {
    normalize_array(value, 2);
    if let Value::Array(items) = value {
        for item in items.iter_mut().filter(|item| !item.is_number()) {
            *item = json!(0.0);
        }
    }
}

impl GameSchema for HockeyState {
    const GAME_ID: &'static str = GAME_ID;

    fn normalize(payload: &mut Value) {
        if let Some(puck) = payload.get_mut("puck").and_then(Value::as_object_mut) {
            for field in ["position", "velocity"] {
                if let Some(vector) = puck.get_mut(field) {
                    normalize_vec2(vector);
                }
            }
        }
        if let Some(paddles) = payload.get_mut("paddles").and_then(Value::as_object_mut) {
            for seat in [Seat::Host, Seat::Guest] {
                if let Some(vector) = paddles.get_mut(seat.key()) {
                    normalize_vec2(vector);
                }
            }
        }
    }
}
