use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Menu,
    Waiting,
    Playing,
    Finished,
}

impl Phase {
    /// Solo games skip the lobby.
    pub fn on_start(mode: Mode) -> Self {
        match mode {
            Mode::Solo => Phase::Playing,
            Mode::Pvp => Phase::Waiting,
        }
    }

    pub fn is_live(self) -> bool {
        self == Phase::Playing
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Solo,
    #[default]
    Pvp,
}

/// Which side of the table a participant sits on. The host always takes
/// [`Seat::Host`]; in solo games the computer plays [`Seat::Guest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    Host,
    Guest,
}

impl Seat {
    pub fn of(is_host: bool) -> Self {
        if is_host { Seat::Host } else { Seat::Guest }
    }

    pub fn other(self) -> Self {
        match self {
            Seat::Host => Seat::Guest,
            Seat::Guest => Seat::Host,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Seat::Host => "host",
            Seat::Guest => "guest",
        }
    }
}

/// A value kept per seat, serialized as `{ "host": .., "guest": .. }` so each
/// side can write its own slot by path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PerSeat<T> {
    pub host: T,
    pub guest: T,
}

impl<T> PerSeat<T> {
    pub fn get(&self, seat: Seat) -> &T {
        match seat {
            Seat::Host => &self.host,
            Seat::Guest => &self.guest,
        }
    }

    pub fn get_mut(&mut self, seat: Seat) -> &mut T {
        match seat {
            Seat::Host => &mut self.host,
            Seat::Guest => &mut self.guest,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn solo_starts_playing() {
        assert_eq!(Phase::on_start(Mode::Solo), Phase::Playing);
        assert_eq!(Phase::on_start(Mode::Pvp), Phase::Waiting);
    }

    #[test]
    fn per_seat_fills_missing_slots() {
        let scores: PerSeat<u32> = serde_json::from_value(json!({ "guest": 4 })).unwrap();
        assert_eq!(*scores.get(Seat::Host), 0);
        assert_eq!(*scores.get(Seat::Guest), 4);
        assert_eq!(serde_json::to_value(Phase::Playing).unwrap(), json!("PLAYING"));
    }
}
