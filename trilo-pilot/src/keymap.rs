//! Keyboard mapping for interactive driving
//!
//! | key | action |
//! |-----|--------|
//! | `w` / `s` | forward 2.0 / backward 0.8 |
//! | `a` / `d` | turn left 0.7 / turn right 0.7 |
//! | `x` | stop |
//! | `p` | ping |
//! | `l` | underlighting blue (0, 0, 200) |
//! | `c` | save the latest frame |
//! | `q` | quit |
//!
//! Any other key, or no key at all, means stop. Combined with the
//! [`Debouncer`] this gives hold-to-drive behaviour: a motion command is sent
//! once when the key goes down and a single stop follows when it is
//! released. This is a controller default, not something the robot enforces.

use trilo_io::streaming::Command;

pub const FORWARD_SPEED: f64 = 2.0;
pub const BACKWARD_SPEED: f64 = 0.8;
pub const TURN_SPEED: f64 = 0.7;

/// What a key press asks for
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Send(Command),
    SaveFrame,
    Quit,
}

/// Map one key (or `None` for no key) to an action
pub fn action_for_key(key: Option<char>) -> KeyAction {
    let command = match key.map(|k| k.to_ascii_lowercase()) {
        Some('w') => Command::Forward {
            speed: FORWARD_SPEED,
        },
        Some('s') => Command::Backward {
            speed: BACKWARD_SPEED,
        },
        Some('a') => Command::TurnLeft { speed: TURN_SPEED },
        Some('d') => Command::TurnRight { speed: TURN_SPEED },
        Some('x') => Command::Stop,
        Some('p') => Command::Ping,
        Some('l') => Command::FillUnderlighting { r: 0, g: 0, b: 200 },
        Some('c') => return KeyAction::SaveFrame,
        Some('q') => return KeyAction::Quit,
        _ => Command::Stop,
    };
    KeyAction::Send(command)
}

/// Map a line of terminal input; only its first non-blank character counts
pub fn action_for_input(line: &str) -> KeyAction {
    action_for_key(line.trim().chars().next())
}

/// Suppresses repeats of the last command sent
#[derive(Debug, Default)]
pub struct Debouncer {
    last_sent: Option<Command>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true (and remembers `command`) if it differs from the last
    /// command sent.
    pub fn should_send(&mut self, command: &Command) -> bool {
        if self.last_sent.as_ref() == Some(command) {
            return false;
        }
        self.last_sent = Some(command.clone());
        true
    }

    /// Forget the last command, e.g. after a reconnect
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}
