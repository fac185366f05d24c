//! Command channel message types.
//!
//! Each line on the command channel is one JSON object with an `action`
//! field (case-insensitive) plus action-specific fields:
//!
//! | action | fields (type, default) |
//! |--------|------------------------|
//! | `forward` / `backward` / `turn_left` / `turn_right` | `speed` (float, 1.0) |
//! | `set_speeds` | `left` (float, 0.0), `right` (float, 0.0) |
//! | `stop` / `coast` | - |
//! | `set_led` | `led` (int, required), `value` (float, required) |
//! | `fill_underlighting` | `r`, `g`, `b` (int, 0) |
//!
//! Int fields also take integral floats (`2.0`); `2.5` or `"2"` is a
//! parameter error.
//! | `read_distance` | - (replies `{"status":"distance","value":..}`) |
//! | `ping` | - (replies `{"status":"pong"}`) |
//! | `exit` | - (ends the session) |
//!
//! Lines are decoded once, here, into a closed [`Command`] enum. Unknown
//! actions become [`Command::Unrecognized`] instead of an error so the
//! session can log and ignore them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply sent when a second client connects while a session is active
pub const BUSY_MESSAGE: &str = "Server busy";

fn default_speed() -> f64 {
    1.0
}

/// 0-255 from a JSON integer or integral float
fn integral_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if value.fract() != 0.0 || !(0.0..=f64::from(u8::MAX)).contains(&value) {
        return Err(serde::de::Error::custom(format!(
            "expected an integer 0-255, got {}",
            value
        )));
    }
    Ok(value as u8)
}

/// A decoded client command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    Forward {
        #[serde(default = "default_speed")]
        speed: f64,
    },
    Backward {
        #[serde(default = "default_speed")]
        speed: f64,
    },
    TurnLeft {
        #[serde(default = "default_speed")]
        speed: f64,
    },
    TurnRight {
        #[serde(default = "default_speed")]
        speed: f64,
    },
    /// Per-side motor speeds
    SetSpeeds {
        #[serde(default)]
        left: f64,
        #[serde(default)]
        right: f64,
    },
    Stop,
    Coast,
    /// Button LED brightness
    SetLed {
        #[serde(deserialize_with = "integral_u8")]
        led: u8,
        value: f64,
    },
    /// RGB value for every underlighting LED
    FillUnderlighting {
        #[serde(default, deserialize_with = "integral_u8")]
        r: u8,
        #[serde(default, deserialize_with = "integral_u8")]
        g: u8,
        #[serde(default, deserialize_with = "integral_u8")]
        b: u8,
    },
    ReadDistance,
    Ping,
    Exit,
    /// Well-formed message whose action is not known
    #[serde(skip)]
    Unrecognized { action: String },
}

/// Action names understood by [`Command::decode`]
pub const KNOWN_ACTIONS: &[&str] = &[
    "forward",
    "backward",
    "turn_left",
    "turn_right",
    "set_speeds",
    "stop",
    "coast",
    "set_led",
    "fill_underlighting",
    "read_distance",
    "ping",
    "exit",
];

/// Reasons a command line could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has no 'action' string")]
    MissingAction,

    #[error("bad parameters for '{action}': {reason}")]
    InvalidParameters { action: String, reason: String },

    #[error("line is not valid UTF-8")]
    NotUtf8,
}

impl Command {
    /// Decode one trimmed, non-empty command line.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line).map_err(ProtocolError::Syntax)?;
        let Value::Object(mut object) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let action = match object.get("action") {
            Some(Value::String(action)) if !action.trim().is_empty() => {
                action.trim().to_lowercase()
            }
            _ => return Err(ProtocolError::MissingAction),
        };

        if !KNOWN_ACTIONS.contains(&action.as_str()) {
            return Ok(Command::Unrecognized { action });
        }

        object.insert("action".to_string(), Value::String(action.clone()));
        serde_json::from_value(Value::Object(object)).map_err(|e| {
            ProtocolError::InvalidParameters {
                action,
                reason: e.to_string(),
            }
        })
    }

    /// Lower-case action name
    pub fn action(&self) -> &str {
        match self {
            Command::Forward { .. } => "forward",
            Command::Backward { .. } => "backward",
            Command::TurnLeft { .. } => "turn_left",
            Command::TurnRight { .. } => "turn_right",
            Command::SetSpeeds { .. } => "set_speeds",
            Command::Stop => "stop",
            Command::Coast => "coast",
            Command::SetLed { .. } => "set_led",
            Command::FillUnderlighting { .. } => "fill_underlighting",
            Command::ReadDistance => "read_distance",
            Command::Ping => "ping",
            Command::Exit => "exit",
            Command::Unrecognized { action } => action,
        }
    }
}

/// Status replies (`{"status": ...}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    Pong,
    Distance { value: f64 },
}

/// Error replies (`{"error": ...}`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

/// Anything the robot writes back on the command channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Status(Status),
    Error(ErrorReply),
}

impl Reply {
    pub fn pong() -> Self {
        Reply::Status(Status::Pong)
    }

    pub fn distance(value: f64) -> Self {
        Reply::Status(Status::Distance { value })
    }

    pub fn busy() -> Self {
        Reply::Error(ErrorReply {
            error: BUSY_MESSAGE.to_string(),
        })
    }

    /// Parse a reply line; `None` for anything that is not a known shape
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }
}
