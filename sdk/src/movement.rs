//! Movement commands
//!
//! A [`MovementCommand`] is the only thing an actuator ever receives. Its
//! duration is clamped into the hardware envelope at construction, including
//! when it is deserialized from a request body, so no code path can ask the
//! motors to run longer than [`MAX_DURATION_SECS`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Shortest motion pulse the motor driver will accept, in seconds
pub const MIN_DURATION_SECS: f64 = 0.05;

/// Longest motion pulse the motor driver will accept, in seconds
pub const MAX_DURATION_SECS: f64 = 2.0;

/// Direction of a movement command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

impl Direction {
    /// All motion directions (excludes `Stop`)
    pub const MOTION: [Direction; 4] = [
        Direction::Forward,
        Direction::Backward,
        Direction::Left,
        Direction::Right,
    ];

    /// Route segment used by the motor server for this direction
    pub fn endpoint(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Stop => "stop",
        }
    }

    /// Whether this direction moves the car
    pub fn is_motion(self) -> bool {
        !matches!(self, Direction::Stop)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "stop" => Ok(Direction::Stop),
            other => Err(format!(
                "unknown direction '{}', expected forward, backward, left, right or stop",
                other
            )),
        }
    }
}

/// Clamp a requested pulse length into the hardware envelope.
///
/// NaN maps to the minimum; infinities clamp to the nearest bound.
pub fn clamp_to_envelope(secs: f64) -> f64 {
    if secs.is_nan() {
        MIN_DURATION_SECS
    } else {
        secs.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS)
    }
}

/// A directed, duration-bounded instruction to the actuator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireCommand")]
pub struct MovementCommand {
    direction: Direction,
    #[serde(rename = "duration")]
    duration_secs: f64,
}

#[derive(Deserialize)]
struct WireCommand {
    direction: Direction,
    #[serde(default)]
    duration: f64,
}

impl From<WireCommand> for MovementCommand {
    fn from(wire: WireCommand) -> Self {
        MovementCommand::new(wire.direction, wire.duration)
    }
}

impl MovementCommand {
    /// Create a command, clamping motion durations into the hardware envelope
    pub fn new(direction: Direction, duration_secs: f64) -> Self {
        if !direction.is_motion() {
            return Self::stop();
        }
        Self {
            direction,
            duration_secs: clamp_to_envelope(duration_secs),
        }
    }

    /// A stop command. Carries a zero duration.
    pub fn stop() -> Self {
        Self {
            direction: Direction::Stop,
            duration_secs: 0.0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }

    pub fn is_stop(&self) -> bool {
        self.direction == Direction::Stop
    }
}

impl fmt::Display for MovementCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_stop() {
            write!(f, "stop")
        } else {
            write!(f, "{} for {:.2}s", self.direction, self.duration_secs)
        }
    }
}
