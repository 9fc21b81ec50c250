//! Command protocol spoken to the actuator microcontroller.
//!
//! Every command is a single ASCII byte. Only the distance query is answered,
//! with one line of text holding a float in centimeters:
//!
//! | byte | command          | reply          |
//! |------|------------------|----------------|
//! | `P`  | request pick     | none           |
//! | `D`  | request distance | `"<cm>\n"`     |
//! | `S`  | stop             | none           |
//! | `R`  | release          | none           |
//!
//! The channel cannot tell replies apart, so `ActuatorProtocol` refuses to
//! send while a reply is still owed.

use std::fmt;
use std::time::Duration;

use crate::transport::{LinkError, SerialTransport};

/// Opcodes understood by the microcontroller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    RequestPick,
    RequestDistance,
    Stop,
    Release,
}

impl Command {
    pub const fn opcode(self) -> u8 {
        match self {
            Command::RequestPick => b'P',
            Command::RequestDistance => b'D',
            Command::Stop => b'S',
            Command::Release => b'R',
        }
    }

    /// True when the microcontroller answers this command.
    pub const fn expects_reply(self) -> bool {
        matches!(self, Command::RequestDistance)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::RequestPick => "pick",
            Command::RequestDistance => "distance",
            Command::Stop => "stop",
            Command::Release => "release",
        };
        write!(f, "{} ({})", name, self.opcode() as char)
    }
}

/// Ultrasonic range reading in centimeters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceReading {
    centimeters: f32,
}

impl DistanceReading {
    pub fn from_cm(centimeters: f32) -> Self {
        Self { centimeters }
    }

    /// Parse one reply line.
    pub fn parse(line: &str) -> Result<Self, LinkError> {
        let trimmed = line.trim();
        match trimmed.parse::<f32>() {
            Ok(cm) if cm.is_finite() => Ok(Self::from_cm(cm)),
            _ => Err(LinkError::MalformedReading(trimmed.to_string())),
        }
    }

    pub fn centimeters(&self) -> f32 {
        self.centimeters
    }

    /// True when the obstacle is at or inside `threshold_cm`.
    pub fn is_within(&self, threshold_cm: f32) -> bool {
        self.centimeters <= threshold_cm
    }
}

impl fmt::Display for DistanceReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} cm", self.centimeters)
    }
}

/// High-level operations over a `SerialTransport`.
pub struct ActuatorProtocol<T: SerialTransport> {
    transport: T,
    read_timeout: Duration,
    outstanding: Option<Command>,
    commands_sent: u64,
}

impl<T: SerialTransport> ActuatorProtocol<T> {
    pub fn new(transport: T, read_timeout: Duration) -> Self {
        Self {
            transport,
            read_timeout,
            outstanding: None,
            commands_sent: 0,
        }
    }

    /// Signal that a target is acquired and the pick sequence may begin.
    pub fn request_pick(&mut self) -> Result<(), LinkError> {
        self.send(Command::RequestPick)
    }

    pub fn stop(&mut self) -> Result<(), LinkError> {
        self.send(Command::Stop)
    }

    pub fn release(&mut self) -> Result<(), LinkError> {
        self.send(Command::Release)
    }

    /// Query the ultrasonic sensor.
    ///
    /// Sends `D` and reads exactly one line. A timed-out reply may still
    /// arrive later, so input is discarded before the link returns to idle.
    pub fn request_distance(&mut self) -> Result<DistanceReading, LinkError> {
        self.send(Command::RequestDistance)?;
        let line = match self.transport.read_line(self.read_timeout) {
            Ok(line) => line,
            Err(err @ LinkError::Timeout(_)) => {
                self.transport.discard_input()?;
                self.outstanding = None;
                return Err(err);
            }
            // The reply stays owed; a broken link cannot be resynchronized.
            Err(err) => return Err(err),
        };
        self.outstanding = None;
        DistanceReading::parse(&line)
    }

    /// The command whose reply has not been consumed, if any.
    pub fn outstanding(&self) -> Option<Command> {
        self.outstanding
    }

    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn send(&mut self, command: Command) -> Result<(), LinkError> {
        if let Some(pending) = self.outstanding {
            return Err(LinkError::ReplyOutstanding {
                pending,
                attempted: command,
            });
        }
        log::debug!("-> {}", command);
        self.transport.write_byte(command.opcode())?;
        self.commands_sent += 1;
        if command.expects_reply() {
            self.outstanding = Some(command);
        }
        Ok(())
    }
}
