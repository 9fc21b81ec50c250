//! Serial transport to the actuator microcontroller.
//!
//! The link is a single unbuffered duplex channel with no request tagging:
//! bytes go out one command at a time and text lines come back. This module
//! provides the `SerialTransport` trait and its implementations:
//! - `SerialPortTransport`: a real serial port (feature: serial)
//! - `ScriptedLink`: an in-memory link for tests and dry runs

mod scripted;
#[cfg(feature = "serial")]
mod serial;

use std::time::Duration;

use thiserror::Error;

use crate::actuator::Command;

pub use scripted::{Reply, ScriptedLink};
#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialPortTransport};

/// Failures on the actuator link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("malformed distance reading {0:?}")]
    MalformedReading(String),

    #[error("cannot send {attempted:?} while the reply to {pending:?} is outstanding")]
    ReplyOutstanding { pending: Command, attempted: Command },

    #[error("serial link i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Errors the control loop absorbs by returning to scanning. Everything
    /// else means the link itself is broken.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LinkError::Timeout(_)
                | LinkError::MalformedReading(_)
                | LinkError::ReplyOutstanding { .. }
        )
    }
}

/// Blocking, exclusively-owned byte/line channel.
pub trait SerialTransport {
    /// Write one byte and flush it to the wire.
    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError>;

    /// Read one `\n`-terminated line, without its terminator.
    ///
    /// Fails with `LinkError::Timeout` when no complete line arrives in time.
    fn read_line(&mut self, timeout: Duration) -> Result<String, LinkError>;

    /// Drop any input received but not yet read.
    fn discard_input(&mut self) -> Result<(), LinkError>;
}

/// Decode one raw line, trimming the terminator and surrounding whitespace.
pub(crate) fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}
