use std::collections::VecDeque;
use std::time::Duration;

use super::{LinkError, SerialTransport};

/// A queued answer for `ScriptedLink::read_line`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Line(String),
    Timeout,
    /// The link breaks on this read.
    Broken,
}

/// In-memory link that records written bytes and plays back scripted replies.
///
/// Reads with no reply queued time out.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    written: Vec<u8>,
    replies: VecDeque<Reply>,
    discards: u32,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&mut self, reply: Reply) {
        self.replies.push_back(reply);
    }

    /// Queue a text line as the next reply.
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.push_reply(Reply::Line(line.into()));
    }

    pub fn with_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.push_line(line);
        }
        self
    }

    /// Every byte written so far, in order.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Replies not yet consumed.
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    /// How many times input was discarded.
    pub fn discards(&self) -> u32 {
        self.discards
    }
}

impl SerialTransport for ScriptedLink {
    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError> {
        self.written.push(byte);
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, LinkError> {
        match self.replies.pop_front() {
            Some(Reply::Line(line)) => Ok(super::decode_line(line.as_bytes())),
            Some(Reply::Timeout) | None => Err(LinkError::Timeout(timeout)),
            Some(Reply::Broken) => Err(LinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted link broken",
            ))),
        }
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        self.discards += 1;
        Ok(())
    }
}
