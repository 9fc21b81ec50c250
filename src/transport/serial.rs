use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::{decode_line, LinkError, SerialTransport};

/// Configuration for the actuator serial port.
#[derive(Clone, Debug)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/ttyUSB0").
    pub port: String,
    pub baud_rate: u32,
    /// Read deadline for one reply line.
    pub timeout: Duration,
    /// Wait after opening before the first command; the microcontroller
    /// resets when the port opens.
    pub settle: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            timeout: Duration::from_millis(1000),
            settle: Duration::from_secs(2),
        }
    }
}

/// Serial port link, 8N1 without flow control.
pub struct SerialPortTransport {
    port: Box<dyn SerialPort>,
    path: String,
    /// Bytes read past the last returned line.
    pending: Vec<u8>,
}

impl SerialPortTransport {
    /// Open the port and wait out the settle delay.
    pub fn open(config: &SerialConfig) -> Result<Self, LinkError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(|err| LinkError::Open {
                port: config.port.clone(),
                reason: err.to_string(),
            })?;

        log::info!(
            "SerialPortTransport: opened {} at {} baud, settling for {:?}",
            config.port,
            config.baud_rate,
            config.settle
        );
        std::thread::sleep(config.settle);

        Ok(Self {
            port,
            path: config.port.clone(),
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(decode_line(&line))
    }
}

impl SerialTransport for SerialPortTransport {
    fn write_byte(&mut self, byte: u8) -> Result<(), LinkError> {
        self.port.write_all(&[byte])?;
        self.port.flush()?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, LinkError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 64];
        loop {
            if let Some(line) = self.take_line() {
                return Ok(line);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout(timeout));
            }
            self.port
                .set_timeout(remaining)
                .map_err(|err| LinkError::Io(err.into()))?;
            match self.port.read(&mut chunk) {
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::TimedOut => {
                    return Err(LinkError::Timeout(timeout))
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        if !self.pending.is_empty() {
            log::debug!("discarding {} buffered bytes", self.pending.len());
        }
        self.pending.clear();
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|err| LinkError::Io(err.into()))
    }
}
