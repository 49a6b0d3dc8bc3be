//! Byte-oriented serial transport with line framing.
//!
//! The DC310S speaks an ASCII request/response protocol, one exchange per
//! line. This module owns the raw port and exposes just enough surface for
//! the command layer: write a line, read a line (bounded by the port's read
//! timeout), and drop whatever stale input a previous timed-out exchange
//! left queued.

use serialport::{ClearBuffer, SerialPort, TTYPort};
use std::{
    io::{BufRead, BufReader, Write},
    time::Duration,
};
use tracing::debug;

use crate::error::{Dc310sError, Result};

/// Default baud rate for the DC310S.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default read timeout; also the upper bound on how long one exchange
/// can block the tick loop.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// A newline-framed request/response transport.
///
/// Implemented by [`SerialTransport`] for real hardware; tests substitute a
/// scripted in-memory implementation.
pub trait LineTransport {
    /// Send one line. The newline terminator is appended here.
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Read one reply line, trimmed of the terminator, or fail with
    /// [`Dc310sError::ReadTimeout`] if none arrives in time.
    fn read_line(&mut self) -> Result<String>;

    /// Discard any queued input so the next reply pairs with the next
    /// request.
    fn clear_input(&mut self) -> Result<()>;
}

/// Exclusive owner of an open OS serial handle.
///
/// Closing is handled by drop; [`crate::session::Session::disconnect`] is
/// therefore idempotent for free.
pub struct SerialTransport {
    port_write: Box<dyn SerialPort>,
    port_read: BufReader<TTYPort>,
}

impl SerialTransport {
    /// Open a serial port for DC310S communication.
    ///
    /// On Linux `path` is a device path (e.g. `/dev/ttyUSB0`), on Windows a
    /// port name (e.g. `COM3`).
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(read_timeout)
            .open_native()?;
        let (port_write, port_read) = (port.try_clone()?, BufReader::new(port));
        debug!(path, baud_rate, "serial port opened");

        Ok(SerialTransport {
            port_write,
            port_read,
        })
    }
}

impl LineTransport for SerialTransport {
    fn write_line(&mut self, line: &str) -> Result<()> {
        self.port_write
            .write_all(line.as_bytes())
            .map_err(Dc310sError::Write)?;
        self.port_write.write_all(b"\n").map_err(Dc310sError::Write)?;
        self.port_write.flush().map_err(Dc310sError::Write)?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut reply_bytes = Vec::new();
        self.port_read.read_until(b'\n', &mut reply_bytes)?;
        if reply_bytes.is_empty() {
            return Err(Dc310sError::ReadTimeout);
        }
        let reply = String::from_utf8(reply_bytes)?;
        Ok(reply.trim_end_matches(['\r', '\n']).to_string())
    }

    fn clear_input(&mut self) -> Result<()> {
        // Also forget any partial line buffered in the reader.
        let buffered = self.port_read.buffer().len();
        self.port_read.consume(buffered);
        self.port_write
            .clear(ClearBuffer::Input)
            .map_err(|e| Dc310sError::Io(e.into()))?;
        Ok(())
    }
}
