//! Typed DC310S command layer.
//!
//! Wire protocol: ASCII lines, one request/response exchange per line.
//! Requests are `output {0|1}`, `voltage {f}`, `current {f}`, `voltage?`,
//! `current?`, `measure:voltage?`, `measure:current?`. Replies are single
//! lines; numeric replies parse as floats; there is no ack code or checksum.
//!
//! Every exchange clears stale queued input first, so a reply left over
//! from a previous timed-out request cannot be paired with this one.

use tracing::debug;

use crate::error::{Dc310sError, Result};
use crate::transport::LineTransport;

/// A DC310S reachable over some [`LineTransport`].
///
/// "set" writes a configuration, "query" reads a configuration back, and
/// "measure" reads the actual output.
pub struct Psu<T: LineTransport> {
    transport: T,
}

impl<T: LineTransport> Psu<T> {
    /// Wrap an already-open transport.
    pub fn new(transport: T) -> Self {
        Psu { transport }
    }

    /// Enable (true) or disable (false) the output.
    ///
    /// The instrument sends no distinct ack; an `Err` here means the
    /// command was not confirmed, not necessarily that it was not applied.
    pub fn set_output(&mut self, on: bool) -> Result<()> {
        self.command(if on { "output 1" } else { "output 0" })
    }

    /// Set the target output voltage in volts.
    pub fn set_voltage(&mut self, volts: f64) -> Result<()> {
        self.command(&format!("voltage {volts}"))
    }

    /// Set the target current limit in amps.
    pub fn set_current(&mut self, amps: f64) -> Result<()> {
        self.command(&format!("current {amps}"))
    }

    /// Query the configured voltage setpoint.
    pub fn query_voltage_setpoint(&mut self) -> Result<f64> {
        self.query_number("voltage?")
    }

    /// Query the configured current limit setpoint.
    pub fn query_current_setpoint(&mut self) -> Result<f64> {
        self.query_number("current?")
    }

    /// Measure the actual output voltage.
    pub fn measure_voltage(&mut self) -> Result<f64> {
        self.query_number("measure:voltage?")
    }

    /// Measure the actual output current.
    pub fn measure_current(&mut self) -> Result<f64> {
        self.query_number("measure:current?")
    }

    /// Send a set command and drain its reply line without parsing it.
    fn command(&mut self, request: &str) -> Result<()> {
        self.transport.clear_input()?;
        debug!(request, "send");
        self.transport.write_line(request)?;
        // The reply line (if any) carries no information; a timeout here is
        // not a failure of the command itself.
        let _ = self.transport.read_line();
        Ok(())
    }

    /// Send a query and parse the single-line reply as a float.
    fn query_number(&mut self, request: &str) -> Result<f64> {
        self.transport.clear_input()?;
        debug!(request, "send");
        self.transport.write_line(request)?;
        let reply = self.transport.read_line()?;
        debug!(request, reply, "recv");
        reply
            .trim()
            .parse::<f64>()
            .map_err(|_| Dc310sError::Parse(reply))
    }

    /// Borrow the underlying transport (tests inspect written lines).
    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_transport::MockTransport;

    #[test]
    fn measure_voltage_sends_query_and_parses_reply() {
        let mut mock = MockTransport::new();
        mock.push_reply("12.345");

        let mut psu = Psu::new(mock);
        let volts = psu.measure_voltage().unwrap();

        assert_eq!(volts, 12.345);
        assert_eq!(psu.transport().written_lines(), ["measure:voltage?"]);
    }

    #[test]
    fn measure_current_sends_query() {
        let mut mock = MockTransport::new();
        mock.push_reply("0.500");

        let mut psu = Psu::new(mock);
        assert_eq!(psu.measure_current().unwrap(), 0.5);
        assert_eq!(psu.transport().written_lines(), ["measure:current?"]);
    }

    #[test]
    fn reply_with_surrounding_whitespace_parses() {
        let mut mock = MockTransport::new();
        mock.push_reply("  5.000 ");

        let mut psu = Psu::new(mock);
        assert_eq!(psu.measure_voltage().unwrap(), 5.0);
    }

    #[test]
    fn garbled_reply_is_a_parse_error() {
        let mut mock = MockTransport::new();
        mock.push_reply("ERR!");

        let mut psu = Psu::new(mock);
        let err = psu.query_voltage_setpoint().unwrap_err();
        assert!(matches!(err, Dc310sError::Parse(ref s) if s == "ERR!"));
    }

    #[test]
    fn missing_reply_is_a_read_timeout() {
        let mock = MockTransport::new();

        let mut psu = Psu::new(mock);
        let err = psu.measure_voltage().unwrap_err();
        assert!(matches!(err, Dc310sError::ReadTimeout));
    }

    #[test]
    fn io_failure_surfaces_with_its_own_kind() {
        let mut mock = MockTransport::new();
        mock.fail_reads(true);

        let mut psu = Psu::new(mock);
        let err = psu.measure_current().unwrap_err();
        assert!(matches!(err, Dc310sError::Io(_)));
    }

    #[test]
    fn set_output_formats_both_states() {
        let mut mock = MockTransport::new();
        mock.push_reply("");
        mock.push_reply("");

        let mut psu = Psu::new(mock);
        psu.set_output(true).unwrap();
        psu.set_output(false).unwrap();
        assert_eq!(psu.transport().written_lines(), ["output 1", "output 0"]);
    }

    #[test]
    fn set_output_tolerates_missing_reply() {
        // No reply queued at all: commands are fire-and-forget.
        let mock = MockTransport::new();
        let mut psu = Psu::new(mock);
        assert!(psu.set_output(true).is_ok());
    }

    #[test]
    fn set_output_reports_write_failure() {
        let mut mock = MockTransport::new();
        mock.fail_writes(true);

        let mut psu = Psu::new(mock);
        let err = psu.set_output(true).unwrap_err();
        assert!(matches!(err, Dc310sError::Write(_)));
    }

    #[test]
    fn setpoint_commands_use_plain_float_formatting() {
        let mut mock = MockTransport::new();
        mock.push_reply("");
        mock.push_reply("");

        let mut psu = Psu::new(mock);
        psu.set_voltage(13.7).unwrap();
        psu.set_current(3.0).unwrap();
        assert_eq!(psu.transport().written_lines(), ["voltage 13.7", "current 3"]);
    }

    #[test]
    fn stale_input_is_cleared_before_every_exchange() {
        let mut mock = MockTransport::new();
        // A reply from a previous timed-out exchange is still queued, then
        // the real reply for this query.
        mock.push_stale("9.999");
        mock.push_reply("5.0");

        let mut psu = Psu::new(mock);
        // clear_input must discard the stale "9.999" line.
        assert_eq!(psu.measure_voltage().unwrap(), 5.0);
        assert_eq!(psu.transport().clear_count(), 1);
    }
}
