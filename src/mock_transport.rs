//! Scripted in-memory transport used by unit tests.

use std::collections::VecDeque;
use std::io;

use crate::error::{Dc310sError, Result};
use crate::transport::LineTransport;

/// Emulates a DC310S on the far end of a serial line.
///
/// Replies are scripted in FIFO order with [`push_reply`](Self::push_reply);
/// [`push_stale`](Self::push_stale) queues a line that only `clear_input`
/// can discard, emulating a reply left over from a timed-out exchange.
pub(crate) struct MockTransport {
    written: Vec<String>,
    stale: VecDeque<String>,
    replies: VecDeque<String>,
    fail_writes: bool,
    fail_reads: bool,
    clears: usize,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        MockTransport {
            written: Vec::new(),
            stale: VecDeque::new(),
            replies: VecDeque::new(),
            fail_writes: false,
            fail_reads: false,
            clears: 0,
        }
    }

    /// Queue the reply for the next exchange.
    pub(crate) fn push_reply(&mut self, line: &str) {
        self.replies.push_back(line.to_string());
    }

    /// Queue input that predates the next request.
    pub(crate) fn push_stale(&mut self, line: &str) {
        self.stale.push_back(line.to_string());
    }

    /// Make every subsequent write fail.
    pub(crate) fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make every subsequent read fail with an I/O error.
    pub(crate) fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    /// Every line written so far, oldest first.
    pub(crate) fn written_lines(&self) -> &[String] {
        &self.written
    }

    /// How many times `clear_input` has been called.
    pub(crate) fn clear_count(&self) -> usize {
        self.clears
    }
}

impl LineTransport for MockTransport {
    fn write_line(&mut self, line: &str) -> Result<()> {
        if self.fail_writes {
            return Err(Dc310sError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated write failure",
            )));
        }
        self.written.push(line.to_string());
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        if self.fail_reads {
            return Err(Dc310sError::Io(io::Error::new(
                io::ErrorKind::Other,
                "simulated read failure",
            )));
        }
        // Stale input, when present, arrives before any scripted reply.
        if let Some(line) = self.stale.pop_front() {
            return Ok(line);
        }
        self.replies.pop_front().ok_or(Dc310sError::ReadTimeout)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.clears += 1;
        self.stale.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_are_served_in_fifo_order() {
        let mut mock = MockTransport::new();
        mock.push_reply("first");
        mock.push_reply("second");

        assert_eq!(mock.read_line().unwrap(), "first");
        assert_eq!(mock.read_line().unwrap(), "second");
        assert!(matches!(
            mock.read_line().unwrap_err(),
            Dc310sError::ReadTimeout
        ));
    }

    #[test]
    fn clear_input_discards_only_stale_lines() {
        let mut mock = MockTransport::new();
        mock.push_stale("old");
        mock.push_reply("fresh");

        mock.clear_input().unwrap();
        assert_eq!(mock.read_line().unwrap(), "fresh");
        assert_eq!(mock.clear_count(), 1);
    }

    #[test]
    fn stale_lines_shadow_replies_until_cleared() {
        let mut mock = MockTransport::new();
        mock.push_stale("old");
        mock.push_reply("fresh");

        assert_eq!(mock.read_line().unwrap(), "old");
        assert_eq!(mock.read_line().unwrap(), "fresh");
    }

    #[test]
    fn write_failure_is_injectable() {
        let mut mock = MockTransport::new();
        mock.fail_writes(true);
        assert!(mock.write_line("voltage 5").is_err());
        assert!(mock.written_lines().is_empty());
    }
}
