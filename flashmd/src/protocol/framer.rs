//! Response framing over a delimiter-less byte stream.
//!
//! The dumper does not length-prefix its replies. Boundaries are inferred
//! from "no new bytes for a while", combined with a newline for short
//! acknowledgements or a literal end marker for multi-line narration. Every
//! mode is built from the same primitive: a transport read with the poll
//! interval as timeout, where an empty read adds one poll interval to the
//! elapsed counter and any data resets it.

use std::thread;
use std::time::Duration;

use log::{debug, trace};

use crate::config::{Config, Timing};
use crate::error::{Error, Result};
use crate::port::Transport;

/// Longest acknowledgement line accepted.
pub const MAX_LINE: usize = 255;

/// Size of the accumulation buffer used while looking for an end marker.
pub const PATTERN_BUFFER: usize = 4096;

const LINE_READ: usize = 256;
const PATTERN_READ: usize = 512;
const DRAIN_READ: usize = 256;

/// Framing helper borrowing a transport for the duration of one exchange.
pub struct ResponseFramer<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    timing: &'a Timing,
}

impl<'a, T: Transport + ?Sized> ResponseFramer<'a, T> {
    /// Borrow `transport` with the given timing.
    pub fn new(transport: &'a mut T, timing: &'a Timing) -> Self {
        Self { transport, timing }
    }

    fn poll(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.transport
            .read(buf, self.timing.poll_interval)
    }

    /// Line mode: read until a newline or until `timeout` passes without
    /// new data.
    ///
    /// A partial line is returned as is. Fails with [`Error::Timeout`] when
    /// nothing at all arrived.
    pub fn read_response(&mut self, timeout: Duration) -> Result<String> {
        let mut line = Vec::with_capacity(MAX_LINE);
        let mut tmp = [0u8; LINE_READ];
        let mut elapsed = Duration::ZERO;

        while elapsed < timeout && line.len() < MAX_LINE {
            let want = (MAX_LINE - line.len()).min(LINE_READ);
            let n = self.poll(&mut tmp[..want])?;
            if n == 0 {
                elapsed += self.timing.poll_interval;
                continue;
            }
            elapsed = Duration::ZERO;
            line.extend_from_slice(&tmp[..n]);
            if tmp[..n].contains(&b'\n') {
                break;
            }
        }

        if line.is_empty() {
            return Err(Error::Timeout(format!("no response within {timeout:?}")));
        }

        let text = String::from_utf8_lossy(&line).into_owned();
        trace!("Line: {:?}", text.trim_end());
        Ok(text)
    }

    /// Pattern mode: forward narration to the sink until `pattern` shows up.
    ///
    /// Incoming text is appended to a [`PATTERN_BUFFER`]-byte accumulator as
    /// long as it fits; the pattern is a substring match over it. After a
    /// match, trailing bytes are drained briefly so they do not leak into the
    /// next command.
    pub fn read_until_complete(
        &mut self,
        config: &Config,
        pattern: &str,
        timeout: Duration,
    ) -> Result<()> {
        let mut acc: Vec<u8> = Vec::with_capacity(PATTERN_BUFFER);
        let mut tmp = [0u8; PATTERN_READ];
        let mut elapsed = Duration::ZERO;

        while elapsed < timeout {
            let n = self.poll(&mut tmp)?;
            if n == 0 {
                elapsed += self.timing.poll_interval;
                continue;
            }
            elapsed = Duration::ZERO;

            config.emit_filtered(&String::from_utf8_lossy(&tmp[..n]));
            if acc.len() + n <= PATTERN_BUFFER {
                acc.extend_from_slice(&tmp[..n]);
            }

            if String::from_utf8_lossy(&acc).contains(pattern) {
                debug!("Matched {pattern:?}");
                self.cleanup();
                return Ok(());
            }
        }

        config.emit("Timeout waiting for response", true);
        Err(Error::Timeout(format!("{pattern:?} not seen within {timeout:?}")))
    }

    /// Best-effort discard of bytes trailing a matched pattern.
    fn cleanup(&mut self) {
        thread::sleep(self.timing.pattern_cleanup);
        let mut tmp = [0u8; DRAIN_READ];
        loop {
            match self
                .transport
                .read(&mut tmp, self.timing.pattern_drain_read)
            {
                Ok(0) => return,
                Ok(n) => trace!("Discarded {n} trailing bytes"),
                Err(e) => {
                    debug!("Drain after pattern stopped: {e}");
                    return;
                },
            }
        }
    }

    /// Fixed-length binary mode: fill `buf` completely.
    ///
    /// Fails with an I/O error if `timeout` passes without new data before
    /// the buffer is full.
    pub fn read_binary(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        let mut filled = 0;
        let mut elapsed = Duration::ZERO;

        while filled < buf.len() && elapsed < timeout {
            let n = self.poll(&mut buf[filled..])?;
            if n == 0 {
                elapsed += self.timing.poll_interval;
                continue;
            }
            elapsed = Duration::ZERO;
            filled += n;
        }

        if filled < buf.len() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("received {filled} of {} bytes", buf.len()),
            )));
        }
        Ok(())
    }

    /// Drain narration for up to `timeout` of silence, forwarding it to the
    /// sink.
    ///
    /// Never fails: read errors end the drain. Returns everything received.
    pub fn read_all_responses(&mut self, config: &Config, timeout: Duration) -> String {
        let mut text = String::new();
        let mut tmp = [0u8; DRAIN_READ];
        let mut elapsed = Duration::ZERO;

        while elapsed < timeout {
            match self.poll(&mut tmp) {
                Ok(0) => elapsed += self.timing.poll_interval,
                Ok(n) => {
                    elapsed = Duration::ZERO;
                    let chunk = String::from_utf8_lossy(&tmp[..n]);
                    config.emit_filtered(&chunk);
                    text.push_str(&chunk);
                },
                Err(e) => {
                    debug!("Drain stopped: {e}");
                    break;
                },
            }
        }
        text
    }
}
