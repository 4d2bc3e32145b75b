//! Per-call options and protocol timing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::sink::{EventSink, StdioSink, should_filter};

/// Options for a single operation.
#[derive(Clone)]
pub struct Config {
    /// Show narration that is normally filtered.
    pub verbose: bool,
    /// Keep the full dump instead of trimming trailing `0xFF`.
    pub no_trim: bool,
    /// Where progress and messages go.
    pub sink: Arc<dyn EventSink>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            no_trim: false,
            sink: Arc::new(StdioSink),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("verbose", &self.verbose)
            .field("no_trim", &self.no_trim)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Create a config with the default stdio sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbose output.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Disable trimming of read dumps.
    #[must_use]
    pub fn with_no_trim(mut self, no_trim: bool) -> Self {
        self.no_trim = no_trim;
        self
    }

    /// Route events to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Report a status or error line.
    pub fn emit(&self, text: &str, is_error: bool) {
        self.sink.on_message(text, is_error);
    }

    /// Report device narration line by line, honoring the filter set.
    pub fn emit_filtered(&self, text: &str) {
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || should_filter(line, self.verbose) {
                continue;
            }
            self.sink.on_message(line, false);
        }
    }

    /// Report progress.
    pub fn progress(&self, current: u64, total: u64) {
        self.sink.on_progress(current, total);
    }
}

/// Every delay and deadline the protocol depends on.
///
/// The firmware was tuned against these values and their relative order
/// (poll interval, chunk deadline, near-end grace, last-chunk retry) must be
/// kept. Elapsed time inside framing loops is the sum of poll intervals that
/// returned no data, reset whenever bytes arrive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Single transport read timeout.
    pub poll_interval: Duration,
    /// Line-mode acknowledgement deadline (connect, read preamble).
    pub line_ack: Duration,
    /// Pause between handshake steps.
    pub settle: Duration,
    /// Narration drain after check-id.
    pub check_id_drain: Duration,
    /// Narration drain after clear-buffer.
    pub clear_buffer_drain: Duration,
    /// Deadline for an ordinary 1 KB chunk.
    pub chunk: Duration,
    /// Deadline for the two chunks before the last.
    pub near_end_chunk: Duration,
    /// Deadline for the last chunk.
    pub last_chunk: Duration,
    /// Idle time after partial data before a near-end chunk is accepted.
    pub near_end_grace: Duration,
    /// Idle time after partial data before the last chunk is accepted.
    pub last_grace: Duration,
    /// Budget within which last-chunk read errors are tolerated.
    pub last_chunk_error_budget: Duration,
    /// Pause before retrying an empty last chunk.
    pub last_chunk_pause: Duration,
    /// Timeout of the single retry for an empty last chunk.
    pub last_chunk_retry: Duration,
    /// Trailer drain after a read.
    pub read_trailer_drain: Duration,
    /// Programming delay after each written data chunk.
    pub write_delay: Duration,
    /// Per-chunk write acknowledgement deadline.
    pub write_ack: Duration,
    /// Narration drain after the write epilogue.
    pub write_trailer_drain: Duration,
    /// Pause after an end pattern matched.
    pub pattern_cleanup: Duration,
    /// Read timeout while draining after an end pattern.
    pub pattern_drain_read: Duration,
    /// Deadline for the full erase marker.
    pub full_erase: Duration,
    /// Deadline for the sector erase marker.
    pub sector_erase: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(30),
            line_ack: Duration::from_secs(2),
            settle: Duration::from_millis(100),
            check_id_drain: Duration::from_secs(3),
            clear_buffer_drain: Duration::from_secs(2),
            chunk: Duration::from_secs(5),
            near_end_chunk: Duration::from_secs(8),
            last_chunk: Duration::from_secs(10),
            near_end_grace: Duration::from_millis(1500),
            last_grace: Duration::from_secs(2),
            last_chunk_error_budget: Duration::from_secs(5),
            last_chunk_pause: Duration::from_millis(200),
            last_chunk_retry: Duration::from_secs(3),
            read_trailer_drain: Duration::from_secs(2),
            write_delay: Duration::from_millis(1),
            write_ack: Duration::from_secs(5),
            write_trailer_drain: Duration::from_secs(1),
            pattern_cleanup: Duration::from_millis(100),
            pattern_drain_read: Duration::from_millis(100),
            full_erase: Duration::from_secs(3),
            sector_erase: Duration::from_secs(5),
        }
    }
}

impl Timing {
    /// Default timing with every real sleep removed.
    ///
    /// Deadlines are untouched; only the pauses that would block the calling
    /// thread regardless of transport activity are zeroed.
    #[must_use]
    pub fn without_delays() -> Self {
        Self {
            settle: Duration::ZERO,
            last_chunk_pause: Duration::ZERO,
            write_delay: Duration::ZERO,
            pattern_cleanup: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::recording::RecordingSink;

    #[test]
    fn test_timing_order_is_preserved() {
        let t = Timing::default();
        assert!(t.poll_interval < t.chunk);
        assert!(t.near_end_grace < t.last_grace);
        assert!(t.chunk < t.near_end_chunk);
        assert!(t.near_end_chunk < t.last_chunk);
        assert!(t.last_grace < t.last_chunk_retry);
    }

    #[test]
    fn test_emit_filtered_splits_and_filters() {
        let sink = Arc::new(RecordingSink::default());
        let config = Config::new().with_sink(sink.clone());

        config.emit_filtered("BUFF IS CLEAR\r\nFlash ID: C2 22C9\r\n\r\n");
        assert_eq!(sink.texts(), vec!["Flash ID: C2 22C9".to_string()]);
    }

    #[test]
    fn test_emit_filtered_verbose_keeps_everything() {
        let sink = Arc::new(RecordingSink::default());
        let config = Config::new().with_sink(sink.clone()).with_verbose(true);

        config.emit_filtered("BUFF IS CLEAR\r\n");
        assert_eq!(sink.texts(), vec!["BUFF IS CLEAR".to_string()]);
    }
}
