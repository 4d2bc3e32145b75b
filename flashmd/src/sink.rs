//! Progress and message reporting.
//!
//! The engine never prints. Every status line, device narration and error is
//! handed to an [`EventSink`], and progress is reported after each chunk.
//! Front ends plug in their own sink (a progress bar, a GUI channel, a test
//! recorder); [`StdioSink`] is the default.

use std::io::Write;

/// Device narration that is hidden unless verbose output was requested.
pub const FILTERED_MESSAGES: [&str; 4] = [
    "BUFF IS CLEAR",
    "ROM DUMP START!!!",
    "DUMPER ROM FINISH!!!",
    "PUSH SAVE GAME BUTTON!!!",
];

/// Whether `text` should be suppressed.
///
/// Matching is by substring, so a line such as `"4M ROM DUMP START!!!"` is
/// filtered too.
pub fn should_filter(text: &str, verbose: bool) -> bool {
    !verbose && FILTERED_MESSAGES.iter().any(|m| text.contains(m))
}

/// Receiver for engine events.
pub trait EventSink: Send + Sync {
    /// Called after every chunk with the bytes done so far and the target.
    fn on_progress(&self, current: u64, total: u64);

    /// Called for every line of status or error text.
    fn on_message(&self, text: &str, is_error: bool);
}

/// Writes messages to stdout/stderr and progress as a single updating line.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioSink;

impl EventSink for StdioSink {
    fn on_progress(&self, current: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            current.saturating_mul(100) / total
        };
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\rProgress: {current}/{total} bytes ({percent}%)");
        if current >= total {
            let _ = writeln!(out);
        }
        let _ = out.flush();
    }

    fn on_message(&self, text: &str, is_error: bool) {
        if is_error {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_progress(&self, _current: u64, _total: u64) {}

    fn on_message(&self, _text: &str, _is_error: bool) {}
}
