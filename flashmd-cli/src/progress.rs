//! Terminal rendering of library events.

use std::sync::Mutex;

use console::style;
use flashmd::EventSink;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;

/// [`EventSink`] drawing an indicatif progress bar on stderr.
///
/// Device narration goes to stderr above the bar. Failure messages are
/// only echoed in verbose mode since `main` reports the final error.
pub(crate) struct CliSink {
    quiet: bool,
    verbose: bool,
    fancy: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl CliSink {
    pub(crate) fn new(quiet: bool, verbose: bool, fancy: bool) -> Self {
        Self {
            quiet,
            verbose,
            fancy,
            bar: Mutex::new(None),
        }
    }

    fn new_bar(&self, total: u64) -> ProgressBar {
        if self.quiet || !self.fancy {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb
    }

    /// Finish and remove the active bar, if any.
    pub(crate) fn finish(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn print(&self, line: &str) {
        let active = self.bar.lock().ok().and_then(|guard| guard.clone());
        match active {
            Some(pb) if !pb.is_hidden() => pb.suspend(|| eprintln!("{line}")),
            _ => eprintln!("{line}"),
        }
    }
}

impl EventSink for CliSink {
    fn on_progress(&self, current: u64, total: u64) {
        let Ok(mut guard) = self.bar.lock() else {
            return;
        };
        let pb = guard.get_or_insert_with(|| self.new_bar(total));
        if pb.length() != Some(total) {
            pb.set_length(total);
        }
        pb.set_position(current);
    }

    fn on_message(&self, text: &str, is_error: bool) {
        if is_error {
            if self.verbose {
                self.print(&format!("{} {text}", style("!").red()));
            } else {
                debug!("{text}");
            }
        } else if !self.quiet {
            self.print(text);
        }
    }
}

impl Drop for CliSink {
    fn drop(&mut self) {
        self.finish();
    }
}
