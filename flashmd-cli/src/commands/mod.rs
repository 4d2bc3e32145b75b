//! Command implementations.

pub(crate) mod completions;
pub(crate) mod dump;
pub(crate) mod ports;
pub(crate) mod session;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use console::style;
use flashmd::{FlashMd, InterruptFlag, SerialTransport};
use log::debug;

use crate::config::Config;
use crate::progress::CliSink;
use crate::{Cli, CliError, use_fancy_output};

/// An open dumper with its per-operation config and sink.
pub(crate) type Session = (FlashMd<SerialTransport>, flashmd::Config, Arc<CliSink>);

/// State shared by every device command.
pub(crate) struct Context<'a> {
    pub(crate) cli: &'a Cli,
    pub(crate) config: &'a Config,
    pub(crate) interrupt: InterruptFlag,
}

impl Context<'_> {
    /// Resolve the port: `--port`/`FLASHMD_PORT`, then the config file,
    /// then USB auto-detection.
    pub(crate) fn port(&self) -> Result<String> {
        if let Some(ref port) = self.cli.port {
            return Ok(port.clone());
        }
        if let Some(ref port) = self.config.connection.serial {
            debug!("Using port from config: {port}");
            return Ok(port.clone());
        }
        let detected = flashmd::auto_detect_port()?;
        Ok(detected.name)
    }

    /// Open the dumper and build the library config for one operation.
    pub(crate) fn open(&self, no_trim: bool) -> Result<Session> {
        let port = self.port()?;
        self.status(&format!("{} Using port {port}", style("🔌").cyan()));

        let dumper = FlashMd::open(&port)
            .with_context(|| format!("cannot open {port}"))?
            .with_interrupt(self.interrupt.clone());
        self.ensure_not_interrupted()?;

        let verbose = self.verbose();
        let sink = Arc::new(CliSink::new(self.cli.quiet, verbose, use_fancy_output()));
        let config = flashmd::Config::new()
            .with_verbose(verbose)
            .with_no_trim(no_trim || self.config.dump.no_trim)
            .with_sink(sink.clone());
        Ok((dumper, config, sink))
    }

    pub(crate) fn verbose(&self) -> bool {
        self.cli.verbose > 0 || self.config.dump.verbose
    }

    /// Print a status line unless `--quiet`.
    pub(crate) fn status(&self, line: &str) {
        if !self.cli.quiet {
            eprintln!("{line}");
        }
    }

    pub(crate) fn ensure_not_interrupted(&self) -> Result<()> {
        if self.interrupt.is_set() {
            Err(CliError::Cancelled("Interrupted by user".to_string()).into())
        } else {
            Ok(())
        }
    }
}

/// Run `op` against an open dumper, always releasing the port afterwards.
pub(crate) fn with_dumper<R>(
    ctx: &Context<'_>,
    no_trim: bool,
    op: impl FnOnce(&mut FlashMd<SerialTransport>, &flashmd::Config) -> flashmd::Result<R>,
) -> Result<R> {
    let (mut dumper, config, sink) = ctx.open(no_trim)?;
    let result = op(&mut dumper, &config);
    sink.finish();
    if let Err(e) = dumper.close() {
        debug!("Error closing port: {e}");
    }
    Ok(result?)
}
