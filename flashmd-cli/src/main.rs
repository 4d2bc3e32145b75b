//! flashmd CLI - Command-line tool for the FlashMaster MD cartridge dumper.
//!
//! ## Features
//!
//! - Dump and program Mega Drive / Genesis ROMs
//! - Back up and restore save RAM
//! - Full, sized and single-sector erase
//! - Automatic detection of the dumper's USB serial port
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use flashmd::InterruptFlag;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process;
use thiserror::Error;

mod commands;
mod config;
mod progress;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if progress animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Errors that map to dedicated exit codes.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    /// Invalid combination of arguments.
    #[error("{0}")]
    Usage(String),
    /// Unusable configuration.
    #[error("{0}")]
    Config(String),
    /// Cancelled by the user.
    #[error("{0}")]
    Cancelled(String),
}

/// Map an error to the process exit code.
///
/// 1 generic failure, 2 usage, 3 configuration, 4 device not found,
/// 130 interrupted.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Config(_) => 3,
            CliError::Cancelled(_) => 130,
        };
    }
    match err.downcast_ref::<flashmd::Error>() {
        Some(flashmd::Error::DeviceNotFound) => 4,
        Some(flashmd::Error::Interrupted) => 130,
        Some(flashmd::Error::InvalidParameter(_)) => 2,
        _ => 1,
    }
}

/// flashmd - Read, write and erase Mega Drive cartridges with the
/// FlashMaster MD dumper.
///
/// Environment variables:
///   FLASHMD_PORT      - Serial port of the dumper
///   FLASHMD_VERBOSE   - Show all firmware messages (1/true/yes)
#[derive(Parser)]
#[command(name = "flashmd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Sizes are in kilobytes and accept K/M suffixes, e.g. 768, 1M, 4M.")]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "FLASHMD_PORT")]
    pub(crate) port: Option<String>,

    /// Verbose output level (-v shows all firmware messages, -vv adds debug logs).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Dump the cartridge ROM to a file.
    Read {
        /// Output file.
        output: PathBuf,

        /// Size to read (0 reads 4M and trims the erased tail).
        #[arg(short, long, default_value = "0", value_parser = parse_size_kb)]
        size: u32,

        /// Keep trailing 0xFF bytes; the file is exactly the requested size.
        #[arg(short, long)]
        no_trim: bool,
    },

    /// Program a ROM file into the cartridge flash.
    Write {
        /// ROM file to write.
        input: PathBuf,

        /// Limit the amount written (0 writes the whole file).
        #[arg(short, long, default_value = "0", value_parser = parse_size_kb)]
        size: u32,
    },

    /// Erase the cartridge flash.
    Erase {
        /// Erase the entire chip.
        #[arg(long, conflicts_with_all = ["size", "sector"])]
        all: bool,

        /// Erase the sectors covering this size.
        #[arg(short, long, value_parser = parse_size_kb, conflicts_with = "sector")]
        size: Option<u32>,

        /// Erase the single sector containing this address (hex).
        #[arg(long, value_parser = parse_hex_u32)]
        sector: Option<u32>,
    },

    /// Back up the 32 KB save RAM.
    ReadSram {
        /// Output file.
        output: PathBuf,
    },

    /// Restore the save RAM from a file (at most 32 KB is written).
    WriteSram {
        /// Save file to write.
        input: PathBuf,
    },

    /// Test the connection to the dumper.
    Connect,

    /// Read the flash chip ID.
    Id,

    /// Clear the dumper's receive buffer.
    Clear,

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,

        /// Include ports that are not a FlashMaster MD.
        #[arg(long)]
        all: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (detected from $SHELL if not specified).
        #[arg(value_enum)]
        shell: Option<Shell>,
    },
}

/// Parse a size in kilobytes; `K` and `M` suffixes are accepted.
fn parse_size_kb(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let upper = s.to_ascii_uppercase();
    let (digits, scale) = if let Some(n) = upper.strip_suffix('M') {
        (n, 1024)
    } else if let Some(n) = upper.strip_suffix('K') {
        (n, 1)
    } else {
        (upper.as_str(), 1)
    };
    digits
        .trim()
        .parse::<u32>()
        .ok()
        .and_then(|n| n.checked_mul(scale))
        .ok_or_else(|| format!("Invalid size '{s}'. Expected kilobytes, e.g. 768, 1M or 4M"))
}

/// Parse hexadecimal address (supports 0x prefix and underscores).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let s = s
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    let s: String = s
        .chars()
        .filter(|c| *c != '_')
        .collect();
    u32::from_str_radix(&s, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

/// Whether `FLASHMD_VERBOSE` asks for firmware narration.
fn env_verbose() -> bool {
    env::var("FLASHMD_VERBOSE").is_ok_and(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 | 1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() -> InterruptFlag {
    let interrupt = InterruptFlag::new();
    let handler = interrupt.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.set()) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    interrupt
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)?
    } else {
        Config::load()
    };
    if env_verbose() {
        config.dump.verbose = true;
    }

    match &cli.command {
        Commands::ListPorts { json, all } => commands::ports::cmd_list_ports(*json, *all),
        Commands::Completions { shell } => commands::completions::cmd_completions(*shell),
        command => {
            let interrupt = install_interrupt_handler();
            let ctx = commands::Context {
                cli,
                config: &config,
                interrupt,
            };
            match command {
                Commands::Read {
                    output,
                    size,
                    no_trim,
                } => commands::dump::cmd_read(&ctx, output, *size, *no_trim),
                Commands::Write { input, size } => commands::dump::cmd_write(&ctx, input, *size),
                Commands::Erase { all, size, sector } => {
                    commands::dump::cmd_erase(&ctx, *all, *size, *sector)
                },
                Commands::ReadSram { output } => commands::dump::cmd_read_sram(&ctx, output),
                Commands::WriteSram { input } => commands::dump::cmd_write_sram(&ctx, input),
                Commands::Connect => commands::session::cmd_connect(&ctx),
                Commands::Id => commands::session::cmd_id(&ctx),
                Commands::Clear => commands::session::cmd_clear(&ctx),
                Commands::ListPorts { .. } | Commands::Completions { .. } => Ok(()),
            }
        },
    }
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "flashmd v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        process::exit(exit_code_for(&err));
    }
}
