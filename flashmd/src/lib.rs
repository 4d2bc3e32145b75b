//! # flashmd
//!
//! Host-side engine for the FlashMaster MD Mega Drive / Genesis cartridge
//! dumper.
//!
//! The dumper is an STM32 board that enumerates as a USB CDC virtual serial
//! port. The host drives it with fixed 64-byte command packets and reads back
//! a mix of human-readable narration and raw 1 KB data blocks. This crate
//! provides:
//!
//! - the command codec and size codes
//! - heuristic response framing (line, end-marker and fixed-length modes)
//! - the chunked transfer engine with end-of-stream tolerance
//! - ROM dump trimming
//! - [`FlashMd`], the session sequencer behind every operation
//!
//! ## Features
//!
//! - `native` (default): serial transport via the `serialport` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use flashmd::{Config, FlashMd};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut dumper = FlashMd::open_auto()?;
//!         let config = Config::new().with_no_trim(false);
//!
//!         dumper.erase(&config, 0)?;
//!         dumper.write_rom(&config, Path::new("homebrew.bin"), 0)?;
//!         dumper.read_sram(&config, Path::new("save.srm"))?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod device;
pub mod error;
pub mod flasher;
pub mod interrupt;
pub mod port;
pub mod protocol;
pub mod sink;
pub mod transfer;
pub mod trim;

// Re-exports for convenience
#[cfg(feature = "native")]
pub use device::auto_detect_port;
#[cfg(feature = "native")]
pub use port::SerialTransport;
pub use {
    config::{Config, Timing},
    device::{DetectedPort, DeviceKind, detect_ports, format_port_list, try_detect_ports},
    error::{Error, Result},
    flasher::FlashMd,
    interrupt::InterruptFlag,
    port::Transport,
    protocol::{CommandPacket, Opcode, SizeCode, kb_to_size_code, size_to_bytes},
    sink::{EventSink, FILTERED_MESSAGES, NullSink, StdioSink, should_filter},
    transfer::{CHUNK_SIZE, SRAM_SIZE},
    trim::{Trimmed, trim_file},
};
