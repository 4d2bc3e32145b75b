//! FlashMaster MD session sequencer.
//!
//! [`FlashMd`] owns the transport and exposes the device operations. Every
//! data operation first runs the handshake (connect, check-id, clear-buffer
//! with settle delays between them) and aborts on the first failing step.
//!
//! ## Example
//!
//! ```rust,no_run
//! use flashmd::{Config, FlashMd};
//! use std::path::Path;
//!
//! fn main() -> flashmd::Result<()> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut dumper = FlashMd::open_auto()?;
//!         let config = Config::new();
//!
//!         // 0 KB reads the full 4 MB and trims the erased tail
//!         let size = dumper.read_rom(&config, Path::new("game.bin"), 0)?;
//!         println!("Saved {size} bytes");
//!
//!         dumper.close()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::fs::File;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

use crate::config::{Config, Timing};
use crate::error::{Error, Result};
use crate::interrupt::InterruptFlag;
use crate::port::Transport;
use crate::protocol::command::{self, CommandPacket};
use crate::protocol::framer::ResponseFramer;
use crate::protocol::size::{KB, SizeCode};
use crate::transfer::{ChunkTransfer, ReadPlan, SRAM_SIZE, Target};
use crate::trim;

/// Substring the connect acknowledgement must contain.
pub const CONNECTED_MARKER: &str = "connected";

/// End marker of a full-chip erase.
pub const FULL_ERASE_MARKER: &str = "SRAM ERASE FINISH";

/// End marker of a sector erase.
pub const SECTOR_ERASE_MARKER: &str = "ERASE OK";

/// FlashMaster MD dumper session.
///
/// Generic over the transport, so tests and alternative back ends can drive
/// the same sequencer. Only one operation runs at a time; callers needing a
/// responsive UI run operations on a worker thread and cancel through the
/// [`InterruptFlag`].
pub struct FlashMd<T: Transport> {
    transport: T,
    timing: Timing,
    interrupt: InterruptFlag,
}

impl<T: Transport> FlashMd<T> {
    /// Create a session over an opened transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timing: Timing::default(),
            interrupt: InterruptFlag::new(),
        }
    }

    /// Override protocol timing.
    #[must_use]
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Share a cancellation flag with the caller.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Protocol timing in use.
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Cancellation flag checked at chunk boundaries.
    pub fn interrupt(&self) -> &InterruptFlag {
        &self.interrupt
    }

    /// Get a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the session and return the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn report<R>(config: &Config, operation: &str, result: Result<R>) -> Result<R> {
        if let Err(e) = &result {
            config.emit(&format!("{operation} failed: {e}"), true);
        }
        result
    }

    fn framer(&mut self) -> ResponseFramer<'_, T> {
        ResponseFramer::new(&mut self.transport, &self.timing)
    }

    /// Send the connect command and wait for the "connected" line.
    pub fn connect(&mut self, config: &Config) -> Result<()> {
        let result = self.do_connect(config);
        Self::report(config, "Connect", result)
    }

    fn do_connect(&mut self, config: &Config) -> Result<()> {
        debug!("Connecting on {}", self.transport.name());
        command::send(&mut self.transport, &CommandPacket::connect())?;

        let timeout = self.timing.line_ack;
        let line = self
            .framer()
            .read_response(timeout)
            .map_err(|e| match e {
                Error::Timeout(_) => Error::Timeout("no connection acknowledgement".to_string()),
                other => other,
            })?;

        if !line.contains(CONNECTED_MARKER) {
            config.emit_filtered(&line);
            return Err(Error::Timeout(format!(
                "unexpected connect reply {:?}",
                line.trim_end()
            )));
        }

        config.emit_filtered(&line);
        Ok(())
    }

    /// Ask the device for its flash identity.
    ///
    /// The narration is forwarded to the sink and returned; it is not
    /// interpreted.
    pub fn check_id(&mut self, config: &Config) -> Result<String> {
        let result = self.do_check_id(config);
        Self::report(config, "Check ID", result)
    }

    fn do_check_id(&mut self, config: &Config) -> Result<String> {
        command::send(&mut self.transport, &CommandPacket::check_id())?;
        let timeout = self.timing.check_id_drain;
        Ok(self
            .framer()
            .read_all_responses(config, timeout))
    }

    /// Reset the device's receive buffer.
    pub fn clear_buffer(&mut self, config: &Config) -> Result<()> {
        let result = self.do_clear_buffer(config, self.timing.clear_buffer_drain);
        Self::report(config, "Clear buffer", result)
    }

    fn do_clear_buffer(&mut self, config: &Config, drain: Duration) -> Result<()> {
        command::send(&mut self.transport, &CommandPacket::clear_buffer())?;
        self.framer()
            .read_all_responses(config, drain);
        Ok(())
    }

    /// Run the handshake: connect, check-id, clear-buffer.
    pub fn device_init(&mut self, config: &Config) -> Result<()> {
        let result = self.do_device_init(config);
        Self::report(config, "Device init", result)
    }

    fn do_device_init(&mut self, config: &Config) -> Result<()> {
        self.do_connect(config)?;
        thread::sleep(self.timing.settle);
        self.do_check_id(config)?;
        thread::sleep(self.timing.settle);
        self.do_clear_buffer(config, self.timing.clear_buffer_drain)
    }

    /// Erase flash. `0` erases the whole chip, otherwise the sectors
    /// covering `size_kb`.
    pub fn erase(&mut self, config: &Config, size_kb: u32) -> Result<()> {
        let result = self.do_erase(config, size_kb);
        Self::report(config, "Erase", result)
    }

    fn do_erase(&mut self, config: &Config, size_kb: u32) -> Result<()> {
        self.do_device_init(config)?;

        let (packet, marker, timeout) = if size_kb == 0 {
            config.emit("Erasing entire flash...", false);
            (
                CommandPacket::full_erase(),
                FULL_ERASE_MARKER,
                self.timing.full_erase,
            )
        } else {
            let size = SizeCode::from_kb(size_kb);
            config.emit(&format!("Erasing {size} of flash..."), false);
            (
                CommandPacket::sector_erase(size),
                SECTOR_ERASE_MARKER,
                self.timing.sector_erase,
            )
        };

        command::send(&mut self.transport, &packet)?;
        self.framer()
            .read_until_complete(config, marker, timeout)?;
        config.emit("Erase complete.", false);
        Ok(())
    }

    /// Erase the sector containing `address` (24-bit).
    pub fn erase_sector_at(&mut self, config: &Config, address: u32) -> Result<()> {
        let result = self.do_erase_sector_at(config, address);
        Self::report(config, "Sector erase", result)
    }

    fn do_erase_sector_at(&mut self, config: &Config, address: u32) -> Result<()> {
        let packet = CommandPacket::sector_erase_at(address)?;
        self.do_device_init(config)?;

        config.emit(&format!("Erasing sector at 0x{address:06X}..."), false);
        command::send(&mut self.transport, &packet)?;
        let timeout = self.timing.sector_erase;
        self.framer()
            .read_until_complete(config, SECTOR_ERASE_MARKER, timeout)?;
        config.emit("Sector erase complete.", false);
        Ok(())
    }

    fn read_preamble(&mut self, config: &Config) {
        let timeout = self.timing.line_ack;
        match self.framer().read_response(timeout) {
            Ok(line) => config.emit_filtered(&line),
            Err(e) => debug!("No dump preamble: {e}"),
        }
    }

    /// Dump the ROM to `path`.
    ///
    /// `size_kb == 0` reads the full 4 MB. Unless `config.no_trim` is set the
    /// file is trimmed afterwards. Returns the final file length. A failed or
    /// interrupted read leaves the partial file on disk.
    pub fn read_rom(&mut self, config: &Config, path: &Path, size_kb: u32) -> Result<u64> {
        let result = self.do_read_rom(config, path, size_kb);
        Self::report(config, "ROM read", result)
    }

    fn do_read_rom(&mut self, config: &Config, path: &Path, size_kb: u32) -> Result<u64> {
        let plan = ReadPlan::rom(size_kb, config.no_trim);
        self.do_device_init(config)?;

        let mut file = File::create(path).map_err(|e| Error::file(path, e))?;
        debug!("Reading {} ROM into {}", plan.size, path.display());
        config.emit(&format!("Reading {} ROM...", plan.size), false);
        command::send(&mut self.transport, &CommandPacket::read_rom(plan.size))?;
        self.read_preamble(config);

        let result = ChunkTransfer::new(&mut self.transport, &self.timing, config, &self.interrupt)
            .with_path(path)
            .read_rom(&plan, &mut file);
        let synced = file
            .sync_all()
            .map_err(|e| Error::file(path, e));
        drop(file);
        let saved = result?;
        synced?;

        let timeout = self.timing.read_trailer_drain;
        self.framer()
            .read_all_responses(config, timeout);

        config.emit(&format!("ROM dump complete: {saved} bytes."), false);
        if config.no_trim {
            return Ok(saved);
        }

        let trimmed = trim::trim_file(path)?;
        if trimmed.removed_padding() {
            config.emit(&format!("ROM file trimmed to {} bytes.", trimmed.len), false);
        } else {
            config.emit("ROM file has no trailing 0xFF padding.", false);
        }
        Ok(trimmed.len)
    }

    /// Dump the 32 KB save RAM to `path`. Returns the bytes written.
    pub fn read_sram(&mut self, config: &Config, path: &Path) -> Result<u64> {
        let result = self.do_read_sram(config, path);
        Self::report(config, "SRAM read", result)
    }

    fn do_read_sram(&mut self, config: &Config, path: &Path) -> Result<u64> {
        self.do_device_init(config)?;

        let mut file = File::create(path).map_err(|e| Error::file(path, e))?;
        debug!("Reading SRAM into {}", path.display());
        config.emit("Reading 32 KB save RAM...", false);
        command::send(&mut self.transport, &CommandPacket::read_sram())?;
        self.read_preamble(config);

        let result = ChunkTransfer::new(&mut self.transport, &self.timing, config, &self.interrupt)
            .with_path(path)
            .read_sram(&mut file);
        let synced = file
            .sync_all()
            .map_err(|e| Error::file(path, e));
        drop(file);
        let saved = result?;
        synced?;

        let timeout = self.timing.read_trailer_drain;
        self.framer()
            .read_all_responses(config, timeout);
        config.emit(&format!("SRAM dump complete: {saved} bytes."), false);
        Ok(saved)
    }

    fn open_source(path: &Path) -> Result<(File, u64)> {
        let file = File::open(path).map_err(|e| Error::file(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| Error::file(path, e))?
            .len();
        if len == 0 {
            return Err(Error::file(
                path,
                io::Error::new(io::ErrorKind::InvalidData, "file is empty"),
            ));
        }
        Ok((file, len))
    }

    fn write_epilogue(&mut self, config: &Config) -> Result<()> {
        self.do_clear_buffer(config, self.timing.write_trailer_drain)
    }

    /// Program the ROM from `path`.
    ///
    /// `size_kb == 0` writes the whole file, otherwise at most `size_kb`
    /// kilobytes of it. Returns the bytes sent.
    pub fn write_rom(&mut self, config: &Config, path: &Path, size_kb: u32) -> Result<u64> {
        let result = self.do_write_rom(config, path, size_kb);
        Self::report(config, "ROM write", result)
    }

    fn do_write_rom(&mut self, config: &Config, path: &Path, size_kb: u32) -> Result<u64> {
        let (mut file, len) = Self::open_source(path)?;
        let total = if size_kb == 0 {
            len
        } else {
            (u64::from(size_kb) * u64::from(KB)).min(len)
        };
        if total > Target::Rom.capacity() {
            return Err(Error::InvalidParameter(format!(
                "{} is {total} bytes, larger than the 8M flash",
                path.display()
            )));
        }

        self.do_device_init(config)?;
        debug!("Writing {total} bytes from {}", path.display());
        config.emit(&format!("Writing {total} bytes to flash..."), false);
        let sent = ChunkTransfer::new(&mut self.transport, &self.timing, config, &self.interrupt)
            .with_path(path)
            .write(Target::Rom, &mut file, total)?;

        self.write_epilogue(config)?;
        config.emit(&format!("ROM write complete: {sent} bytes written."), false);
        Ok(sent)
    }

    /// Restore save RAM from `path`. Files over 32 KB are truncated.
    pub fn write_sram(&mut self, config: &Config, path: &Path) -> Result<u64> {
        let result = self.do_write_sram(config, path);
        Self::report(config, "SRAM write", result)
    }

    fn do_write_sram(&mut self, config: &Config, path: &Path) -> Result<u64> {
        let (mut file, len) = Self::open_source(path)?;
        let capacity = u64::from(SRAM_SIZE);
        if len > capacity {
            warn!("{} is {len} bytes, writing the first {capacity}", path.display());
            config.emit(
                &format!("Warning: file is larger than 32 KB, only the first {capacity} bytes will be written"),
                false,
            );
        }
        let total = len.min(capacity);

        self.do_device_init(config)?;
        debug!("Writing {total} bytes of SRAM from {}", path.display());
        config.emit(&format!("Writing {total} bytes to save RAM..."), false);
        let sent = ChunkTransfer::new(&mut self.transport, &self.timing, config, &self.interrupt)
            .with_path(path)
            .write(Target::Sram, &mut file, total)?;

        self.write_epilogue(config)?;
        config.emit(&format!("SRAM write complete: {sent} bytes written."), false);
        Ok(sent)
    }

    /// Release the transport.
    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }
}

#[cfg(feature = "native")]
mod native_impl {
    use super::FlashMd;
    use crate::error::Result;
    use crate::port::SerialTransport;

    impl FlashMd<SerialTransport> {
        /// Open the dumper on a named serial port.
        pub fn open(port_name: &str) -> Result<Self> {
            Ok(Self::new(SerialTransport::open(port_name)?))
        }

        /// Find the dumper by USB VID/PID and open it.
        pub fn open_auto() -> Result<Self> {
            Ok(Self::new(SerialTransport::open_auto()?))
        }
    }
}
