//! Transport abstraction for the dumper's bulk endpoints.
//!
//! The FlashMaster MD exposes a single bulk-out and a single bulk-in endpoint
//! behind a USB CDC (virtual serial) interface. The protocol layer only needs
//! two primitives from it:
//!
//! - a blocking write of a whole buffer
//! - a read with an explicit timeout, where `Ok(0)` means "no data arrived
//!   before the timeout" and is distinct from a hard I/O error
//!
//! ```text
//! +--------------------------+
//! |  FlashMd (sequencer)     |
//! |  transfer / framer       |
//! +------------+-------------+
//!              |
//!              v
//! +------------+-------------+
//! |     Transport trait      |
//! +------------+-------------+
//!              |
//!              v
//! +------------+-------------+
//! | SerialTransport          |
//! |   (serialport, CDC ACM)  |
//! +--------------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use flashmd::port::Transport;
//! use std::time::Duration;
//!
//! fn example<T: Transport>(port: &mut T) -> flashmd::Result<()> {
//!     port.write(b"ping")?;
//!
//!     let mut buf = [0u8; 64];
//!     let n = port.read(&mut buf, Duration::from_millis(30))?;
//!     println!("Received: {:?}", &buf[..n]);
//!
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::time::Duration;

use crate::error::Result;

/// USB vendor ID of the dumper (STMicroelectronics).
pub const VENDOR_ID: u16 = 0x0483;

/// USB product ID of the dumper (STM32 virtual COM port).
pub const PRODUCT_ID: u16 = 0x5740;

/// Timeout applied to every bulk-out write.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Bidirectional byte channel bound to one bulk-in and one bulk-out endpoint.
pub trait Transport {
    /// Write `data`, returning the number of bytes transferred.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read up to `buf.len()` bytes, waiting at most `timeout`.
    ///
    /// Returns `Ok(0)` when the timeout elapsed without data.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Human-readable name of the underlying endpoint.
    fn name(&self) -> &str;

    /// Release the endpoint. Further I/O fails after this.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read(buf, timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read(buf, timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

// Re-export the native implementation
#[cfg(feature = "native")]
pub use native::SerialTransport;
