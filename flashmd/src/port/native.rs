//! Native transport implementation using the `serialport` crate.
//!
//! The dumper's CDC interface shows up as `/dev/ttyACM*` on Linux,
//! `/dev/cu.usbmodem*` on macOS and `COMx` on Windows. The line settings are
//! ignored by the device, so the port is opened 8N1 at a nominal baud rate.

use {
    crate::{
        device::{self, DetectedPort},
        error::{Error, Result},
        port::{Transport, WRITE_TIMEOUT},
    },
    log::{debug, trace},
    serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits},
    std::{
        io::{ErrorKind, Read, Write},
        time::Duration,
    },
};

/// Nominal baud rate; CDC ACM devices ignore it.
pub const NOMINAL_BAUD: u32 = 115_200;

/// Transport over the dumper's virtual serial port.
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    timeout: Duration,
}

impl SerialTransport {
    /// Open the dumper at `port_name`.
    pub fn open(port_name: &str) -> Result<Self> {
        let port = serialport::new(port_name, NOMINAL_BAUD)
            .timeout(WRITE_TIMEOUT)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => Error::DeviceNotFound,
                _ => Error::ClaimInterfaceFailed(format!("{port_name}: {e}")),
            })?;

        // Stale narration from a previous session must not leak into framing.
        if let Err(e) = port.clear(ClearBuffer::All) {
            debug!("Could not clear buffers on {port_name}: {e}");
        }

        debug!("Opened {port_name}");
        Ok(Self {
            port: Some(port),
            name: port_name.to_string(),
            timeout: WRITE_TIMEOUT,
        })
    }

    /// Locate the attached dumper by USB VID/PID and open it.
    pub fn open_auto() -> Result<Self> {
        let port = device::auto_detect_port()?;
        Self::open(&port.name)
    }

    /// Open a previously detected endpoint.
    pub fn open_detected(port: &DetectedPort) -> Result<Self> {
        Self::open(&port.name)
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| Error::Io(std::io::Error::new(ErrorKind::NotConnected, "port closed")))
    }

    fn ensure_timeout(&mut self, timeout: Duration) -> Result<()> {
        if self.timeout != timeout {
            self.port_mut()?
                .set_timeout(timeout)?;
            self.timeout = timeout;
        }
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_timeout(WRITE_TIMEOUT)?;
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        trace!("=> {} bytes", data.len());
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.ensure_timeout(timeout)?;
        match self
            .port_mut()?
            .read(buf)
        {
            Ok(n) => {
                if n > 0 {
                    trace!("<= {n} bytes");
                }
                Ok(n)
            },
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle releases the interface
        if self
            .port
            .take()
            .is_some()
        {
            debug!("Closed {}", self.name);
        }
        Ok(())
    }
}
