//! Error types for flashmd.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for flashmd operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for flashmd operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The USB/serial subsystem could not be initialised or enumerated.
    #[error("Failed to initialize USB: {0}")]
    UsbInitFailed(String),

    /// No FlashMaster MD dumper is attached.
    #[error("Device not found")]
    DeviceNotFound,

    /// The device was found but could not be opened for exclusive use.
    #[error("Could not claim USB interface: {0}")]
    ClaimInterfaceFailed(String),

    /// No data or acknowledgement arrived within the deadline.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Transport-level failure other than a timeout.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Host filesystem failure (open, read, write, truncate).
    #[error("File error on {}: {source}", path.display())]
    File {
        /// File the operation was working on.
        path: PathBuf,
        /// Underlying filesystem error.
        source: io::Error,
    },

    /// The operation was cancelled through the interrupt flag.
    #[error("Operation interrupted")]
    Interrupted,

    /// A caller-supplied argument is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    /// Build a [`Error::File`] for `path`.
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Legacy numeric result code of this error class.
    ///
    /// Front ends written against the integer result contract (`0` for
    /// success) map failures through this.
    pub fn code(&self) -> i32 {
        match self {
            Self::UsbInitFailed(_) => -1,
            Self::DeviceNotFound => -2,
            Self::ClaimInterfaceFailed(_) => -3,
            Self::Timeout(_) => -4,
            Self::Io(_) => -5,
            Self::File { .. } => -6,
            Self::Interrupted => -7,
            Self::InvalidParameter(_) => -8,
        }
    }
}

#[cfg(feature = "native")]
impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => Self::DeviceNotFound,
            serialport::ErrorKind::Io(kind) => Self::Io(io::Error::new(kind, err.description)),
            _ => Self::Io(io::Error::other(err.description)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_codes_are_distinct() {
        let errors = [
            Error::UsbInitFailed(String::new()),
            Error::DeviceNotFound,
            Error::ClaimInterfaceFailed(String::new()),
            Error::Timeout(String::new()),
            Error::Io(io::Error::other("x")),
            Error::file("a.bin", io::Error::other("x")),
            Error::Interrupted,
            Error::InvalidParameter(String::new()),
        ];
        let codes: Vec<i32> = errors.iter().map(Error::code).collect();
        assert_eq!(codes, vec![-1, -2, -3, -4, -5, -6, -7, -8]);
    }

    #[test]
    fn test_file_error_mentions_path() {
        let err = Error::file("dump.bin", io::Error::new(io::ErrorKind::NotFound, "missing"));
        let text = err.to_string();
        assert!(text.contains("dump.bin"));
        assert!(text.contains("missing"));
    }
}
