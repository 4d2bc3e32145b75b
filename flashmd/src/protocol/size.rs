//! Size codes understood by the dumper.

use std::fmt;

/// One kilobyte.
pub const KB: u32 = 1024;

/// Device-recognized capacity codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SizeCode {
    /// 512 KB.
    Size512K = 0x01,
    /// 1 MB.
    Size1M = 0x02,
    /// 2 MB.
    Size2M = 0x03,
    /// 4 MB.
    Size4M = 0x04,
    /// 8 MB.
    Size8M = 0x05,
}

impl SizeCode {
    /// All codes in ascending capacity.
    pub const ALL: [Self; 5] = [
        Self::Size512K,
        Self::Size1M,
        Self::Size2M,
        Self::Size4M,
        Self::Size8M,
    ];

    /// Smallest code covering `kb` kilobytes; anything past 4096 KB is 8M.
    #[must_use]
    pub fn from_kb(kb: u32) -> Self {
        match kb {
            0..=512 => Self::Size512K,
            513..=1024 => Self::Size1M,
            1025..=2048 => Self::Size2M,
            2049..=4096 => Self::Size4M,
            _ => Self::Size8M,
        }
    }

    /// Byte capacity of this code.
    #[must_use]
    pub fn bytes(self) -> u32 {
        self.kilobytes() * KB
    }

    /// Kilobyte capacity of this code.
    #[must_use]
    pub fn kilobytes(self) -> u32 {
        match self {
            Self::Size512K => 512,
            Self::Size1M => 1024,
            Self::Size2M => 2048,
            Self::Size4M => 4096,
            Self::Size8M => 8192,
        }
    }

    /// Wire value.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SizeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Size512K => write!(f, "512K"),
            Self::Size1M => write!(f, "1M"),
            Self::Size2M => write!(f, "2M"),
            Self::Size4M => write!(f, "4M"),
            Self::Size8M => write!(f, "8M"),
        }
    }
}

/// Map a kilobyte request to its size code.
pub fn kb_to_size_code(kb: u32) -> SizeCode {
    SizeCode::from_kb(kb)
}

/// Byte count of a size code.
pub fn size_to_bytes(code: SizeCode) -> u32 {
    code.bytes()
}
