//! Trailing `0xFF` removal for ROM dumps.
//!
//! Erased flash reads as all ones, so reading a small cartridge with a large
//! size code leaves a tail of `0xFF`. The file is scanned backwards in
//! [`TRIM_BLOCK`]-byte blocks and truncated after the last other byte.

use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};

/// Block size of the backward scan.
pub const TRIM_BLOCK: usize = 4096;

/// Length of `reader` with trailing `0xFF` bytes removed.
///
/// Reads at most one block at a time, from the end towards the start.
pub fn trimmed_len<R: Read + Seek>(reader: &mut R) -> io::Result<u64> {
    let len = reader.seek(SeekFrom::End(0))?;
    let mut block = vec![0u8; TRIM_BLOCK];
    let mut end = len;

    while end > 0 {
        let start = end.saturating_sub(TRIM_BLOCK as u64);
        let n = (end - start) as usize;
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(&mut block[..n])?;

        if let Some(pos) = block[..n].iter().rposition(|&b| b != 0xFF) {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }

    Ok(0)
}

/// Outcome of [`trim_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trimmed {
    /// Length before trimming.
    pub original: u64,
    /// Length after trimming.
    pub len: u64,
}

impl Trimmed {
    /// Whether any padding was removed.
    pub fn removed_padding(&self) -> bool {
        self.len < self.original
    }
}

/// Truncate the file at `path` after its last non-`0xFF` byte.
///
/// Content before the cut is left untouched.
pub fn trim_file(path: &Path) -> Result<Trimmed> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| Error::file(path, e))?;

    let original = file
        .metadata()
        .map_err(|e| Error::file(path, e))?
        .len();
    let len = trimmed_len(&mut file).map_err(|e| Error::file(path, e))?;

    if len < original {
        file.set_len(len)
            .map_err(|e| Error::file(path, e))?;
        file.sync_all()
            .map_err(|e| Error::file(path, e))?;
        debug!("Trimmed {} from {original} to {len} bytes", path.display());
    }

    Ok(Trimmed { original, len })
}
