//! Command packet codec.
//!
//! Every command is a fixed 64-byte packet:
//!
//! ```text
//! +--------+---------------------+---------------------------+
//! | Opcode |        Magic        |   Parameters (zero pad)   |
//! +--------+---------------------+---------------------------+
//! |   1    |          4          |            59             |
//! +--------+---------------------+---------------------------+
//! |  cmd   | AA 55 AA BB         | size code / addj,bank /   |
//! |        |                     | 24-bit BE address         |
//! +--------+---------------------+---------------------------+
//! ```
//!
//! The firmware ignores any packet whose magic does not match, which keeps
//! stray bytes on the virtual serial line from being taken as commands.

use byteorder::{BigEndian, WriteBytesExt};
use log::trace;

use crate::error::{Error, Result};
use crate::port::Transport;
use crate::protocol::size::SizeCode;

/// Total packet length.
pub const PACKET_SIZE: usize = 64;

/// Magic bytes following the opcode.
pub const MAGIC: [u8; 4] = [0xAA, 0x55, 0xAA, 0xBB];

/// Offset of the first parameter byte.
pub const PARAMS_OFFSET: usize = 1 + MAGIC.len();

/// Maximum number of parameter bytes a packet can carry.
pub const MAX_PARAMS: usize = PACKET_SIZE - PARAMS_OFFSET;

/// Largest address the 24-bit sector erase command can carry.
pub const MAX_ERASE_ADDRESS: u32 = 0x00FF_FFFF;

/// Number of write chunks per bank.
pub const CHUNKS_PER_BANK: u8 = 64;

/// Device opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Stream the ROM for a size code.
    ReadRom = 0x0A,
    /// Program the previously sent 1 KB chunk into flash.
    WriteRom = 0x0B,
    /// Ping; the device answers with a "connected" line.
    Connect = 0x0C,
    /// Print the flash chip identity.
    CheckId = 0x0D,
    /// Erase the whole chip.
    FullErase = 0x0E,
    /// Reset the device's receive buffer and bank counter.
    ClearBuffer = 0x0F,
    /// Stream the save RAM.
    ReadSram = 0x1A,
    /// Store the previously sent 1 KB chunk into save RAM.
    WriteSram = 0x1B,
    /// Erase the sectors covering a size code.
    SectorErase = 0x1E,
    /// Erase the single sector containing a 24-bit address.
    SectorEraseAt = 0x2E,
}

impl Opcode {
    /// Decode an opcode byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x0A => Self::ReadRom,
            0x0B => Self::WriteRom,
            0x0C => Self::Connect,
            0x0D => Self::CheckId,
            0x0E => Self::FullErase,
            0x0F => Self::ClearBuffer,
            0x1A => Self::ReadSram,
            0x1B => Self::WriteSram,
            0x1E => Self::SectorErase,
            0x2E => Self::SectorEraseAt,
            _ => return None,
        })
    }
}

/// Two-level write address: chunk offset within a bank, and bank number.
///
/// Mirrors the device's page/bank layout: `addj` counts 0..64 and rolls
/// over into `bank`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkAddress {
    /// Chunk offset within the bank (0..64).
    pub addj: u8,
    /// Bank number.
    pub bank: u8,
}

impl ChunkAddress {
    /// Address of the chunk that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        if self.addj + 1 >= CHUNKS_PER_BANK {
            Self {
                addj: 0,
                bank: self.bank.wrapping_add(1),
            }
        } else {
            Self {
                addj: self.addj + 1,
                bank: self.bank,
            }
        }
    }

    /// Wire parameters: `[addj, bank]`.
    pub fn to_params(self) -> [u8; 2] {
        [self.addj, self.bank]
    }
}

/// A fully encoded 64-byte command.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandPacket([u8; PACKET_SIZE]);

impl CommandPacket {
    /// Encode `opcode` with `params`.
    ///
    /// Parameters beyond [`MAX_PARAMS`] bytes are dropped.
    pub fn encode(opcode: Opcode, params: &[u8]) -> Self {
        let mut packet = [0u8; PACKET_SIZE];
        packet[0] = opcode as u8;
        packet[1..PARAMS_OFFSET].copy_from_slice(&MAGIC);

        let len = params.len().min(MAX_PARAMS);
        packet[PARAMS_OFFSET..PARAMS_OFFSET + len].copy_from_slice(&params[..len]);

        Self(packet)
    }

    /// Connect/ping command.
    pub fn connect() -> Self {
        Self::encode(Opcode::Connect, &[])
    }

    /// Chip identity command.
    pub fn check_id() -> Self {
        Self::encode(Opcode::CheckId, &[])
    }

    /// Clear-buffer command.
    pub fn clear_buffer() -> Self {
        Self::encode(Opcode::ClearBuffer, &[])
    }

    /// Whole-chip erase command.
    pub fn full_erase() -> Self {
        Self::encode(Opcode::FullErase, &[])
    }

    /// Sized erase command.
    pub fn sector_erase(size: SizeCode) -> Self {
        Self::encode(Opcode::SectorErase, &[size.code()])
    }

    /// Erase the sector containing `address`.
    pub fn sector_erase_at(address: u32) -> Result<Self> {
        if address > MAX_ERASE_ADDRESS {
            return Err(Error::InvalidParameter(format!(
                "erase address 0x{address:X} exceeds 24 bits"
            )));
        }
        let mut params = Vec::with_capacity(3);
        params.write_u24::<BigEndian>(address)?;
        Ok(Self::encode(Opcode::SectorEraseAt, &params))
    }

    /// ROM dump command for a size code.
    pub fn read_rom(size: SizeCode) -> Self {
        Self::encode(Opcode::ReadRom, &[size.code()])
    }

    /// 32 KB save RAM dump command.
    pub fn read_sram() -> Self {
        Self::encode(Opcode::ReadSram, &[0x01])
    }

    /// Program-chunk command.
    pub fn write_rom(address: ChunkAddress) -> Self {
        Self::encode(Opcode::WriteRom, &address.to_params())
    }

    /// Store-chunk-to-save-RAM command.
    pub fn write_sram(address: ChunkAddress) -> Self {
        Self::encode(Opcode::WriteSram, &address.to_params())
    }

    /// Raw packet bytes.
    pub fn as_bytes(&self) -> &[u8; PACKET_SIZE] {
        &self.0
    }

    /// Opcode of this packet.
    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_byte(self.0[0])
    }

    /// Parameter area (always [`MAX_PARAMS`] bytes, zero padded).
    pub fn params(&self) -> &[u8] {
        &self.0[PARAMS_OFFSET..]
    }
}

impl std::fmt::Debug for CommandPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self
            .params()
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        f.debug_struct("CommandPacket")
            .field("opcode", &format_args!("0x{:02X}", self.0[0]))
            .field("params", &&self.params()[..used])
            .finish()
    }
}

/// Encode `opcode` with `params` into a 64-byte packet.
pub fn encode(opcode: Opcode, params: &[u8]) -> CommandPacket {
    CommandPacket::encode(opcode, params)
}

/// Write a packet to the transport.
///
/// Returns the transport's write result unchanged; no retry is attempted.
pub fn send<T: Transport + ?Sized>(transport: &mut T, packet: &CommandPacket) -> Result<usize> {
    trace!("Sending {packet:?}");
    transport.write(packet.as_bytes())
}
