//! Simulated dumper for unit tests.
//!
//! The mock answers each command packet the way the firmware does, queuing
//! reply segments that are delivered one bulk packet at a time: a read never
//! crosses a segment boundary, and an empty queue reads as a poll timeout.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::port::Transport;
use crate::protocol::command::{CommandPacket, MAGIC, Opcode, PACKET_SIZE, PARAMS_OFFSET};
use crate::protocol::size::SizeCode;
use crate::transfer::{CHUNK_SIZE, SRAM_SIZE};

#[derive(Debug)]
enum Segment {
    Data(Vec<u8>),
    Silence(usize),
    Fail,
}

pub(crate) struct MockTransport {
    /// Flash contents; reads beyond it return erased bytes.
    pub rom: Vec<u8>,
    /// Save RAM contents.
    pub sram: Vec<u8>,
    /// Answer the connect command.
    pub connect_reply: Option<String>,
    /// Acknowledge ROM chunk writes.
    pub ack_rom_writes: bool,
    /// Acknowledge save RAM chunk writes.
    pub ack_sram_writes: bool,
    /// Report erase completion.
    pub erase_ok: bool,
    /// Cap on the number of ROM dump bytes streamed.
    pub rom_stream_limit: Option<usize>,
    /// Empty polls inserted before the last streamed ROM segment.
    pub stall_before_last: usize,
    /// Failed reads inserted before the last streamed ROM segment.
    pub faults_before_last: usize,
    /// Fail the read following an erase completion marker.
    pub fail_after_erase: bool,
    /// Send the dump trailer lines.
    pub trailer: bool,
    /// Fail the transport read that would deliver ROM chunk `n`.
    pub fail_at_chunk: Option<usize>,

    pending: VecDeque<Segment>,
    last_chunk: Option<Vec<u8>>,
    /// Every command packet received.
    pub packets: Vec<CommandPacket>,
    /// Every data chunk received.
    pub chunks: Vec<Vec<u8>>,
    /// Bytes programmed through write commands, indexed by address.
    pub flashed: Vec<u8>,
    /// Bytes stored through save RAM write commands.
    pub sram_written: Vec<u8>,
    pub closed: bool,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            rom: Vec::new(),
            sram: vec![0; SRAM_SIZE as usize],
            connect_reply: Some("FlashMaster MD Dumper is connected\r\n".to_string()),
            ack_rom_writes: true,
            ack_sram_writes: true,
            erase_ok: true,
            rom_stream_limit: None,
            stall_before_last: 0,
            faults_before_last: 0,
            fail_after_erase: false,
            trailer: true,
            fail_at_chunk: None,
            pending: VecDeque::new(),
            last_chunk: None,
            packets: Vec::new(),
            chunks: Vec::new(),
            flashed: Vec::new(),
            sram_written: Vec::new(),
            closed: false,
        }
    }
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_rom(rom: Vec<u8>) -> Self {
        Self {
            rom,
            ..Self::default()
        }
    }

    /// Opcodes in the order they were received.
    pub(crate) fn opcodes(&self) -> Vec<Opcode> {
        self.packets
            .iter()
            .filter_map(CommandPacket::opcode)
            .collect()
    }

    /// Write addresses `(addj, bank)` in the order they were received.
    pub(crate) fn write_addresses(&self) -> Vec<(u8, u8)> {
        self.packets
            .iter()
            .filter(|p| matches!(p.opcode(), Some(Opcode::WriteRom | Opcode::WriteSram)))
            .map(|p| (p.params()[0], p.params()[1]))
            .collect()
    }

    fn text(&mut self, text: &str) {
        self.pending
            .push_back(Segment::Data(text.as_bytes().to_vec()));
    }

    fn stream_rom(&mut self, size: SizeCode) {
        let device_bytes = size.bytes() as usize;
        self.text(&format!("{size} ROM DUMP START!!!\r\n"));

        let mut image = vec![0xFF; device_bytes];
        let n = self.rom.len().min(device_bytes);
        image[..n].copy_from_slice(&self.rom[..n]);
        image.truncate(
            self.rom_stream_limit
                .unwrap_or(device_bytes)
                .min(device_bytes),
        );

        let chunks: Vec<Vec<u8>> = image
            .chunks(CHUNK_SIZE)
            .map(<[u8]>::to_vec)
            .collect();
        let count = chunks.len();
        for (i, chunk) in chunks.into_iter().enumerate() {
            if self.fail_at_chunk == Some(i) {
                self.pending.push_back(Segment::Fail);
            }
            if i + 1 == count {
                for _ in 0..self.faults_before_last {
                    self.pending.push_back(Segment::Fail);
                }
                if self.stall_before_last > 0 {
                    self.pending
                        .push_back(Segment::Silence(self.stall_before_last));
                }
            }
            self.pending.push_back(Segment::Data(chunk));
        }

        if self.trailer {
            self.text("DUMPER ROM FINISH!!!\r\n");
            self.text("PUSH SAVE GAME BUTTON!!!\r\n");
        }
    }

    fn stream_sram(&mut self) {
        self.text("32K RAM DUMP START!!!\r\n");
        let sram = self.sram.clone();
        for chunk in sram.chunks(CHUNK_SIZE) {
            self.pending
                .push_back(Segment::Data(chunk.to_vec()));
        }
        if self.trailer {
            self.text("DUMPER RAM FINISH!!!\r\n");
        }
    }

    fn erase_trailer(&mut self) {
        if self.fail_after_erase {
            self.pending.push_back(Segment::Fail);
        }
    }

    fn store_chunk(target: &mut Vec<u8>, chunk: &[u8], addj: u8, bank: u8) -> usize {
        let offset = (usize::from(bank) * 64 + usize::from(addj)) * CHUNK_SIZE;
        if target.len() < offset + chunk.len() {
            target.resize(offset + chunk.len(), 0xFF);
        }
        target[offset..offset + chunk.len()].copy_from_slice(chunk);
        offset
    }

    fn handle_packet(&mut self, packet: CommandPacket) {
        let params = packet.params().to_vec();
        match packet.opcode() {
            Some(Opcode::Connect) => {
                if let Some(reply) = self.connect_reply.clone() {
                    self.text(&reply);
                }
            },
            Some(Opcode::CheckId) => {
                self.text("Manufacturer ID: 0xC2\r\n");
                self.text("Device ID: 0x22C9\r\n");
            },
            Some(Opcode::ClearBuffer) => self.text("BUFF IS CLEAR\r\n"),
            Some(Opcode::ReadRom) => {
                let size = SizeCode::ALL
                    .into_iter()
                    .find(|c| c.code() == params[0])
                    .unwrap_or(SizeCode::Size4M);
                self.stream_rom(size);
            },
            Some(Opcode::ReadSram) => self.stream_sram(),
            Some(Opcode::WriteRom) => {
                let chunk = self.last_chunk.take().unwrap_or_default();
                let offset = Self::store_chunk(&mut self.flashed, &chunk, params[0], params[1]);
                if self.ack_rom_writes {
                    self.text(&format!("ADD:0x{offset:X} WRITE OK\r\n"));
                }
            },
            Some(Opcode::WriteSram) => {
                let chunk = self.last_chunk.take().unwrap_or_default();
                let offset =
                    Self::store_chunk(&mut self.sram_written, &chunk, params[0], params[1]);
                if self.ack_sram_writes {
                    self.text(&format!("ADD:0x{offset:X} WRITE GK\r\n"));
                }
            },
            Some(Opcode::FullErase) => {
                self.text("SRAM ERASE START!!!\r\n");
                if self.erase_ok {
                    self.text("SRAM ERASE FINISH!!!\r\n");
                    self.erase_trailer();
                }
            },
            Some(Opcode::SectorErase) => {
                if self.erase_ok {
                    self.text("\r\n4M ERASE OK!\r\n");
                    self.erase_trailer();
                }
            },
            Some(Opcode::SectorEraseAt) => {
                let address = (u32::from(params[0]) << 16)
                    | (u32::from(params[1]) << 8)
                    | u32::from(params[2]);
                if self.erase_ok {
                    self.text(&format!("SECTORADD:0x{address:X} ERASE OK!\r\n"));
                    self.erase_trailer();
                }
            },
            None => {},
        }
        self.packets.push(packet);
    }
}

impl Transport for MockTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "closed",
            )));
        }
        if data.len() == PACKET_SIZE && data[1..PARAMS_OFFSET] == MAGIC {
            let opcode = Opcode::from_byte(data[0]);
            let packet = match opcode {
                Some(op) => CommandPacket::encode(op, &data[PARAMS_OFFSET..]),
                None => return Ok(data.len()),
            };
            self.handle_packet(packet);
        } else {
            self.chunks.push(data.to_vec());
            self.last_chunk = Some(data.to_vec());
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        match self.pending.pop_front() {
            None => Ok(0),
            Some(Segment::Fail) => Err(Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "endpoint stalled",
            ))),
            Some(Segment::Silence(n)) => {
                if n > 1 {
                    self.pending
                        .push_front(Segment::Silence(n - 1));
                }
                Ok(0)
            },
            Some(Segment::Data(mut data)) => {
                let n = buf.len().min(data.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    self.pending
                        .push_front(Segment::Data(rest));
                }
                Ok(n)
            },
        }
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
