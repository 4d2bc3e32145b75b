//! Chunked transfer engine.
//!
//! Both directions move data in 1 KB chunks and check the interrupt flag at
//! every chunk boundary, never in the middle of one.
//!
//! Reads are streamed by the device at its own pace. The last
//! [`NEAR_END_CHUNKS`] chunks are read tolerantly because the dumper often
//! under-delivers right at the end of the stream; every earlier chunk must
//! arrive complete.
//!
//! Writes send each chunk raw, then a write command carrying a two-level
//! [`ChunkAddress`], then wait for a one-line acknowledgement.

use std::io::{self, Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::config::{Config, Timing};
use crate::error::{Error, Result};
use crate::interrupt::InterruptFlag;
use crate::port::Transport;
use crate::protocol::command::{self, ChunkAddress, CommandPacket};
use crate::protocol::framer::ResponseFramer;
use crate::protocol::size::{KB, SizeCode};

/// Transfer granularity in both directions.
pub const CHUNK_SIZE: usize = 1024;

/// Save RAM capacity.
pub const SRAM_SIZE: u32 = 32 * KB;

/// Number of trailing chunks read with the tolerant strategy.
pub const NEAR_END_CHUNKS: usize = 3;

/// Memory a transfer addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Cartridge flash.
    Rom,
    /// Battery-backed save RAM.
    Sram,
}

impl Target {
    /// Filler for the unused tail of the final write chunk.
    pub fn pad_byte(self) -> u8 {
        match self {
            Self::Rom => 0xFF,
            Self::Sram => 0x00,
        }
    }

    /// Largest image the target accepts.
    pub fn capacity(self) -> u64 {
        match self {
            Self::Rom => u64::from(SizeCode::Size8M.bytes()),
            Self::Sram => u64::from(SRAM_SIZE),
        }
    }

    /// Whether a missing write acknowledgement fails the transfer.
    ///
    /// The firmware does not reliably acknowledge save RAM writes.
    pub fn requires_ack(self) -> bool {
        matches!(self, Self::Rom)
    }

    /// Write command for `address`.
    pub fn write_packet(self, address: ChunkAddress) -> CommandPacket {
        match self {
            Self::Rom => CommandPacket::write_rom(address),
            Self::Sram => CommandPacket::write_sram(address),
        }
    }

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Rom => "ROM",
            Self::Sram => "SRAM",
        }
    }
}

/// Byte accounting and cancellation for one transfer.
#[derive(Debug)]
pub struct TransferSession {
    target: Target,
    total: u64,
    transferred: u64,
    chunk_size: usize,
    interrupt: InterruptFlag,
}

impl TransferSession {
    /// Start a session moving `total` bytes.
    pub fn new(target: Target, total: u64, interrupt: InterruptFlag) -> Self {
        Self {
            target,
            total,
            transferred: 0,
            chunk_size: CHUNK_SIZE,
            interrupt,
        }
    }

    /// Fail with [`Error::Interrupted`] if cancellation was requested.
    pub fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.is_set() {
            debug!(
                "{} transfer interrupted at {}/{}",
                self.target.name(),
                self.transferred,
                self.total
            );
            return Err(Error::Interrupted);
        }
        Ok(())
    }

    /// Account for `n` more bytes, never past the total. Returns the new
    /// running count.
    pub fn record(&mut self, n: u64) -> u64 {
        self.transferred = (self.transferred + n).min(self.total);
        self.transferred
    }

    /// Bytes still to go.
    pub fn remaining(&self) -> u64 {
        self.total - self.transferred
    }

    /// Bytes done so far.
    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Target byte count.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks needed for `total` bytes.
    pub fn chunk_count(&self) -> usize {
        self.total.div_ceil(self.chunk_size as u64) as usize
    }
}

/// What a ROM read asks of the device and what ends up on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPlan {
    /// Size code sent with the read command.
    pub size: SizeCode,
    /// Bytes the device will stream for that code.
    pub device_bytes: u64,
    /// Bytes kept in the output.
    pub total: u64,
    /// Pad a short stream with `0xFF` up to `total`.
    pub pad: bool,
}

impl ReadPlan {
    /// Plan a ROM read of `size_kb` kilobytes; `0` reads the full 4 MB and
    /// relies on trimming.
    pub fn rom(size_kb: u32, no_trim: bool) -> Self {
        if size_kb == 0 {
            let size = SizeCode::Size4M;
            let bytes = u64::from(size.bytes());
            return Self {
                size,
                device_bytes: bytes,
                total: bytes,
                pad: false,
            };
        }

        let size = SizeCode::from_kb(size_kb);
        let device_bytes = u64::from(size.bytes());
        Self {
            size,
            device_bytes,
            total: (u64::from(size_kb) * u64::from(KB)).min(device_bytes),
            pad: no_trim,
        }
    }

    /// Number of chunks the device streams.
    pub fn chunk_count(&self) -> usize {
        (self.device_bytes / CHUNK_SIZE as u64) as usize
    }
}

/// Chunk engine bound to one transport for one operation.
pub struct ChunkTransfer<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    timing: &'a Timing,
    config: &'a Config,
    interrupt: &'a InterruptFlag,
    path: Option<&'a Path>,
}

impl<'a, T: Transport + ?Sized> ChunkTransfer<'a, T> {
    /// Create an engine.
    pub fn new(
        transport: &'a mut T,
        timing: &'a Timing,
        config: &'a Config,
        interrupt: &'a InterruptFlag,
    ) -> Self {
        Self {
            transport,
            timing,
            config,
            interrupt,
            path: None,
        }
    }

    /// Label host-side I/O failures with `path`.
    #[must_use]
    pub fn with_path(mut self, path: &'a Path) -> Self {
        self.path = Some(path);
        self
    }

    fn file_error(&self, source: io::Error) -> Error {
        match self.path {
            Some(path) => Error::file(path, source),
            None => Error::Io(source),
        }
    }

    /// Receive a ROM stream into `out`.
    ///
    /// The read command and its preamble line must already have been
    /// exchanged. Returns the number of bytes written to `out`.
    pub fn read_rom<W: Write>(&mut self, plan: &ReadPlan, out: &mut W) -> Result<u64> {
        let mut session = TransferSession::new(Target::Rom, plan.total, self.interrupt.clone());
        let chunks = plan.chunk_count();
        let near_end_from = chunks.saturating_sub(NEAR_END_CHUNKS);
        let mut buf = vec![0u8; CHUNK_SIZE];

        debug!(
            "Reading {} chunks ({} code), keeping {} bytes",
            chunks, plan.size, plan.total
        );

        for index in 0..chunks {
            session.check_interrupt()?;

            let received = if index < near_end_from {
                ResponseFramer::new(&mut *self.transport, self.timing)
                    .read_binary(&mut buf, self.timing.chunk)?;
                CHUNK_SIZE
            } else {
                match self.read_tail_chunk(&mut buf, index, index + 1 == chunks)? {
                    Some(n) => n,
                    None => break,
                }
            };

            let keep = (received as u64).min(session.remaining()) as usize;
            out.write_all(&buf[..keep])
                .map_err(|e| self.file_error(e))?;
            let saved = session.record(keep as u64);
            trace!("Chunk {index}: {received} bytes, {saved}/{} saved", plan.total);
            self.config.progress(saved, plan.total);
        }
        session.check_interrupt()?;

        if plan.pad && session.remaining() > 0 {
            let missing = session.remaining();
            warn!("Stream ended {missing} bytes short, padding with 0xFF");
            buf.fill(0xFF);
            while session.remaining() > 0 {
                let n = session.remaining().min(CHUNK_SIZE as u64) as usize;
                out.write_all(&buf[..n])
                    .map_err(|e| self.file_error(e))?;
                session.record(n as u64);
            }
            self.config.progress(session.transferred(), plan.total);
        }

        out.flush()
            .map_err(|e| self.file_error(e))?;
        Ok(session.transferred())
    }

    /// Tolerant read of one of the final chunks.
    ///
    /// Returns `None` when the last chunk never arrived, which ends the
    /// stream without error.
    fn read_tail_chunk(
        &mut self,
        buf: &mut [u8],
        index: usize,
        is_last: bool,
    ) -> Result<Option<usize>> {
        let (deadline, grace) = if is_last {
            (self.timing.last_chunk, self.timing.last_grace)
        } else {
            (self.timing.near_end_chunk, self.timing.near_end_grace)
        };
        let poll = self.timing.poll_interval;

        let mut received = 0;
        let mut idle = Duration::ZERO;
        while received < buf.len() && idle < deadline {
            match self
                .transport
                .read(&mut buf[received..], poll)
            {
                Ok(0) => {
                    idle += poll;
                    if received > 0 && idle >= grace {
                        warn!("Chunk {index}: accepting {received} of {} bytes", buf.len());
                        break;
                    }
                },
                Ok(n) => {
                    received += n;
                    idle = Duration::ZERO;
                },
                Err(e) if is_last && idle < self.timing.last_chunk_error_budget => {
                    debug!("Chunk {index}: ignoring read error near end of stream: {e}");
                    idle += poll * 2;
                },
                Err(e) => return Err(e),
            }
        }

        if received > 0 {
            return Ok(Some(received));
        }
        if !is_last {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("no data for chunk {index}"),
            )));
        }

        thread::sleep(self.timing.last_chunk_pause);
        match self
            .transport
            .read(buf, self.timing.last_chunk_retry)
        {
            Ok(0) => {
                warn!("Last chunk empty, treating stream as complete");
                Ok(None)
            },
            Ok(n) => Ok(Some(n)),
            Err(e) => {
                debug!("Last chunk retry failed: {e}");
                Ok(None)
            },
        }
    }

    /// Receive the 32 KB save RAM stream into `out`.
    pub fn read_sram<W: Write>(&mut self, out: &mut W) -> Result<u64> {
        let total = u64::from(SRAM_SIZE);
        let mut session = TransferSession::new(Target::Sram, total, self.interrupt.clone());
        let mut buf = vec![0u8; CHUNK_SIZE];

        for index in 0..session.chunk_count() {
            session.check_interrupt()?;
            ResponseFramer::new(&mut *self.transport, self.timing)
                .read_binary(&mut buf, self.timing.chunk)?;
            out.write_all(&buf)
                .map_err(|e| self.file_error(e))?;
            let saved = session.record(CHUNK_SIZE as u64);
            trace!("SRAM chunk {index}: {saved}/{total}");
            self.config.progress(saved, total);
        }

        out.flush()
            .map_err(|e| self.file_error(e))?;
        Ok(session.transferred())
    }

    /// Send `total` bytes from `source` to `target`.
    ///
    /// The final partial chunk is padded with the target's pad byte.
    /// Returns the number of source bytes sent.
    pub fn write<R: Read>(&mut self, target: Target, source: &mut R, total: u64) -> Result<u64> {
        if total > target.capacity() {
            return Err(Error::InvalidParameter(format!(
                "{} image of {total} bytes exceeds {} bytes",
                target.name(),
                target.capacity()
            )));
        }

        let mut session = TransferSession::new(target, total, self.interrupt.clone());
        let mut address = ChunkAddress::default();
        let mut chunk = vec![0u8; CHUNK_SIZE];

        debug!(
            "Writing {total} bytes to {} in {} chunks",
            target.name(),
            session.chunk_count()
        );

        while session.remaining() > 0 {
            session.check_interrupt()?;

            let len = session
                .remaining()
                .min(CHUNK_SIZE as u64) as usize;
            chunk.fill(target.pad_byte());
            source
                .read_exact(&mut chunk[..len])
                .map_err(|e| self.file_error(e))?;

            self.transport.write(&chunk)?;
            thread::sleep(self.timing.write_delay);
            command::send(&mut *self.transport, &target.write_packet(address))?;

            match ResponseFramer::new(&mut *self.transport, self.timing)
                .read_response(self.timing.write_ack)
            {
                Ok(ack) => {
                    trace!("{}", ack.trim_end());
                    if self.config.verbose {
                        self.config.emit_filtered(&ack);
                    }
                },
                Err(Error::Timeout(_)) if !target.requires_ack() => {
                    debug!("No acknowledgement for {address:?}, continuing");
                },
                Err(Error::Timeout(_)) => {
                    return Err(Error::Timeout(format!(
                        "no acknowledgement for chunk addj {} bank {}",
                        address.addj, address.bank
                    )));
                },
                Err(e) => return Err(e),
            }

            let done = session.record(len as u64);
            self.config.progress(done, total);
            address = address.next();
        }

        Ok(session.transferred())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::MockTransport;
    use crate::sink::recording::RecordingSink;
    use std::io::Cursor;
    use std::sync::Arc;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| (i % 251) as u8)
            .collect()
    }

    fn start(mock: &mut MockTransport, packet: &CommandPacket, timing: &Timing) {
        command::send(mock, packet).unwrap();
        ResponseFramer::new(mock, timing)
            .read_response(timing.line_ack)
            .unwrap();
    }

    fn setup() -> (Timing, Arc<RecordingSink>, Config, InterruptFlag) {
        let sink = Arc::new(RecordingSink::default());
        let config = Config::new().with_sink(sink.clone());
        (Timing::without_delays(), sink, config, InterruptFlag::new())
    }

    #[test]
    fn test_plan_auto_detect_reads_4m() {
        let plan = ReadPlan::rom(0, true);
        assert_eq!(plan.size, SizeCode::Size4M);
        assert_eq!(plan.device_bytes, 4 * 1024 * 1024);
        assert_eq!(plan.total, plan.device_bytes);
        assert!(!plan.pad);
    }

    #[test]
    fn test_plan_clips_to_request() {
        let plan = ReadPlan::rom(300, false);
        assert_eq!(plan.size, SizeCode::Size512K);
        assert_eq!(plan.total, 300 * 1024);
        assert_eq!(plan.chunk_count(), 512);

        let plan = ReadPlan::rom(10_000, true);
        assert_eq!(plan.size, SizeCode::Size8M);
        assert_eq!(plan.total, 8 * 1024 * 1024);
        assert!(plan.pad);
    }

    #[test]
    fn test_session_record_is_clamped() {
        let mut session = TransferSession::new(Target::Rom, 1500, InterruptFlag::new());
        assert_eq!(session.chunk_count(), 2);
        assert_eq!(session.record(1024), 1024);
        assert_eq!(session.record(1024), 1500);
        assert_eq!(session.remaining(), 0);
    }

    #[test]
    fn test_session_interrupt() {
        let flag = InterruptFlag::new();
        let session = TransferSession::new(Target::Sram, 10, flag.clone());
        assert!(session.check_interrupt().is_ok());
        flag.set();
        assert!(matches!(session.check_interrupt(), Err(Error::Interrupted)));
    }

    #[test]
    fn test_read_clips_to_requested_total() {
        let rom = pattern(512 * 1024);
        let mut mock = MockTransport::with_rom(rom.clone());
        let (timing, sink, config, interrupt) = setup();
        let plan = ReadPlan::rom(300, false);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        let saved = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out)
            .unwrap();

        assert_eq!(saved, 300 * 1024);
        assert_eq!(out, rom[..300 * 1024]);
        let progress = sink.progress();
        assert_eq!(progress.len(), 512);
        assert_eq!(progress.last(), Some(&(300 * 1024, 300 * 1024)));
    }

    #[test]
    fn test_read_full_device_matches_device_bytes() {
        let rom = pattern(1024 * 1024);
        let mut mock = MockTransport::with_rom(rom.clone());
        let (timing, sink, config, interrupt) = setup();
        let plan = ReadPlan::rom(1024, false);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out)
            .unwrap();

        assert_eq!(out, rom);
        // Each report grows by exactly one chunk.
        let progress = sink.progress();
        assert!(
            progress
                .windows(2)
                .all(|w| w[1].0 - w[0].0 == CHUNK_SIZE as u64)
        );
    }

    #[test]
    fn test_missing_last_chunk_completes_and_pads() {
        let mut mock = MockTransport::with_rom(pattern(512 * 1024));
        mock.rom_stream_limit = Some(511 * 1024);
        mock.trailer = false;
        let (timing, _sink, config, interrupt) = setup();
        let plan = ReadPlan::rom(512, true);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        let saved = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out)
            .unwrap();

        assert_eq!(saved, 512 * 1024);
        assert_eq!(out.len(), 512 * 1024);
        assert!(out[511 * 1024..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_missing_last_chunk_without_padding() {
        let mut mock = MockTransport::with_rom(pattern(512 * 1024));
        mock.rom_stream_limit = Some(511 * 1024);
        mock.trailer = false;
        let (timing, _sink, config, interrupt) = setup();
        let plan = ReadPlan::rom(512, false);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        let saved = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out)
            .unwrap();
        assert_eq!(saved, 511 * 1024);
    }

    #[test]
    fn test_partial_last_chunk_is_accepted() {
        let rom = pattern(512 * 1024);
        let mut mock = MockTransport::with_rom(rom.clone());
        mock.rom_stream_limit = Some(512 * 1024 - 300);
        mock.trailer = false;
        let (timing, _sink, config, interrupt) = setup();
        let plan = ReadPlan::rom(512, false);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out)
            .unwrap();
        assert_eq!(out, rom[..512 * 1024 - 300]);
    }

    #[test]
    fn test_slow_last_chunk_still_arrives() {
        let rom = pattern(512 * 1024);
        let mut mock = MockTransport::with_rom(rom.clone());
        mock.stall_before_last = 200;
        let (timing, _sink, config, interrupt) = setup();
        let plan = ReadPlan::rom(512, false);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out)
            .unwrap();
        assert_eq!(out, rom);
    }

    #[test]
    fn test_last_chunk_arrives_on_retry() {
        let rom = pattern(512 * 1024);
        let mut mock = MockTransport::with_rom(rom.clone());
        let (timing, _sink, config, interrupt) = setup();
        // Outlast the last-chunk deadline so only the retry read sees the data.
        let polls = timing
            .last_chunk
            .as_nanos()
            .div_ceil(timing.poll_interval.as_nanos());
        mock.stall_before_last = polls as usize;
        mock.trailer = false;
        let plan = ReadPlan::rom(512, false);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        let saved = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out)
            .unwrap();
        assert_eq!(saved, 512 * 1024);
        assert_eq!(out, rom);
    }

    #[test]
    fn test_last_chunk_read_errors_within_budget_are_tolerated() {
        let rom = pattern(512 * 1024);
        let mut mock = MockTransport::with_rom(rom.clone());
        mock.faults_before_last = 3;
        let (timing, _sink, config, interrupt) = setup();
        let plan = ReadPlan::rom(512, false);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out)
            .unwrap();
        assert_eq!(out, rom);
    }

    #[test]
    fn test_last_chunk_read_errors_beyond_budget_fail() {
        let mut mock = MockTransport::with_rom(pattern(512 * 1024));
        let (timing, _sink, config, interrupt) = setup();
        // Each tolerated error costs two polls of the budget.
        let tolerated = timing
            .last_chunk_error_budget
            .as_nanos()
            .div_ceil((timing.poll_interval * 2).as_nanos());
        mock.faults_before_last = tolerated as usize + 1;
        let plan = ReadPlan::rom(512, false);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        let result = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out);
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(out.len(), 511 * CHUNK_SIZE);
    }

    #[test]
    fn test_empty_near_end_chunk_before_last_is_io_error() {
        let mut mock = MockTransport::with_rom(pattern(512 * 1024));
        mock.rom_stream_limit = Some(509 * 1024);
        mock.trailer = false;
        let (timing, _sink, config, interrupt) = setup();
        let plan = ReadPlan::rom(512, true);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        let result = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out);
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(out.len(), 509 * CHUNK_SIZE);
    }

    #[test]
    fn test_interrupt_during_last_chunk_is_reported() {
        let mut mock = MockTransport::with_rom(pattern(512 * 1024));
        let timing = Timing::without_delays();
        let interrupt = InterruptFlag::new();
        let sink = Arc::new(RecordingSink::interrupting_at(
            512 * CHUNK_SIZE as u64,
            interrupt.clone(),
        ));
        let config = Config::new().with_sink(sink);
        let plan = ReadPlan::rom(512, false);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        let result = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out);
        assert!(matches!(result, Err(Error::Interrupted)));
        assert_eq!(out.len(), 512 * CHUNK_SIZE);
    }

    #[test]
    fn test_ordinary_chunk_failure_aborts() {
        let mut mock = MockTransport::with_rom(pattern(512 * 1024));
        mock.fail_at_chunk = Some(5);
        let (timing, _sink, config, interrupt) = setup();
        let plan = ReadPlan::rom(512, false);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        let result = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out);
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(out.len(), 5 * CHUNK_SIZE);
    }

    #[test]
    fn test_read_interrupt_stops_at_chunk_boundary() {
        let mut mock = MockTransport::with_rom(pattern(512 * 1024));
        let timing = Timing::without_delays();
        let interrupt = InterruptFlag::new();
        let sink = Arc::new(RecordingSink::interrupting_at(
            10 * CHUNK_SIZE as u64,
            interrupt.clone(),
        ));
        let config = Config::new().with_sink(sink);
        let plan = ReadPlan::rom(512, false);
        start(&mut mock, &CommandPacket::read_rom(plan.size), &timing);

        let mut out = Vec::new();
        let result = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_rom(&plan, &mut out);
        assert!(matches!(result, Err(Error::Interrupted)));
        assert_eq!(out.len(), 10 * CHUNK_SIZE);
    }

    #[test]
    fn test_read_sram_strict() {
        let mut mock = MockTransport::new();
        mock.sram = pattern(SRAM_SIZE as usize);
        let (timing, _sink, config, interrupt) = setup();
        start(&mut mock, &CommandPacket::read_sram(), &timing);

        let mut out = Vec::new();
        let saved = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .read_sram(&mut out)
            .unwrap();
        assert_eq!(saved, u64::from(SRAM_SIZE));
        assert_eq!(out, mock.sram);
    }

    #[test]
    fn test_write_addressing_rolls_banks() {
        let data = pattern(130 * CHUNK_SIZE);
        let mut mock = MockTransport::new();
        let (timing, sink, config, interrupt) = setup();

        let sent = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .write(Target::Rom, &mut Cursor::new(&data), data.len() as u64)
            .unwrap();
        assert_eq!(sent, data.len() as u64);

        let expected: Vec<(u8, u8)> = (0..130u32)
            .map(|i| ((i % 64) as u8, (i / 64) as u8))
            .collect();
        assert_eq!(mock.write_addresses(), expected);
        assert_eq!(&expected[..3], &[(0, 0), (1, 0), (2, 0)]);
        assert_eq!(&expected[63..66], &[(63, 0), (0, 1), (1, 1)]);
        assert_eq!(&expected[128..], &[(0, 2), (1, 2)]);

        assert_eq!(mock.flashed, data);
        assert_eq!(sink.progress().len(), 130);
    }

    #[test]
    fn test_write_pads_final_rom_chunk_with_ff() {
        let data = pattern(1500);
        let mut mock = MockTransport::new();
        let (timing, sink, config, interrupt) = setup();

        ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .write(Target::Rom, &mut Cursor::new(&data), 1500)
            .unwrap();

        assert_eq!(mock.chunks.len(), 2);
        assert!(mock.chunks.iter().all(|c| c.len() == CHUNK_SIZE));
        assert_eq!(&mock.chunks[1][..476], &data[1024..]);
        assert!(mock.chunks[1][476..].iter().all(|&b| b == 0xFF));
        assert_eq!(sink.progress().last(), Some(&(1500, 1500)));
    }

    #[test]
    fn test_write_sram_pads_zero_and_tolerates_missing_ack() {
        let data = pattern(100);
        let mut mock = MockTransport::new();
        mock.ack_sram_writes = false;
        let (timing, _sink, config, interrupt) = setup();

        ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .write(Target::Sram, &mut Cursor::new(&data), 100)
            .unwrap();

        assert!(mock.chunks[0][100..].iter().all(|&b| b == 0x00));
        assert_eq!(&mock.sram_written[..100], &data[..]);
    }

    #[test]
    fn test_write_rom_missing_ack_is_timeout() {
        let data = pattern(2048);
        let mut mock = MockTransport::new();
        mock.ack_rom_writes = false;
        let (timing, _sink, config, interrupt) = setup();

        let result = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt).write(
            Target::Rom,
            &mut Cursor::new(&data),
            2048,
        );
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(mock.chunks.len(), 1);
    }

    #[test]
    fn test_write_rejects_oversized_image() {
        let mut mock = MockTransport::new();
        let (timing, _sink, config, interrupt) = setup();

        let result = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt).write(
            Target::Sram,
            &mut Cursor::new(Vec::new()),
            u64::from(SRAM_SIZE) + 1,
        );
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(mock.chunks.is_empty());
    }

    #[test]
    fn test_write_short_source_is_file_error() {
        let data = pattern(10);
        let mut mock = MockTransport::new();
        let (timing, _sink, config, interrupt) = setup();
        let path = Path::new("game.bin");

        let result = ChunkTransfer::new(&mut mock, &timing, &config, &interrupt)
            .with_path(path)
            .write(Target::Rom, &mut Cursor::new(&data), 2048);
        assert!(matches!(result, Err(Error::File { .. })));
    }
}
