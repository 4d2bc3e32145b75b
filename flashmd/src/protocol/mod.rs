//! Wire protocol: command packets, size codes and response framing.

pub mod command;
pub mod framer;
pub mod size;

pub use command::{ChunkAddress, CommandPacket, MAGIC, Opcode, PACKET_SIZE, encode, send};
pub use framer::ResponseFramer;
pub use size::{SizeCode, kb_to_size_code, size_to_bytes};
