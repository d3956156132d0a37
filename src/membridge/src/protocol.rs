//! Wire layout shared by the bridge and its callers.
//!
//! Every integer is little-endian and structures are packed, so both sides of
//! the privilege boundary agree byte for byte.

use mem::Addr;
use platform::ProcessId;

use crate::status::{Completion, Status};

pub const DEVICE_TYPE: u32 = 0x8000;
pub const METHOD_BUFFERED: u32 = 0;
pub const FILE_READ_ACCESS: u32 = 0x1;
pub const FILE_WRITE_ACCESS: u32 = 0x2;

/// Packs an operation selector the way device-control codes are laid out.
pub const fn control_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

/// The only operation the bridge serves.
pub const OP_COPY_MEMORY: u32 = control_code(
    DEVICE_TYPE,
    0x808,
    METHOD_BUFFERED,
    FILE_READ_ACCESS | FILE_WRITE_ACCESS,
);

/// A copy between the caller and one other process.
///
/// ```text
/// offset 0  : u64 source
/// offset 8  : u64 target
/// offset 16 : u64 size
/// offset 24 : u32 process_id
/// offset 28 : u8  write (0 = read, nonzero = write)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyRequest {
    pub source: Addr,
    pub target: Addr,
    pub size: u64,
    pub process_id: ProcessId,
    pub write: bool,
}

impl CopyRequest {
    pub const SIZE: usize = 29;

    /// Decodes the request from the prefix of `buf`. Trailing bytes are
    /// ignored; a short buffer yields `None`.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let raw = buf.get(..Self::SIZE)?;
        let u64_at = |off: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&raw[off..off + 8]);
            u64::from_le_bytes(b)
        };
        let mut pid = [0u8; 4];
        pid.copy_from_slice(&raw[24..28]);
        Some(Self {
            source: Addr(u64_at(0)),
            target: Addr(u64_at(8)),
            size: u64_at(16),
            process_id: u32::from_le_bytes(pid),
            write: raw[28] != 0,
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.source.0.to_le_bytes());
        buf[8..16].copy_from_slice(&self.target.0.to_le_bytes());
        buf[16..24].copy_from_slice(&self.size.to_le_bytes());
        buf[24..28].copy_from_slice(&self.process_id.to_le_bytes());
        buf[28] = self.write as u8;
        buf
    }
}

pub const FRAME_HEADER_SIZE: usize = 8;
pub const REPLY_SIZE: usize = 12;

/// Precedes every request payload on a stream: `u32 opcode | u32 length`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: u32,
    pub length: u32,
}

impl FrameHeader {
    pub fn decode(buf: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let mut opcode = [0u8; 4];
        let mut length = [0u8; 4];
        opcode.copy_from_slice(&buf[0..4]);
        length.copy_from_slice(&buf[4..8]);
        Self {
            opcode: u32::from_le_bytes(opcode),
            length: u32::from_le_bytes(length),
        }
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.opcode.to_le_bytes());
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf
    }
}

/// Reply layout: `u32 status | u64 information`.
pub fn encode_reply(completion: &Completion) -> [u8; REPLY_SIZE] {
    let mut buf = [0u8; REPLY_SIZE];
    buf[0..4].copy_from_slice(&completion.status.code().to_le_bytes());
    buf[4..12].copy_from_slice(&completion.information.to_le_bytes());
    buf
}

pub fn decode_reply(buf: &[u8; REPLY_SIZE]) -> Option<Completion> {
    let mut status = [0u8; 4];
    let mut information = [0u8; 8];
    status.copy_from_slice(&buf[0..4]);
    information.copy_from_slice(&buf[4..12]);
    Some(Completion {
        status: Status::from_code(u32::from_le_bytes(status))?,
        information: u64::from_le_bytes(information),
    })
}
