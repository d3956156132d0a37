use std::{
    convert::TryFrom,
    io::{Read, Write},
    os::unix::net::UnixStream,
    path::Path,
};

use anyhow::{anyhow, Context};
use mem::Addr;
use platform::ProcessId;

use crate::{
    protocol::{decode_reply, CopyRequest, FrameHeader, OP_COPY_MEMORY, REPLY_SIZE},
    status::Completion,
};

/// Caller side of the bridge. The local half of every copy is a buffer owned
/// by this process.
#[derive(Debug)]
pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub fn connect<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let stream = UnixStream::connect(path.as_ref())
            .with_context(|| format!("failed to connect to {:?}", path.as_ref()))?;
        Ok(Self { stream })
    }

    /// Sends one raw control request and waits for its completion.
    pub fn call(&mut self, opcode: u32, payload: &[u8]) -> anyhow::Result<Completion> {
        let header = FrameHeader {
            opcode,
            length: u32::try_from(payload.len()).context("payload too large")?,
        };
        self.stream.write_all(&header.encode())?;
        self.stream.write_all(payload)?;
        let mut reply = [0u8; REPLY_SIZE];
        self.stream
            .read_exact(&mut reply)
            .context("failed to read reply")?;
        decode_reply(&reply).ok_or_else(|| anyhow!("unknown status in reply {:?}", &reply[..4]))
    }

    /// Fills `buf` with the bytes at `remote` in process `pid`.
    pub fn read(
        &mut self,
        pid: ProcessId,
        remote: Addr,
        buf: &mut [u8],
    ) -> anyhow::Result<Completion> {
        let req = CopyRequest {
            source: Addr(buf.as_mut_ptr() as u64),
            target: remote,
            size: buf.len() as u64,
            process_id: pid,
            write: false,
        };
        self.call(OP_COPY_MEMORY, &req.encode())
    }

    /// Stores `buf` at `remote` in process `pid`.
    pub fn write(&mut self, pid: ProcessId, remote: Addr, buf: &[u8]) -> anyhow::Result<Completion> {
        let req = CopyRequest {
            source: Addr(buf.as_ptr() as u64),
            target: remote,
            size: buf.len() as u64,
            process_id: pid,
            write: true,
        };
        self.call(OP_COPY_MEMORY, &req.encode())
    }
}
