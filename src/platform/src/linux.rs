use std::{
    convert::TryFrom,
    io::{IoSlice, IoSliceMut},
    os::unix::io::{AsRawFd, FromRawFd, OwnedFd},
};

use mem::Addr;
use nix::{
    errno::Errno,
    sys::uio::{process_vm_readv, process_vm_writev, RemoteIoVec},
    unistd::Pid,
};
use utils::{SysError, SysResult};

use crate::{Host, ProcessId, ProcessRef};

pub const DEFAULT_CHUNK_SIZE: usize = 64 << 10;

/// A process pinned by a pidfd. Closing the descriptor releases it.
#[derive(Debug)]
pub struct LinuxProcess {
    pid: Pid,
    pidfd: OwnedFd,
}

impl LinuxProcess {
    fn open(pid: Pid) -> SysResult<Self> {
        let fd = unsafe { libc::syscall(libc::SYS_pidfd_open, pid.as_raw(), 0) };
        if fd < 0 {
            return Err(match Errno::last() {
                Errno::ESRCH | Errno::EINVAL => SysError::process_not_found(),
                e => SysError::from_nix_errno(e),
            });
        }
        let pidfd = unsafe { OwnedFd::from_raw_fd(fd as i32) };
        Ok(Self { pid, pidfd })
    }

    /// Whether the process still exists. Signal 0 delivers nothing.
    pub fn is_alive(&self) -> bool {
        let ret = unsafe {
            libc::syscall(
                libc::SYS_pidfd_send_signal,
                self.pidfd.as_raw_fd(),
                0,
                std::ptr::null::<libc::siginfo_t>(),
                0,
            )
        };
        ret == 0 || Errno::last() == Errno::EPERM
    }
}

/// Host backed by the Linux cross-memory-attach syscalls.
///
/// Data moves through a local bounce buffer: `process_vm_readv` pulls a chunk
/// out of the source and `process_vm_writev` pushes it into the target. No
/// requested address is ever dereferenced in this process.
#[derive(Debug, Clone)]
pub struct LinuxHost {
    chunk_size: usize,
}

impl Default for LinuxHost {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl LinuxHost {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

fn pid_of(r: ProcessRef<'_, LinuxProcess>) -> SysResult<Pid> {
    match r {
        ProcessRef::Caller(pid) => Ok(pid),
        ProcessRef::Resolved(process) if process.is_alive() => Ok(process.pid),
        ProcessRef::Resolved(_) => Err(SysError::process_gone()),
    }
}

fn read_chunk(pid: Pid, addr: u64, buf: &mut [u8]) -> SysResult<usize> {
    let remote = [RemoteIoVec {
        base: addr as usize,
        len: buf.len(),
    }];
    let mut local = [IoSliceMut::new(buf)];
    process_vm_readv(pid, &mut local, &remote).map_err(SysError::from_transfer_errno)
}

fn write_chunk(pid: Pid, addr: u64, buf: &[u8]) -> SysResult<usize> {
    let remote = [RemoteIoVec {
        base: addr as usize,
        len: buf.len(),
    }];
    let local = [IoSlice::new(buf)];
    process_vm_writev(pid, &local, &remote).map_err(SysError::from_transfer_errno)
}

// A stop after some bytes landed is a partial copy; otherwise the cause
// itself is reported.
fn stopped(done: u64, cause: SysError) -> (u64, SysResult<()>) {
    if done > 0 {
        (done, Err(SysError::partial_copy(done)))
    } else {
        (0, Err(cause))
    }
}

impl Host for LinuxHost {
    type Process = LinuxProcess;

    fn lookup_process(&self, pid: ProcessId) -> SysResult<LinuxProcess> {
        match i32::try_from(pid) {
            Ok(raw) if raw > 0 => LinuxProcess::open(Pid::from_raw(raw)),
            _ => Err(SysError::process_not_found()),
        }
    }

    fn release_process(&self, process: LinuxProcess) {
        drop(process);
    }

    fn raw_copy(
        &self,
        src: ProcessRef<'_, LinuxProcess>,
        src_addr: Addr,
        dst: ProcessRef<'_, LinuxProcess>,
        dst_addr: Addr,
        size: u64,
    ) -> (u64, SysResult<()>) {
        let (src_pid, dst_pid) = match (pid_of(src), pid_of(dst)) {
            (Ok(s), Ok(d)) => (s, d),
            (Err(e), _) | (_, Err(e)) => return (0, Err(e)),
        };
        if src_addr.add_length(size).is_none()
            || dst_addr.add_length(size).is_none()
            || usize::try_from(size).is_err()
        {
            return (0, Err(SysError::overflow()));
        }

        let mut buf = vec![0u8; (size as usize).min(self.chunk_size)];
        let mut done = 0u64;
        while done < size {
            let want = ((size - done) as usize).min(buf.len());
            let chunk = &mut buf[..want];
            let read = match read_chunk(src_pid, src_addr.0 + done, chunk) {
                Ok(0) => return stopped(done, SysError::fault()),
                Ok(n) => n,
                Err(e) => return stopped(done, e),
            };
            let written = match write_chunk(dst_pid, dst_addr.0 + done, &chunk[..read]) {
                Ok(n) => n,
                Err(e) => return stopped(done, e),
            };
            done += written as u64;
            if written < want {
                return stopped(done, SysError::fault());
            }
        }
        (done, Ok(()))
    }
}
