//! An in-memory host whose processes are sparse byte arenas.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use mem::Addr;
use utils::{SysError, SysResult};

use crate::{Host, ProcessId, ProcessRef};

#[derive(Default)]
struct Space {
    regions: BTreeMap<u64, Vec<u8>>,
    exited: bool,
    exit_on_lookup: bool,
    protected: bool,
}

impl Space {
    // Number of contiguous mapped bytes starting at `addr`.
    fn available(&self, addr: u64) -> u64 {
        match self.regions.range(..=addr).next_back() {
            Some((base, region)) => (region.len() as u64).saturating_sub(addr - base),
            None => 0,
        }
    }

    fn slice(&self, addr: u64, len: u64) -> &[u8] {
        let (base, region) = self
            .regions
            .range(..=addr)
            .next_back()
            .expect("slice of unmapped address");
        let off = (addr - base) as usize;
        &region[off..off + len as usize]
    }

    fn slice_mut(&mut self, addr: u64, len: u64) -> &mut [u8] {
        let (base, region) = self
            .regions
            .range_mut(..=addr)
            .next_back()
            .expect("slice of unmapped address");
        let off = (addr - base) as usize;
        &mut region[off..off + len as usize]
    }
}

#[derive(Debug)]
pub struct FakeProcess {
    pid: ProcessId,
}

#[derive(Default)]
pub struct FakeHost {
    spaces: Mutex<HashMap<ProcessId, Space>>,
    lookups: AtomicUsize,
    acquired: AtomicUsize,
    releases: AtomicUsize,
    copies: AtomicUsize,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&self, pid: ProcessId) {
        self.spaces.lock().unwrap().insert(pid, Space::default());
    }

    /// Maps a fresh region at `addr` holding `bytes`. Regions must not overlap.
    pub fn map(&self, pid: ProcessId, addr: Addr, bytes: &[u8]) {
        let mut spaces = self.spaces.lock().unwrap();
        let space = spaces.entry(pid).or_default();
        space.regions.insert(addr.0, bytes.to_vec());
    }

    pub fn map_zeroed(&self, pid: ProcessId, addr: Addr, len: usize) {
        self.map(pid, addr, &vec![0; len]);
    }

    pub fn read(&self, pid: ProcessId, addr: Addr, len: u64) -> Option<Vec<u8>> {
        let spaces = self.spaces.lock().unwrap();
        let space = spaces.get(&pid)?;
        if space.available(addr.0) < len {
            return None;
        }
        Some(space.slice(addr.0, len).to_vec())
    }

    /// Marks `pid` as exited; later lookups fail and held handles go stale.
    pub fn exit(&self, pid: ProcessId) {
        if let Some(space) = self.spaces.lock().unwrap().get_mut(&pid) {
            space.exited = true;
        }
    }

    /// The next successful lookup of `pid` is followed by its exit.
    pub fn exit_after_lookup(&self, pid: ProcessId) {
        if let Some(space) = self.spaces.lock().unwrap().get_mut(&pid) {
            space.exit_on_lookup = true;
        }
    }

    /// Copies touching `pid` fail with a permission error.
    pub fn protect(&self, pid: ProcessId) {
        if let Some(space) = self.spaces.lock().unwrap().get_mut(&pid) {
            space.protected = true;
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    /// Successful lookups not yet matched by a release.
    pub fn outstanding(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.releases()
    }
}

fn pid_of(r: ProcessRef<'_, FakeProcess>) -> ProcessId {
    match r {
        ProcessRef::Caller(pid) => pid.as_raw() as ProcessId,
        ProcessRef::Resolved(p) => p.pid,
    }
}

impl Host for FakeHost {
    type Process = FakeProcess;

    fn lookup_process(&self, pid: ProcessId) -> SysResult<FakeProcess> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let mut spaces = self.spaces.lock().unwrap();
        match spaces.get_mut(&pid) {
            Some(space) if !space.exited => {
                if space.exit_on_lookup {
                    space.exited = true;
                }
                self.acquired.fetch_add(1, Ordering::SeqCst);
                Ok(FakeProcess { pid })
            }
            _ => Err(SysError::process_not_found()),
        }
    }

    fn release_process(&self, _process: FakeProcess) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn raw_copy(
        &self,
        src: ProcessRef<'_, FakeProcess>,
        src_addr: Addr,
        dst: ProcessRef<'_, FakeProcess>,
        dst_addr: Addr,
        size: u64,
    ) -> (u64, SysResult<()>) {
        self.copies.fetch_add(1, Ordering::SeqCst);
        let (src_pid, dst_pid) = (pid_of(src), pid_of(dst));
        let mut spaces = self.spaces.lock().unwrap();
        for pid in [src_pid, dst_pid] {
            match spaces.get(&pid) {
                None => return (0, Err(SysError::process_gone())),
                Some(space) if space.exited => return (0, Err(SysError::process_gone())),
                Some(space) if space.protected => {
                    return (0, Err(SysError::permission_denied()))
                }
                Some(_) => {}
            }
        }
        if src_addr.add_length(size).is_none() || dst_addr.add_length(size).is_none() {
            return (0, Err(SysError::overflow()));
        }

        let n = size
            .min(spaces[&src_pid].available(src_addr.0))
            .min(spaces[&dst_pid].available(dst_addr.0));
        if n == 0 {
            return (0, Err(SysError::fault()));
        }
        let bytes = spaces[&src_pid].slice(src_addr.0, n).to_vec();
        if let Some(space) = spaces.get_mut(&dst_pid) {
            space.slice_mut(dst_addr.0, n).copy_from_slice(&bytes);
        }
        if n < size {
            (n, Err(SysError::partial_copy(n)))
        } else {
            (n, Ok(()))
        }
    }
}
