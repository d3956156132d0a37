use mem::Addr;
use nix::unistd::Pid;
use utils::SysResult;

/// Process identifier as it travels on the wire.
pub type ProcessId = u32;

/// One side of a cross-process copy.
#[derive(Debug)]
pub enum ProcessRef<'a, P> {
    /// The process that issued the request. It is never looked up or
    /// released.
    Caller(Pid),
    /// A process obtained from `Host::lookup_process`.
    Resolved(&'a P),
}

impl<'a, P> Clone for ProcessRef<'a, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, P> Copy for ProcessRef<'a, P> {}

/// Capabilities the surrounding operating system lends to the bridge.
///
/// Implementations must be callable from many request threads at once; any
/// synchronization of the process table is theirs.
pub trait Host: Send + Sync {
    type Process: Send;

    /// Resolves `pid` to a live process. The returned value stays valid until
    /// it is handed back to `release_process`.
    fn lookup_process(&self, pid: ProcessId) -> SysResult<Self::Process>;

    /// Called exactly once for every successful lookup.
    fn release_process(&self, process: Self::Process);

    /// Moves `size` bytes from `src_addr` in `src` to `dst_addr` in `dst`.
    ///
    /// Returns the number of bytes that reached the destination alongside the
    /// outcome; on failure the count may be short or zero.
    fn raw_copy(
        &self,
        src: ProcessRef<'_, Self::Process>,
        src_addr: Addr,
        dst: ProcessRef<'_, Self::Process>,
        dst_addr: Addr,
        size: u64,
    ) -> (u64, SysResult<()>);
}
