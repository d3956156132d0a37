//! Host collaborators of the memory bridge: process resolution and the raw
//! cross-address-space copy.

mod guard;
mod host;
mod linux;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use guard::ProcessGuard;
pub use host::{Host, ProcessId, ProcessRef};
pub use linux::{LinuxHost, LinuxProcess, DEFAULT_CHUNK_SIZE};
