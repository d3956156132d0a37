use std::mem::ManuallyDrop;

use utils::SysResult;

use crate::{Host, ProcessId, ProcessRef};

/// Holds a resolved process and hands it back to the host when dropped.
///
/// A guard only exists after a successful lookup, so a failed lookup has
/// nothing to release.
pub struct ProcessGuard<'h, H: Host> {
    host: &'h H,
    process: ManuallyDrop<H::Process>,
}

impl<'h, H: Host> ProcessGuard<'h, H> {
    pub fn lookup(host: &'h H, pid: ProcessId) -> SysResult<Self> {
        let process = host.lookup_process(pid)?;
        Ok(Self {
            host,
            process: ManuallyDrop::new(process),
        })
    }

    pub fn process_ref(&self) -> ProcessRef<'_, H::Process> {
        ProcessRef::Resolved(&self.process)
    }
}

impl<'h, H: Host> Drop for ProcessGuard<'h, H> {
    fn drop(&mut self) {
        // `process` is not used again after this.
        let process = unsafe { ManuallyDrop::take(&mut self.process) };
        self.host.release_process(process);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHost;

    #[test]
    fn release_on_drop() {
        let host = FakeHost::new();
        host.spawn(41);
        {
            let guard = ProcessGuard::lookup(&host, 41).unwrap();
            assert!(matches!(guard.process_ref(), ProcessRef::Resolved(_)));
            assert_eq!(host.outstanding(), 1);
        }
        assert_eq!(host.lookups(), 1);
        assert_eq!(host.releases(), 1);
    }

    #[test]
    fn failed_lookup_releases_nothing() {
        let host = FakeHost::new();
        assert!(ProcessGuard::lookup(&host, 7).is_err());
        assert_eq!(host.lookups(), 1);
        assert_eq!(host.releases(), 0);
    }
}
