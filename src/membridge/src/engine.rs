use mem::Addr;
use platform::{Host, ProcessRef};
use utils::{SysError, SysResult};

/// Result of one copy: how many bytes landed and whether all of them did.
#[derive(Debug, PartialEq, Eq)]
pub struct CopyOutcome {
    pub bytes_copied: u64,
    pub result: SysResult<()>,
}

/// Moves bytes between two address spaces through the host primitive.
///
/// The engine never retries: a short transfer is a failure that keeps the
/// count the primitive reported.
#[derive(Debug)]
pub struct CopyEngine<'h, H: Host> {
    host: &'h H,
}

impl<'h, H: Host> CopyEngine<'h, H> {
    pub fn new(host: &'h H) -> Self {
        Self { host }
    }

    pub fn copy(
        &self,
        source: ProcessRef<'_, H::Process>,
        source_addr: Addr,
        target: ProcessRef<'_, H::Process>,
        target_addr: Addr,
        size: u64,
    ) -> CopyOutcome {
        if source_addr.add_length(size).is_none() || target_addr.add_length(size).is_none() {
            return CopyOutcome {
                bytes_copied: 0,
                result: Err(SysError::overflow()),
            };
        }
        let (bytes_copied, result) =
            self.host
                .raw_copy(source, source_addr, target, target_addr, size);
        let result = match result {
            Ok(()) if bytes_copied != size => Err(SysError::partial_copy(bytes_copied)),
            r => r,
        };
        CopyOutcome {
            bytes_copied,
            result,
        }
    }
}
