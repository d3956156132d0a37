use mem::Addr;
use nix::unistd::Pid;
use platform::{Host, ProcessGuard, ProcessRef};

use crate::{
    engine::CopyEngine,
    protocol::{CopyRequest, OP_COPY_MEMORY},
    status::{Completion, Status},
};

/// Source and target of a copy after the direction flag is applied.
#[derive(Debug)]
pub struct CopyPlan<'a, P> {
    pub source: ProcessRef<'a, P>,
    pub source_addr: Addr,
    pub target: ProcessRef<'a, P>,
    pub target_addr: Addr,
    pub size: u64,
}

/// Applies the direction flag of `req`.
///
/// A read pulls from the resolved process at `req.target` and delivers to the
/// caller at `req.source`. A write pushes from the caller at `req.source` to
/// the resolved process at `req.target`.
pub fn plan<'a, P>(req: &CopyRequest, caller: Pid, resolved: ProcessRef<'a, P>) -> CopyPlan<'a, P> {
    if req.write {
        CopyPlan {
            source: ProcessRef::Caller(caller),
            source_addr: req.source,
            target: resolved,
            target_addr: req.target,
            size: req.size,
        }
    } else {
        CopyPlan {
            source: resolved,
            source_addr: req.target,
            target: ProcessRef::Caller(caller),
            target_addr: req.source,
            size: req.size,
        }
    }
}

/// Turns control requests into copies. Holds no per-request state, so one
/// instance serves any number of threads.
pub struct Dispatcher<H: Host> {
    host: H,
}

impl<H: Host> Dispatcher<H> {
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Handles one control request issued by `caller`.
    pub fn handle(&self, caller: Pid, opcode: u32, input: Option<&[u8]>) -> Completion {
        match self.dispatch(caller, opcode, input) {
            Ok(()) => {
                logger::debug!("copy for {} completed", caller);
                Completion::success(CopyRequest::SIZE as u64)
            }
            Err(status) => {
                logger::warn!("request from {} failed: {}", caller, status);
                Completion::failure(status)
            }
        }
    }

    fn dispatch(&self, caller: Pid, opcode: u32, input: Option<&[u8]>) -> Result<(), Status> {
        if opcode != OP_COPY_MEMORY {
            return Err(Status::InvalidOperation);
        }
        let req = input
            .and_then(CopyRequest::decode)
            .ok_or(Status::LengthMismatch)?;
        if req.size == 0 {
            return Err(Status::LengthMismatch);
        }
        logger::debug!(
            "{}: {} {:#x} bytes, pid {} source {} target {}",
            caller,
            if req.write { "write" } else { "read" },
            req.size,
            req.process_id,
            req.source,
            req.target
        );

        let process = ProcessGuard::lookup(&self.host, req.process_id).map_err(|e| {
            logger::debug!("lookup of pid {} failed: {}", req.process_id, e);
            Status::ProcessNotFound
        })?;
        let copy = plan(&req, caller, process.process_ref());
        let outcome = CopyEngine::new(&self.host).copy(
            copy.source,
            copy.source_addr,
            copy.target,
            copy.target_addr,
            copy.size,
        );
        drop(process);

        let bytes_copied = outcome.bytes_copied;
        outcome.result.map_err(|e| {
            logger::warn!(
                "copy of {:#x} bytes stopped after {:#x}: {}",
                req.size,
                bytes_copied,
                e
            );
            Status::from(&e)
        })
    }
}
