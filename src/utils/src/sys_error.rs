use std::fmt;

use nix::errno::Errno;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysErrorKind {
    Nix, // from nix crate
    Fault,
    PermissionDenied,
    ProcessNotFound,
    ProcessGone,
    Overflow,
    PartialCopy(u64),
}

#[derive(Debug, PartialEq, Eq)]
pub struct SysError {
    code: i32,
    desc: Option<String>,
    kind: SysErrorKind,
}

impl fmt::Display for SysError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SysError occured with code: {} {:?} {:?}",
            self.code, self.desc, self.kind
        )
    }
}

impl std::error::Error for SysError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl SysError {
    pub fn kind(&self) -> SysErrorKind {
        self.kind
    }

    pub fn fault() -> Self {
        Self {
            code: libc::EFAULT,
            desc: None,
            kind: SysErrorKind::Fault,
        }
    }

    pub fn permission_denied() -> Self {
        Self {
            code: libc::EPERM,
            desc: None,
            kind: SysErrorKind::PermissionDenied,
        }
    }

    pub fn process_not_found() -> Self {
        Self {
            code: libc::ESRCH,
            desc: None,
            kind: SysErrorKind::ProcessNotFound,
        }
    }

    /// The process was resolved once but has exited since.
    pub fn process_gone() -> Self {
        Self {
            code: libc::ESRCH,
            desc: Some("process exited after lookup".to_string()),
            kind: SysErrorKind::ProcessGone,
        }
    }

    pub fn overflow() -> Self {
        Self {
            code: libc::EOVERFLOW,
            desc: None,
            kind: SysErrorKind::Overflow,
        }
    }

    pub fn partial_copy(copied: u64) -> Self {
        Self {
            code: libc::EFAULT,
            desc: Some(format!("copy stopped after {} bytes", copied)),
            kind: SysErrorKind::PartialCopy(copied),
        }
    }

    pub fn from_nix_errno(e: Errno) -> Self {
        Self {
            code: e as i32,
            desc: Some(e.desc().to_string()),
            kind: SysErrorKind::Nix,
        }
    }

    /// Classifies an errno reported by a cross-address-space transfer.
    pub fn from_transfer_errno(e: Errno) -> Self {
        match e {
            Errno::EFAULT | Errno::ENOMEM => Self::fault(),
            Errno::EPERM | Errno::EACCES => Self::permission_denied(),
            Errno::ESRCH => Self::process_gone(),
            e => Self::from_nix_errno(e),
        }
    }
}

pub type SysResult<T> = std::result::Result<T, SysError>;
