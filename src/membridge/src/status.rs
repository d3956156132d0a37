use std::fmt;

use utils::{SysError, SysErrorKind};

/// Status code reported back to the issuer of a control request.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    Success = 0,
    LengthMismatch = 1,
    InvalidOperation = 2,
    ProcessNotFound = 3,
    AccessDenied = 4,
    PartialCopy = 5,
    Overflow = 6,
}

impl Status {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        let status = match code {
            0 => Status::Success,
            1 => Status::LengthMismatch,
            2 => Status::InvalidOperation,
            3 => Status::ProcessNotFound,
            4 => Status::AccessDenied,
            5 => Status::PartialCopy,
            6 => Status::Overflow,
            _ => return None,
        };
        Some(status)
    }

    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Success => "success",
            Status::LengthMismatch => "length-mismatch",
            Status::InvalidOperation => "invalid-operation",
            Status::ProcessNotFound => "process-not-found",
            Status::AccessDenied => "access-denied",
            Status::PartialCopy => "partial-copy",
            Status::Overflow => "overflow",
        };
        f.write_str(name)
    }
}

impl From<&SysError> for Status {
    fn from(err: &SysError) -> Self {
        match err.kind() {
            SysErrorKind::ProcessNotFound | SysErrorKind::ProcessGone => Status::ProcessNotFound,
            SysErrorKind::PartialCopy(_) => Status::PartialCopy,
            SysErrorKind::Overflow => Status::Overflow,
            SysErrorKind::Fault | SysErrorKind::PermissionDenied | SysErrorKind::Nix => {
                Status::AccessDenied
            }
        }
    }
}

/// What the host sees once a request is finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Completion {
    pub status: Status,
    /// Bytes of the request consumed; zero unless `status` is success.
    pub information: u64,
}

impl Completion {
    pub fn success(information: u64) -> Self {
        Self {
            status: Status::Success,
            information,
        }
    }

    pub fn failure(status: Status) -> Self {
        Self {
            status,
            information: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        for code in 0..7 {
            let status = Status::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(Status::from_code(7), None);
        assert_eq!(Status::AccessDenied.code(), 4);
    }

    #[test]
    fn copy_failures_map_to_status() {
        assert_eq!(Status::from(&SysError::fault()), Status::AccessDenied);
        assert_eq!(
            Status::from(&SysError::permission_denied()),
            Status::AccessDenied
        );
        assert_eq!(
            Status::from(&SysError::process_gone()),
            Status::ProcessNotFound
        );
        assert_eq!(
            Status::from(&SysError::process_not_found()),
            Status::ProcessNotFound
        );
        assert_eq!(Status::from(&SysError::overflow()), Status::Overflow);
        assert_eq!(
            Status::from(&SysError::partial_copy(3)),
            Status::PartialCopy
        );
        assert_eq!(
            Status::from(&SysError::from_nix_errno(nix::errno::Errno::EIO)),
            Status::AccessDenied
        );
    }

    #[test]
    fn display_names() {
        assert_eq!(Status::LengthMismatch.to_string(), "length-mismatch");
        assert_eq!(Status::ProcessNotFound.to_string(), "process-not-found");
    }
}
