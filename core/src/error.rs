//! Error kinds reported at the control interface (spec §7), mirroring the
//! teacher's manual `Display` impls (`ioqueue::Status`, `connection::Verdict`)
//! since this crate stays `no_std` and cannot lean on `std::error::Error`.

use ripc_wire::WireError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    InvalidArg,
    NotFound,
    Busy,
    NoSpace,
    NoMem,
    NotImpl,
    Permission,
    Interrupted,
    BadFd,
    /// Response larger than the caller-supplied read buffer; head retained.
    NoBufs,
}

impl core::fmt::Display for CoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            CoreError::InvalidArg => "invalid argument",
            CoreError::NotFound => "not found",
            CoreError::Busy => "busy",
            CoreError::NoSpace => "no space left",
            CoreError::NoMem => "out of memory",
            CoreError::NotImpl => "not implemented",
            CoreError::Permission => "permission denied",
            CoreError::Interrupted => "interrupted",
            CoreError::BadFd => "bad file descriptor",
            CoreError::NoBufs => "buffer too small",
        };
        write!(f, "{}", s)
    }
}

impl From<WireError> for CoreError {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Truncated => CoreError::InvalidArg,
            WireError::UnknownType(_) => CoreError::InvalidArg,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
