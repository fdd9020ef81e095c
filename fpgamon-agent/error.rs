use std::io;
use thiserror::Error;

use fpgamon_raw::RegisterError;

#[derive(Error, Debug)]
pub enum FpgaError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource busy: {0}")]
    Busy(String),

    #[error("Timed out waiting for {what} after {polls} polls")]
    Timeout { what: &'static str, polls: u32 },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A feature does not handle the request; dispatch moves on to the next one
    #[error("Request not handled by this feature")]
    NotMine,

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("No such entry: {0}")]
    NoEntry(String),

    #[error("Permission denied: {0}")]
    AccessDenied(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("No such device: {0}")]
    NoDevice(String),

    #[error("Invalid device state: {0}")]
    InvalidState(String),

    #[error("MMIO operation failed: {0}")]
    MmioError(String),

    #[error("Register access rejected: {0}")]
    RegisterError(#[from] RegisterError),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Nix error: {0}")]
    NixError(#[from] nix::Error),

    #[error("Prometheus error: {0}")]
    PrometheusError(#[from] prometheus::Error),
}

impl FpgaError {
    /// Linux errno a character-device or sysfs caller would observe
    pub fn errno(&self) -> i32 {
        match self {
            FpgaError::InvalidArgument(_) | FpgaError::RegisterError(_) => libc::EINVAL,
            FpgaError::Busy(_) => libc::EBUSY,
            FpgaError::Timeout { .. } => libc::ETIMEDOUT,
            FpgaError::Unsupported(_) => libc::ENOTTY,
            FpgaError::NotMine => libc::ENODEV,
            FpgaError::OutOfMemory(_) => libc::ENOMEM,
            FpgaError::NoEntry(_) => libc::ENOENT,
            FpgaError::AccessDenied(_) => libc::EACCES,
            FpgaError::AlreadyExists(_) => libc::EEXIST,
            FpgaError::NoDevice(_) => libc::ENODEV,
            FpgaError::InvalidState(_) => libc::EINVAL,
            FpgaError::MmioError(_) => libc::EIO,
            FpgaError::IoError(e) => e.raw_os_error().unwrap_or(libc::EIO),
            FpgaError::NixError(e) => *e as i32,
            FpgaError::PrometheusError(_) => libc::EIO,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        FpgaError::InvalidArgument(msg.into())
    }

    pub(crate) fn busy(msg: impl Into<String>) -> Self {
        FpgaError::Busy(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FpgaError>;
