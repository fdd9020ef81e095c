//! Errors raised while validating register accesses

pub type Result<T> = std::result::Result<T, RegisterError>;

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("Offset 0x{offset:X} is not 64-bit aligned")]
    Misaligned { offset: u64 },

    #[error("Offset 0x{offset:X} lies outside a 0x{len:X}-byte window")]
    OutOfWindow { offset: u64, len: u64 },
}

impl RegisterError {
    /// Reject any access that is not a whole, aligned 64-bit word inside the window
    pub fn check_access(offset: u64, len: u64) -> Result<()> {
        if offset % 8 != 0 {
            return Err(Self::Misaligned { offset });
        }
        match offset.checked_add(8) {
            Some(end) if end <= len => Ok(()),
            _ => Err(Self::OutOfWindow { offset, len }),
        }
    }
}
