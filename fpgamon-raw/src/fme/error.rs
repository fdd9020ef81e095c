//! Global error feature (`fme_error`)

use crate::fme::header::FeatureHeader;
use crate::register::Register;

/// Bits of `fme_err` software may clear
pub const FME_ERROR0_MASK: u64 = 0xFF;
/// Mask value left programmed outside of a clear sequence
pub const FME_ERROR0_MASK_DEFAULT: u64 = 0x40;
pub const FME_PCIE0_ERROR_MASK: u64 = 0xFF;
pub const FME_PCIE1_ERROR_MASK: u64 = 0xFF;
pub const FME_RAS_WERROR_MASK: u64 = 0x1;
/// Low 60 bits of the first/next error snapshots hold the latched error
pub const FME_FIRST_ERROR_MASK: u64 = (1 << 60) - 1;
pub const FME_NEXT_ERROR_MASK: u64 = (1 << 60) - 1;
/// Valid error injection bits (catastrophic, fatal, warning)
pub const FME_RAS_ERROR_INJ_MASK: u64 = 0x7;

csr! {
    /// First/next latched error snapshot
    pub struct ErrorSnapshot {
        err_reg_status, set_err_reg_status: 0, 60;
        err_reg_id, set_err_reg_id: 60, 4;
    }
}

csr! {
    /// RAS warning error
    pub struct RasWarnError {
        event_warn_err, set_event_warn_err: 0, 1;
    }
}

csr! {
    /// RAS error injection
    pub struct RasErrorInj {
        catast_error, set_catast_error: 0, 1;
        fatal_error, set_fatal_error: 1, 1;
        warning_error, set_warning_error: 2, 1;
    }
}

csr! {
    /// Error interrupt capability
    pub struct ErrorCap {
        supp_int, set_supp_int: 0, 1;
        int_vect, set_int_vect: 1, 12;
    }
}

pub const HEADER: Register<FeatureHeader> = Register::new(0x00);
pub const FME_ERR_MASK: Register<u64> = Register::new(0x08);
pub const FME_ERR: Register<u64> = Register::new(0x10);
pub const PCIE0_ERR_MASK: Register<u64> = Register::new(0x18);
pub const PCIE0_ERR: Register<u64> = Register::new(0x20);
pub const PCIE1_ERR_MASK: Register<u64> = Register::new(0x28);
pub const PCIE1_ERR: Register<u64> = Register::new(0x30);
pub const FME_FIRST_ERR: Register<ErrorSnapshot> = Register::new(0x38);
pub const FME_NEXT_ERR: Register<ErrorSnapshot> = Register::new(0x40);
pub const RAS_GERR_MASK: Register<u64> = Register::new(0x48);
pub const RAS_GERR: Register<u64> = Register::new(0x50);
pub const RAS_BERR_MASK: Register<u64> = Register::new(0x58);
pub const RAS_BERR: Register<u64> = Register::new(0x60);
pub const RAS_WERR_MASK: Register<u64> = Register::new(0x68);
pub const RAS_WERR: Register<RasWarnError> = Register::new(0x70);
pub const RAS_ERROR_INJ: Register<RasErrorInj> = Register::new(0x78);
pub const ERROR_CAP: Register<ErrorCap> = Register::new(0x80);

/// Masks programmed when the error feature comes up
pub const DEFAULT_MASKS: [(u64, u64); 6] = [
    (FME_ERR_MASK.offset, FME_ERROR0_MASK_DEFAULT),
    (PCIE0_ERR_MASK.offset, 0),
    (PCIE1_ERR_MASK.offset, 0),
    (RAS_GERR_MASK.offset, 0),
    (RAS_BERR_MASK.offset, 0),
    (RAS_WERR_MASK.offset, 0),
];
