//! FME (FPGA Management Engine) register definitions
//!
//! The FME exposes one header block followed by a chain of private features.
//! Each feature starts with a [`header::FeatureHeader`] and owns a fixed
//! window of 64-bit little-endian CSRs; offsets below are relative to the
//! start of that window.
//!
//! ## References
//!
//! - Intel FPGA PCIe Accelerator Card FME register map
//! - Device Feature List (DFL) enumeration format

pub mod error;
pub mod gperf;
pub mod header;
pub mod power;
pub mod thermal;

/// Number of feature slots an FME device carries (ids 0..=5)
pub const FME_FEATURE_NUM: usize = 6;

/// FME feature ids, which double as slot indices in the feature table
pub mod feature_id {
    pub const HEADER: usize = 0x0;
    pub const THERMAL_MGMT: usize = 0x1;
    pub const POWER_MGMT: usize = 0x2;
    pub const GLOBAL_PERF: usize = 0x3;
    pub const GLOBAL_ERR: usize = 0x4;
    pub const PR_MGMT: usize = 0x5;
}

/// Feature names, indexed by feature id
pub const FEATURE_NAMES: [&str; FME_FEATURE_NUM] = [
    "fme_hdr",
    "fme_thermal",
    "fme_power",
    "fme_gperf",
    "fme_error",
    "fme_pr",
];

/// Size of every private feature window the FME exposes
pub const FEATURE_WINDOW_SIZE: u64 = 0x1000;
