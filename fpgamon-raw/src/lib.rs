//! # fpgamon-raw
//!
//! Register layout definitions for the FPGA Management Engine (FME).
//!
//! This crate only describes registers: byte offsets inside each feature
//! window, bit fields, event codes and masks. It performs no I/O; the agent
//! crate maps the windows and drives the access protocols.
//!
//! ## Usage
//!
//! ```
//! use fpgamon_raw::fme::gperf::{cache_event, channel, CacheCtl};
//! use fpgamon_raw::RegisterLayout;
//!
//! let mut ctl = CacheCtl::from_csr(0);
//! ctl.set_cache_event(cache_event::RD_MISS);
//! ctl.set_cci_chsel(channel::RD);
//! assert_eq!(ctl.to_csr(), 2 << 16);
//! ```

#[macro_use]
pub mod register;

pub mod error;
pub mod fme;

// Re-export for convenience
pub use error::{RegisterError, Result};
pub use register::{Register, RegisterLayout};
