//! Bounded register polling with an injectable time source

use std::time::Duration;

use crate::common::mmio::RegisterDomain;
use crate::error::{FpgaError, Result};

/// Poll budget of the counter banks, in microseconds
pub const GPERF_TIMEOUT_US: u64 = 30;
/// Interval between two polls, in microseconds
pub const GPERF_POLL_INTERVAL_US: u64 = 1;

/// Time source used between polls
pub trait Delay: Send + Sync {
    fn delay_us(&self, us: u64);
}

/// Sleeps the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn delay_us(&self, us: u64) {
        std::thread::sleep(Duration::from_micros(us));
    }
}

/// Returns immediately; for simulated hardware
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn delay_us(&self, _us: u64) {}
}

/// Poll `offset` until `field(csr) == expected`, returning the matching CSR
///
/// Reads at `waited = 0, interval, 2 * interval, ..., timeout`, so at most
/// `timeout / interval + 1` reads happen before giving up.
#[allow(clippy::too_many_arguments)]
pub fn wait_register_field<F>(
    domain: &dyn RegisterDomain,
    offset: u64,
    field: F,
    expected: u64,
    timeout_us: u64,
    interval_us: u64,
    delay: &dyn Delay,
    what: &'static str,
) -> Result<u64>
where
    F: Fn(u64) -> u64,
{
    let interval_us = interval_us.max(1);
    let mut waited = 0;
    let mut polls = 0u32;

    loop {
        let csr = domain.read64(offset)?;
        polls += 1;
        if field(csr) == expected {
            return Ok(csr);
        }
        if waited + interval_us > timeout_us {
            break;
        }
        delay.delay_us(interval_us);
        waited += interval_us;
    }

    tracing::warn!(
        "{}: register 0x{:x} never echoed 0x{:x} within {}us",
        what,
        offset,
        expected,
        timeout_us
    );
    Err(FpgaError::Timeout { what, polls })
}
