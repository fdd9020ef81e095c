//! Select → confirm → read protocol of the multiplexed counter banks
//!
//! A bank counts one event at a time. Selecting a new event invalidates the
//! running count until the hardware echoes the new code in the counter
//! register, so every read polls for that echo before trusting the value.

use fpgamon_raw::fme::gperf::{self, CacheCtl, CacheCtr, FabCtl, FabCtr, VtdCtl, VtdCtr};
use fpgamon_raw::{Register, RegisterLayout};

use crate::common::mmio::CsrAccess;
use crate::common::poll::{wait_register_field, Delay, GPERF_POLL_INTERVAL_US, GPERF_TIMEOUT_US};
use crate::counters::events::PerfBank;
use crate::error::Result;
use crate::feature::table::DeviceGuard;

/// One counter bank: control register, counter register(s) and field accessors
#[derive(Debug)]
pub struct CounterMux {
    pub bank: PerfBank,
    pub ctl: u64,
    pub ctr: u64,
    /// Second counter summed into the result (odd address parity)
    pub ctr_odd: Option<u64>,
    select: fn(u64, u64, u64) -> u64,
    echo: fn(u64) -> u64,
    count: fn(u64) -> u64,
    freeze: fn(u64) -> u64,
    set_freeze: fn(u64, u64) -> u64,
}

fn cache_select(ctl: u64, event: u64, channel: u64) -> u64 {
    let mut ctl = CacheCtl::from_csr(ctl);
    ctl.set_cache_event(event);
    ctl.set_cci_chsel(channel);
    ctl.to_csr()
}

fn cache_echo(ctr: u64) -> u64 {
    CacheCtr::from_csr(ctr).event_code()
}

fn cache_count(ctr: u64) -> u64 {
    CacheCtr::from_csr(ctr).cache_counter()
}

fn cache_freeze(ctl: u64) -> u64 {
    CacheCtl::from_csr(ctl).freeze()
}

fn cache_set_freeze(ctl: u64, on: u64) -> u64 {
    let mut ctl = CacheCtl::from_csr(ctl);
    ctl.set_freeze(on);
    ctl.to_csr()
}

// The fabric has no channel; the port filter is programmed separately.
fn fab_select(ctl: u64, event: u64, _channel: u64) -> u64 {
    let mut ctl = FabCtl::from_csr(ctl);
    ctl.set_fab_evtcode(event);
    ctl.to_csr()
}

fn fab_echo(ctr: u64) -> u64 {
    FabCtr::from_csr(ctr).event_code()
}

fn fab_count(ctr: u64) -> u64 {
    FabCtr::from_csr(ctr).fab_cnt()
}

fn fab_freeze(ctl: u64) -> u64 {
    FabCtl::from_csr(ctl).freeze()
}

fn fab_set_freeze(ctl: u64, on: u64) -> u64 {
    let mut ctl = FabCtl::from_csr(ctl);
    ctl.set_freeze(on);
    ctl.to_csr()
}

fn vtd_select(ctl: u64, event: u64, _channel: u64) -> u64 {
    let mut ctl = VtdCtl::from_csr(ctl);
    ctl.set_vtd_evtcode(event);
    ctl.to_csr()
}

fn vtd_echo(ctr: u64) -> u64 {
    VtdCtr::from_csr(ctr).event_code()
}

fn vtd_count(ctr: u64) -> u64 {
    VtdCtr::from_csr(ctr).vtd_counter()
}

fn vtd_freeze(ctl: u64) -> u64 {
    VtdCtl::from_csr(ctl).freeze()
}

fn vtd_set_freeze(ctl: u64, on: u64) -> u64 {
    let mut ctl = VtdCtl::from_csr(ctl);
    ctl.set_freeze(on);
    ctl.to_csr()
}

pub const CACHE: CounterMux = CounterMux {
    bank: PerfBank::Cache,
    ctl: gperf::CACHE_CTL.offset,
    ctr: gperf::CACHE_CTR0.offset,
    ctr_odd: Some(gperf::CACHE_CTR1.offset),
    select: cache_select,
    echo: cache_echo,
    count: cache_count,
    freeze: cache_freeze,
    set_freeze: cache_set_freeze,
};

pub const FABRIC: CounterMux = CounterMux {
    bank: PerfBank::Fabric,
    ctl: gperf::FAB_CTL.offset,
    ctr: gperf::FAB_CTR.offset,
    ctr_odd: None,
    select: fab_select,
    echo: fab_echo,
    count: fab_count,
    freeze: fab_freeze,
    set_freeze: fab_set_freeze,
};

pub const IOMMU: CounterMux = CounterMux {
    bank: PerfBank::Iommu,
    ctl: gperf::VTD_CTL.offset,
    ctr: gperf::VTD_CTR.offset,
    ctr_odd: None,
    select: vtd_select,
    echo: vtd_echo,
    count: vtd_count,
    freeze: vtd_freeze,
    set_freeze: vtd_set_freeze,
};

impl PerfBank {
    pub fn mux(&self) -> &'static CounterMux {
        match self {
            PerfBank::Cache => &CACHE,
            PerfBank::Fabric => &FABRIC,
            PerfBank::Iommu => &IOMMU,
        }
    }
}

impl CounterMux {
    /// Select `event` (on `channel` where the bank has one), wait for the echo, read the count
    ///
    /// The count comes from the same counter snapshot that carried the
    /// matching echo. On timeout no value is reported.
    pub fn read(
        &self,
        guard: &DeviceGuard<'_>,
        index: usize,
        event: u64,
        channel: u64,
        delay: &dyn Delay,
    ) -> Result<u64> {
        let window = guard.window(index)?;

        window.modify_csr(Register::<u64>::new(self.ctl), |ctl| {
            *ctl = (self.select)(*ctl, event, channel)
        })?;

        let ctr = wait_register_field(
            window,
            self.ctr,
            self.echo,
            event,
            GPERF_TIMEOUT_US,
            GPERF_POLL_INTERVAL_US,
            delay,
            self.bank.name(),
        )?;

        let mut count = (self.count)(ctr);
        if let Some(odd) = self.ctr_odd {
            count += (self.count)(window.read64(odd)?);
        }
        Ok(count)
    }

    pub fn is_frozen(&self, guard: &DeviceGuard<'_>, index: usize) -> Result<bool> {
        let ctl = guard.window(index)?.read64(self.ctl)?;
        Ok((self.freeze)(ctl) != 0)
    }

    /// Stop or resume accumulation; independent of event selection
    pub fn set_frozen(&self, guard: &DeviceGuard<'_>, index: usize, frozen: bool) -> Result<()> {
        guard.window(index)?.modify_csr(Register::<u64>::new(self.ctl), |ctl| {
            *ctl = (self.set_freeze)(*ctl, u64::from(frozen))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::poll::NoDelay;
    use crate::common::sim::SimWindow;
    use crate::error::FpgaError;
    use crate::feature::table::FeatureTable;
    use std::sync::Arc;

    const GPERF: usize = 0;

    fn table_with(win: Arc<SimWindow>) -> FeatureTable {
        let mut table = FeatureTable::attach("mux", 1).unwrap();
        table.add_feature(GPERF, "fme_gperf", win).unwrap();
        table
    }

    /// Echo the selected cache event after `lag` polls of ctr0
    fn cache_hw(win: &SimWindow, lag: usize, even: u64, odd: u64) {
        let mut pending: Option<(u64, usize)> = None;
        let selected = Arc::new(parking_lot::Mutex::new(None::<u64>));
        let sel = Arc::clone(&selected);
        win.on_write(gperf::CACHE_CTL.offset, move |_, value| {
            *sel.lock() = Some(CacheCtl(value).cache_event());
        });
        win.on_read(gperf::CACHE_CTR0.offset, move |bank| {
            if let Some(code) = selected.lock().take() {
                pending = Some((code, 0));
            }
            if let Some((code, polls)) = pending.as_mut() {
                *polls += 1;
                if *polls > lag {
                    bank.set(gperf::CACHE_CTR0.offset, (*code << 60) | even);
                    bank.set(gperf::CACHE_CTR1.offset, (*code << 60) | odd);
                }
            }
        });
    }

    #[test]
    fn test_cache_read_sums_both_counters() {
        let win = Arc::new(SimWindow::new(0x48));
        cache_hw(&win, 4, 100, 23);
        let table = table_with(Arc::clone(&win));

        let guard = table.lock();
        let value = CACHE.read(&guard, GPERF, 10, 0, &NoDelay).unwrap();
        assert_eq!(value, 123);
        // echo seen on the 5th poll: lag + 1 reads of the counter
        assert_eq!(win.reads_of(gperf::CACHE_CTR0.offset), 5);
        assert_eq!(win.reads_of(gperf::CACHE_CTR1.offset), 1);
    }

    #[test]
    fn test_select_preserves_freeze() {
        let win = Arc::new(SimWindow::new(0x48));
        cache_hw(&win, 0, 1, 1);
        win.poke(gperf::CACHE_CTL.offset, 1 << 8);
        let table = table_with(Arc::clone(&win));

        let guard = table.lock();
        CACHE.read(&guard, GPERF, 3, 1, &NoDelay).unwrap();
        assert_eq!(
            win.writes_to(gperf::CACHE_CTL.offset),
            vec![(1 << 8) | (3 << 16) | (1 << 20)]
        );
    }

    #[test]
    fn test_stale_echo_times_out() {
        let win = Arc::new(SimWindow::new(0x48));
        // hardware stuck on the previous event
        win.poke(gperf::VTD_CTR.offset, (2 << 60) | 0x55);
        let table = table_with(Arc::clone(&win));

        let guard = table.lock();
        let err = IOMMU.read(&guard, GPERF, 5, 0, &NoDelay).unwrap_err();
        assert!(matches!(err, FpgaError::Timeout { what: "iommu", polls: 31 }));
        assert_eq!(win.reads_of(gperf::VTD_CTR.offset), 31);
    }

    #[test]
    fn test_fabric_read_single_counter() {
        let win = Arc::new(SimWindow::new(0x48));
        win.on_write(gperf::FAB_CTL.offset, |bank, value| {
            let code = FabCtl(value).fab_evtcode();
            bank.set(gperf::FAB_CTR.offset, (code << 60) | 0x0FFF_FFFF_FFFF_FFFF);
        });
        let table = table_with(Arc::clone(&win));

        let guard = table.lock();
        let value = FABRIC.read(&guard, GPERF, 6, 0, &NoDelay).unwrap();
        assert_eq!(value, 0x0FFF_FFFF_FFFF_FFFF);
    }

    #[test]
    fn test_freeze_toggle() {
        let win = Arc::new(SimWindow::new(0x48));
        win.poke(gperf::FAB_CTL.offset, (7 << 16) | (1 << 23));
        let table = table_with(Arc::clone(&win));

        let guard = table.lock();
        assert!(!FABRIC.is_frozen(&guard, GPERF).unwrap());
        FABRIC.set_frozen(&guard, GPERF, true).unwrap();
        assert!(FABRIC.is_frozen(&guard, GPERF).unwrap());
        assert_eq!(win.peek(gperf::FAB_CTL.offset), (7 << 16) | (1 << 23) | (1 << 8));
        FABRIC.set_frozen(&guard, GPERF, false).unwrap();
        assert_eq!(win.peek(gperf::FAB_CTL.offset), (7 << 16) | (1 << 23));
    }
}
