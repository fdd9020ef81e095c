//! Fabric port filter: one scope active at a time

use fpgamon_raw::fme::gperf::{self, FabCtl, FAB_DISABLE_FILTER, FAB_ENABLE_FILTER, PERF_MAX_PORT_NUM};

use crate::common::mmio::CsrAccess;
use crate::common::poll::Delay;
use crate::counters::events::FabricEvent;
use crate::counters::mux::FABRIC;
use crate::counters::tree::PerfId;
use crate::error::{FpgaError, Result};
use crate::feature::table::DeviceGuard;

fn check_port(id: PerfId) -> Result<()> {
    match id {
        PerfId::Index(n) if n >= PERF_MAX_PORT_NUM => Err(FpgaError::invalid(format!(
            "fabric port {n} beyond {PERF_MAX_PORT_NUM} ports"
        ))),
        _ => Ok(()),
    }
}

/// Whether `id` is the scope the fabric bank currently counts for
///
/// With filtering off only the root scope is active.
pub fn is_enabled(guard: &DeviceGuard<'_>, index: usize, id: PerfId) -> Result<bool> {
    let ctl = guard.window(index)?.read_csr(gperf::FAB_CTL)?;
    Ok(filter_matches(ctl, id))
}

fn filter_matches(ctl: FabCtl, id: PerfId) -> bool {
    match (ctl.port_filter() == FAB_DISABLE_FILTER, id) {
        (true, id) => id == PerfId::Root,
        (false, PerfId::Index(n)) => ctl.port_id() == u64::from(n),
        (false, PerfId::Root) => false,
    }
}

/// Make `id` the active scope; returns whether the control register was written
///
/// There is no disable: enabling one scope replaces whatever was active.
pub fn enable(guard: &DeviceGuard<'_>, index: usize, id: PerfId) -> Result<bool> {
    check_port(id)?;
    let window = guard.window(index)?;
    let mut ctl = window.read_csr(gperf::FAB_CTL)?;
    if filter_matches(ctl, id) {
        return Ok(false);
    }

    match id {
        PerfId::Root => ctl.set_port_filter(FAB_DISABLE_FILTER),
        PerfId::Index(n) => {
            ctl.set_port_filter(FAB_ENABLE_FILTER);
            ctl.set_port_id(u64::from(n));
        }
    }
    window.write_csr(gperf::FAB_CTL, ctl)?;
    tracing::debug!("Fabric filter moved to scope {}", id);
    Ok(true)
}

/// Count of `event` for scope `id`, or 0 when another scope is active
pub fn read(
    guard: &DeviceGuard<'_>,
    index: usize,
    id: PerfId,
    event: FabricEvent,
    delay: &dyn Delay,
) -> Result<u64> {
    check_port(id)?;
    if !is_enabled(guard, index, id)? {
        return Ok(0);
    }
    FABRIC.read(guard, index, event.code(), 0, delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::poll::NoDelay;
    use crate::common::sim::SimWindow;
    use crate::feature::table::FeatureTable;
    use std::sync::Arc;

    fn setup() -> (Arc<SimWindow>, FeatureTable) {
        let win = Arc::new(SimWindow::new(0x48));
        let mut table = FeatureTable::attach("fab", 1).unwrap();
        table.add_feature(0, "fme_gperf", win.clone()).unwrap();
        (win, table)
    }

    #[test]
    fn test_enable_switches_ports() {
        let (win, table) = setup();
        let guard = table.lock();
        assert!(enable(&guard, 0, PerfId::Index(0)).unwrap());
        win.reset_counters();

        assert!(enable(&guard, 0, PerfId::Index(1)).unwrap());
        assert_eq!(win.write_count(), 1);
        assert!(!is_enabled(&guard, 0, PerfId::Index(0)).unwrap());
        assert!(is_enabled(&guard, 0, PerfId::Index(1)).unwrap());
        assert!(!is_enabled(&guard, 0, PerfId::Root).unwrap());
    }

    #[test]
    fn test_enable_active_scope_writes_nothing() {
        let (win, table) = setup();
        let guard = table.lock();
        // filter off after reset: root is active
        assert!(is_enabled(&guard, 0, PerfId::Root).unwrap());
        assert!(!enable(&guard, 0, PerfId::Root).unwrap());
        assert_eq!(win.write_count(), 0);
    }

    #[test]
    fn test_root_clears_filter_keeps_event() {
        let (win, table) = setup();
        win.poke(gperf::FAB_CTL.offset, (5 << 16) | (1 << 23) | (1 << 20));
        let guard = table.lock();
        assert!(enable(&guard, 0, PerfId::Root).unwrap());
        assert_eq!(win.peek(gperf::FAB_CTL.offset), (5 << 16) | (1 << 20));
    }

    #[test]
    fn test_inactive_scope_reads_zero() {
        let (win, table) = setup();
        let guard = table.lock();
        assert_eq!(
            read(&guard, 0, PerfId::Index(1), FabricEvent::UpiRead, &NoDelay).unwrap(),
            0
        );
        assert_eq!(win.write_count(), 0);
        assert_eq!(win.reads_of(gperf::FAB_CTR.offset), 0);
    }

    #[test]
    fn test_port_out_of_range() {
        let (_win, table) = setup();
        let guard = table.lock();
        assert!(matches!(
            enable(&guard, 0, PerfId::Index(PERF_MAX_PORT_NUM)),
            Err(FpgaError::InvalidArgument(_))
        ));
    }
}
