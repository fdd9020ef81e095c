use std::sync::Arc;

use fpgamon::common::NoDelay;
use fpgamon::fme::ioctl::{self, FmePort, IrqSet};
use fpgamon::fme::sim::{cache_counts, fabric_count, vtd_count};
use fpgamon::{FmeDevice, FpgaError, PortAssignments, SimulatedFme};
use fpgamon_raw::fme::error as err;
use fpgamon_raw::fme::feature_id;
use fpgamon_raw::fme::gperf::{self, cache_event, channel, fab_event, vtd_event};

fn setup() -> (SimulatedFme, Arc<PortAssignments>, FmeDevice) {
    let sim = SimulatedFme::new();
    let ports = Arc::new(PortAssignments::default());
    let device = FmeDevice::open_bar(sim.domain(), Arc::new(NoDelay), ports.clone()).unwrap();
    (sim, ports, device)
}

fn hex(value: u64) -> String {
    format!("0x{value:x}\n")
}

#[test]
fn test_exclusive_open() {
    let (_sim, _ports, device) = setup();

    device.open(true).unwrap();
    assert!(matches!(device.open(false), Err(FpgaError::Busy(_))));
    assert!(matches!(device.open(true), Err(FpgaError::Busy(_))));
    device.release().unwrap();

    device.open(false).unwrap();
    device.open(false).unwrap();
    assert!(matches!(device.open(true), Err(FpgaError::Busy(_))));
    device.release().unwrap();
    device.release().unwrap();
    assert!(device.release().is_err());
}

#[test]
fn test_last_close_unbinds_error_interrupts() {
    let (_sim, _ports, device) = setup();

    let mut num = [0u8; 4];
    device.ioctl(ioctl::FPGA_FME_ERR_GET_IRQ_NUM, &mut num).unwrap();
    assert_eq!(ioctl::get_u32(&num).unwrap(), 4);

    device.open(false).unwrap();
    device.open(false).unwrap();
    let mut set = IrqSet { start: 1, vectors: vec![40, 41] }.encode();
    device.ioctl(ioctl::FPGA_FME_ERR_SET_IRQ, &mut set).unwrap();
    assert_eq!(device.irq_bindings().unwrap(), vec![None, Some(40), Some(41), None]);

    device.release().unwrap();
    assert_eq!(device.irq_bindings().unwrap()[1], Some(40));
    device.release().unwrap();
    assert_eq!(device.irq_bindings().unwrap(), vec![None; 4]);
}

#[test]
fn test_counters_through_the_namespace() {
    let (sim, _ports, device) = setup();

    let (even, odd) = cache_counts(cache_event::WR_HIT, channel::WR);
    assert_eq!(device.show("perf/cache/write_hit").unwrap(), hex(even + odd));
    let ctl: gperf::CacheCtl = sim.peek(feature_id::GLOBAL_PERF, gperf::CACHE_CTL);
    assert_eq!(ctl.cache_event(), cache_event::WR_HIT);
    assert_eq!(ctl.cci_chsel(), channel::WR);

    assert_eq!(
        device.show("perf/iommu/afu1/tlb_read_hit").unwrap(),
        hex(vtd_count(vtd_event::AFU_TLB_RD_HIT + 1))
    );
    assert_eq!(
        device.show("perf/fabric/mmio_read").unwrap(),
        hex(fabric_count(fab_event::MMIO_RD, None))
    );
}

#[test]
fn test_fabric_scope_switch() {
    let (sim, _ports, device) = setup();

    device.store("perf/fabric/port1/enable", "1").unwrap();
    assert_eq!(device.show("perf/fabric/enable").unwrap(), "0\n");
    assert_eq!(device.show("perf/fabric/upi_write").unwrap(), "0x0\n");
    assert_eq!(
        device.show("perf/fabric/port1/upi_write").unwrap(),
        hex(fabric_count(fab_event::UPI_WR, Some(1)))
    );

    let ctl: gperf::FabCtl = sim.peek(feature_id::GLOBAL_PERF, gperf::FAB_CTL);
    assert_eq!(ctl.port_filter(), gperf::FAB_ENABLE_FILTER);
    assert_eq!(ctl.port_id(), 1);

    device.store("perf/fabric/enable", "y").unwrap();
    assert_eq!(device.show("perf/fabric/port1/enable").unwrap(), "0\n");
    assert!(device.store("perf/fabric/enable", "0").is_err());
}

#[test]
fn test_freeze_keeps_selection() {
    let (sim, _ports, device) = setup();

    device.show("perf/cache/rx_eviction").unwrap();
    device.store("perf/cache/freeze", "1").unwrap();
    let ctl: gperf::CacheCtl = sim.peek(feature_id::GLOBAL_PERF, gperf::CACHE_CTL);
    assert_eq!(ctl.freeze(), 1);
    assert_eq!(ctl.cache_event(), cache_event::EVICTIONS);

    device.show("perf/cache/read_hit").unwrap();
    assert_eq!(device.show("perf/cache/freeze").unwrap(), "1\n");
}

#[test]
fn test_error_compare_and_clear() {
    let (sim, _ports, device) = setup();
    sim.raise(err::FME_ERR, 0x3);
    assert_eq!(device.show("errors/fme-errors/errors").unwrap(), "0x3\n");

    // a stale snapshot leaves the latched bits alone
    assert!(matches!(
        device.store("errors/fme-errors/clear", "0x1"),
        Err(FpgaError::Busy(_))
    ));
    assert_eq!(device.show("errors/fme-errors/errors").unwrap(), "0x3\n");
    assert_eq!(
        sim.peek(feature_id::GLOBAL_ERR, err::FME_ERR_MASK),
        err::FME_ERROR0_MASK_DEFAULT
    );

    device.store("errors/fme-errors/clear", "0x3\n").unwrap();
    assert_eq!(device.show("errors/fme-errors/errors").unwrap(), "0x0\n");
    assert_eq!(
        sim.peek(feature_id::GLOBAL_ERR, err::FME_ERR_MASK),
        err::FME_ERROR0_MASK_DEFAULT
    );

    sim.raise(err::PCIE1_ERR, 0x10);
    device.store("errors/pcie1_errors", "16").unwrap();
    assert_eq!(device.show("errors/pcie1_errors").unwrap(), "0x0\n");
}

#[test]
fn test_injected_warning_clears() {
    let (_sim, _ports, device) = setup();
    device.store("errors/inject_error", "0x4").unwrap();
    assert_eq!(device.show("errors/warning_errors").unwrap(), "0x1\n");
    device.store("errors/warning_errors", "1").unwrap();
    assert_eq!(device.show("errors/warning_errors").unwrap(), "0x0\n");
}

#[test]
fn test_request_dispatch() {
    let (_sim, ports, device) = setup();

    let mut arg = [0u8; 12];
    FmePort { flags: 0, port_id: 0 }.encode(&mut arg).unwrap();
    device.ioctl(ioctl::FPGA_FME_PORT_RELEASE, &mut arg).unwrap();
    assert!(ports.is_released(0));

    assert!(matches!(
        device.ioctl(ioctl::FPGA_FME_PORT_PR, &mut arg),
        Err(FpgaError::Unsupported(_))
    ));
    assert_eq!(device.ioctl(ioctl::FPGA_GET_API_VERSION, &mut []).unwrap(), 0);
}

#[test]
fn test_thermal_and_power_controls() {
    let (_sim, _ports, device) = setup();
    device.store("thermal_mgmt/threshold1", "85").unwrap();
    assert_eq!(device.show("thermal_mgmt/threshold1").unwrap(), "85\n");
    assert_eq!(device.show("thermal_mgmt/threshold_trip").unwrap(), "95\n");
    assert!(device.store("power_mgmt/threshold1", "0x80").is_err());
    device.store("power_mgmt/threshold1", "0x40").unwrap();
    assert_eq!(device.show("power_mgmt/threshold1").unwrap(), "0x40\n");
}
