//! Simulated FME hardware
//!
//! One BAR-sized [`SimWindow`] laid out as a DFH chain with every FME
//! feature in a 4 KiB window. Counter banks echo the selected event code
//! back into their counter registers, error registers are write-1-to-clear,
//! and error injection latches a warning.

use std::sync::Arc;

use fpgamon_raw::fme::error as err;
use fpgamon_raw::fme::gperf::{self, CacheCtl, CacheCtr, FabCtl, FabCtr, VtdCtl, VtdCtr};
use fpgamon_raw::fme::header::{self, Capability, FeatureHeader, FEATURE_TYPE_FIU, FEATURE_TYPE_PRIVATE};
use fpgamon_raw::fme::{feature_id, power, thermal, FEATURE_WINDOW_SIZE, FME_FEATURE_NUM};
use fpgamon_raw::{Register, RegisterLayout};

use crate::common::mmio::RegisterDomain;
use crate::common::sim::{RegKind, SimBank, SimWindow};

/// Byte offset of feature `id` inside the simulated BAR
pub const fn feature_base(id: usize) -> u64 {
    id as u64 * FEATURE_WINDOW_SIZE
}

/// Counts the simulated cache bank reports for `event` on `channel`
///
/// Returns the (even, odd) halves, summed by the reader.
pub fn cache_counts(event: u64, channel: u64) -> (u64, u64) {
    (0x1000 * (event + 1) + channel, event + 1)
}

/// Count the simulated fabric reports for `event` under the current filter
pub fn fabric_count(event: u64, port: Option<u64>) -> u64 {
    0x100 * (event + 1) + port.map_or(0, |p| p + 1)
}

pub fn vtd_count(event: u64) -> u64 {
    0x10 * (event + 1)
}

pub struct SimulatedFme {
    bar: Arc<SimWindow>,
}

impl Default for SimulatedFme {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedFme {
    pub fn new() -> Self {
        let bar = Arc::new(SimWindow::new(FME_FEATURE_NUM as u64 * FEATURE_WINDOW_SIZE));
        let fme = Self { bar };
        fme.build_chain();
        fme.program_identity();
        fme.wire_counters();
        fme.wire_errors();
        fme
    }

    pub fn bar(&self) -> Arc<SimWindow> {
        Arc::clone(&self.bar)
    }

    /// The BAR as a plain register domain, ready for discovery
    pub fn domain(&self) -> Arc<dyn RegisterDomain> {
        self.bar()
    }

    pub fn peek<T: RegisterLayout>(&self, id: usize, reg: Register<T>) -> T {
        T::from_csr(self.bar.peek(reg.at(feature_base(id)).offset))
    }

    pub fn poke<T: RegisterLayout>(&self, id: usize, reg: Register<T>, value: T) {
        self.bar.poke(reg.at(feature_base(id)).offset, value.to_csr());
    }

    pub fn writes_to<T: RegisterLayout>(&self, id: usize, reg: Register<T>) -> Vec<u64> {
        self.bar.writes_to(reg.at(feature_base(id)).offset)
    }

    /// Latch error bits as the hardware would
    pub fn raise(&self, reg: Register<u64>, bits: u64) {
        let offset = reg.at(feature_base(feature_id::GLOBAL_ERR)).offset;
        self.bar.poke(offset, self.bar.peek(offset) | bits);
    }

    fn build_chain(&self) {
        for id in 0..FME_FEATURE_NUM {
            let mut dfh = FeatureHeader(0);
            dfh.set_id(id as u64);
            dfh.set_revision(1);
            if id + 1 < FME_FEATURE_NUM {
                dfh.set_next_header_offset(FEATURE_WINDOW_SIZE);
            }
            dfh.set_feature_type(if id == feature_id::HEADER {
                FEATURE_TYPE_FIU
            } else {
                FEATURE_TYPE_PRIVATE
            });
            self.poke(id, header::HEADER, dfh);
        }
    }

    fn program_identity(&self) {
        let mut cap = Capability(0);
        cap.set_fabric_verid(1);
        cap.set_pci0_link_avail(1);
        cap.set_qpi_link_avail(1);
        cap.set_iommu_support(1);
        cap.set_num_ports(2);
        cap.set_address_width_bits(38);
        cap.set_cache_size(0x200);
        self.poke(feature_id::HEADER, header::CAPABILITY, cap);
        self.poke(feature_id::HEADER, header::BITSTREAM_ID, 0x0621_1000_0000_0001);
        self.poke(feature_id::HEADER, header::BITSTREAM_MD, 0x1801_2501);

        let mut trip = thermal::TempThreshold(0);
        trip.set_trip_threshold(95);
        self.poke(feature_id::THERMAL_MGMT, thermal::THRESHOLD, trip);
        let mut sensor = thermal::TempSensor(0);
        sensor.set_fpga_temp(48);
        sensor.set_reading_valid(1);
        self.poke(feature_id::THERMAL_MGMT, thermal::RDSENSOR_FMT1, sensor);

        let mut status = power::PmStatus(0);
        status.set_pwr_consumed(0x1F);
        self.poke(feature_id::POWER_MGMT, power::STATUS, status);

        self.poke(feature_id::GLOBAL_PERF, gperf::CLK, 400_000_000);

        let mut cap = err::ErrorCap(0);
        cap.set_supp_int(1);
        cap.set_int_vect(4);
        self.poke(feature_id::GLOBAL_ERR, err::ERROR_CAP, cap);
    }

    fn wire_counters(&self) {
        let base = feature_base(feature_id::GLOBAL_PERF);
        let ctr0 = gperf::CACHE_CTR0.at(base).offset;
        let ctr1 = gperf::CACHE_CTR1.at(base).offset;
        self.bar.on_write(gperf::CACHE_CTL.at(base).offset, move |bank: &mut SimBank, value| {
            let ctl = CacheCtl::from_csr(value);
            let (even, odd) = cache_counts(ctl.cache_event(), ctl.cci_chsel());
            bank.set(ctr0, echo_cache(ctl.cache_event(), even));
            bank.set(ctr1, echo_cache(ctl.cache_event(), odd));
        });

        let fab_ctr = gperf::FAB_CTR.at(base).offset;
        self.bar.on_write(gperf::FAB_CTL.at(base).offset, move |bank: &mut SimBank, value| {
            let ctl = FabCtl::from_csr(value);
            let port = (ctl.port_filter() == gperf::FAB_ENABLE_FILTER).then(|| ctl.port_id());
            let mut ctr = FabCtr(0);
            ctr.set_event_code(ctl.fab_evtcode());
            ctr.set_fab_cnt(fabric_count(ctl.fab_evtcode(), port));
            bank.set(fab_ctr, ctr.to_csr());
        });

        let vtd_ctr = gperf::VTD_CTR.at(base).offset;
        self.bar.on_write(gperf::VTD_CTL.at(base).offset, move |bank: &mut SimBank, value| {
            let ctl = VtdCtl::from_csr(value);
            let mut ctr = VtdCtr(0);
            ctr.set_event_code(ctl.vtd_evtcode());
            ctr.set_vtd_counter(vtd_count(ctl.vtd_evtcode()));
            bank.set(vtd_ctr, ctr.to_csr());
        });

        // Power-on selection: cache event 0, fabric event 0 unfiltered
        self.bar.poke(ctr0, echo_cache(0, cache_counts(0, 0).0));
        self.bar.poke(ctr1, echo_cache(0, cache_counts(0, 0).1));
    }

    fn wire_errors(&self) {
        let base = feature_base(feature_id::GLOBAL_ERR);
        for reg in [err::FME_ERR, err::PCIE0_ERR, err::PCIE1_ERR, err::RAS_GERR, err::RAS_BERR] {
            self.bar.set_kind(reg.at(base).offset, RegKind::WriteOneToClear);
        }
        let werr = err::RAS_WERR.at(base).offset;
        self.bar.set_kind(werr, RegKind::WriteOneToClear);

        self.bar.on_write(err::RAS_ERROR_INJ.at(base).offset, move |bank: &mut SimBank, value| {
            let inj = err::RasErrorInj(value);
            if inj.warning_error() == 1 {
                let latched = bank.get(werr) | 1;
                bank.set(werr, latched);
            }
        });
    }
}

fn echo_cache(event: u64, count: u64) -> u64 {
    let mut ctr = CacheCtr(0);
    ctr.set_event_code(event);
    ctr.set_cache_counter(count);
    ctr.to_csr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::mmio::CsrAccess;

    #[test]
    fn test_chain_layout() {
        let fme = SimulatedFme::new();
        let last: FeatureHeader = fme.peek(feature_id::PR_MGMT, header::HEADER);
        assert_eq!(last.id(), feature_id::PR_MGMT as u64);
        assert_eq!(last.next_header_offset(), 0);
        let first: FeatureHeader = fme.peek(feature_id::HEADER, header::HEADER);
        assert_eq!(first.feature_type(), FEATURE_TYPE_FIU);
    }

    #[test]
    fn test_cache_select_echoes() {
        let fme = SimulatedFme::new();
        let bar = fme.bar();
        let base = feature_base(feature_id::GLOBAL_PERF);
        let mut ctl = CacheCtl(0);
        ctl.set_cache_event(3);
        ctl.set_cci_chsel(1);
        bar.write_csr(gperf::CACHE_CTL.at(base), ctl).unwrap();

        let ctr: CacheCtr = bar.read_csr(gperf::CACHE_CTR0.at(base)).unwrap();
        assert_eq!(ctr.event_code(), 3);
        assert_eq!(ctr.cache_counter(), cache_counts(3, 1).0);
    }

    #[test]
    fn test_injection_latches_warning() {
        let fme = SimulatedFme::new();
        let bar = fme.bar();
        let base = feature_base(feature_id::GLOBAL_ERR);
        bar.write_csr(err::RAS_ERROR_INJ.at(base), err::RasErrorInj(0x4)).unwrap();
        assert_eq!(fme.peek(feature_id::GLOBAL_ERR, err::RAS_WERR).event_warn_err(), 1);

        bar.write_csr(err::RAS_WERR.at(base), err::RasWarnError(1)).unwrap();
        assert_eq!(fme.peek(feature_id::GLOBAL_ERR, err::RAS_WERR).0, 0);
    }
}
