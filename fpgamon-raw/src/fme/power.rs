//! Power management feature (`fme_power`)

use crate::fme::header::FeatureHeader;
use crate::register::Register;

/// Highest AP threshold value, in 5ns clocks
pub const PWR_THRESHOLD_MAX: u64 = 0x7F;

csr! {
    /// Power status
    pub struct PmStatus {
        pwr_consumed, set_pwr_consumed: 0, 18;
        fpga_latency_report, set_fpga_latency_report: 18, 1;
    }
}

csr! {
    /// AP thresholds
    pub struct PmApThreshold {
        threshold1, set_threshold1: 0, 7;
        threshold2, set_threshold2: 8, 7;
        threshold1_status, set_threshold1_status: 16, 1;
        threshold2_status, set_threshold2_status: 17, 1;
    }
}

pub const HEADER: Register<FeatureHeader> = Register::new(0x00);
pub const STATUS: Register<PmStatus> = Register::new(0x08);
pub const AP_THRESHOLD: Register<PmApThreshold> = Register::new(0x10);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_layout() {
        let st = PmStatus(0x3_FFFF | (1 << 18) | (1 << 40));
        assert_eq!(st.pwr_consumed(), 0x3_FFFF);
        assert_eq!(st.fpga_latency_report(), 1);
    }

    #[test]
    fn test_threshold_setters_keep_status_bits() {
        let mut th = PmApThreshold(1 << 17);
        th.set_threshold2(PWR_THRESHOLD_MAX);
        assert_eq!(th.threshold2(), 0x7F);
        assert_eq!(th.threshold2_status(), 1);
        assert_eq!(th.threshold1(), 0);
    }
}
