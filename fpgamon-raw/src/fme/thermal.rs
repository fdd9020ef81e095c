//! Thermal management feature (`fme_thermal`)

use crate::fme::header::FeatureHeader;
use crate::register::Register;

/// Highest temperature threshold software may program, in degrees Celsius
pub const TEMP_THRESHOLD_MAX: u64 = 100;

/// Threshold policy values accepted by `threshold1_policy`
pub const POLICY_AP1: u64 = 0;
pub const POLICY_AP2: u64 = 1;

csr! {
    /// Temperature threshold control and status
    ///
    /// | Bits  | Field               |
    /// |-------|---------------------|
    /// | 0-6   | threshold1          |
    /// | 7     | threshold1 enable   |
    /// | 8-14  | threshold2          |
    /// | 15    | threshold2 enable   |
    /// | 16-22 | proc hot set point  |
    /// | 24-30 | thermal trip        |
    /// | 32    | threshold1 status   |
    /// | 33    | threshold2 status   |
    /// | 35    | trip status         |
    /// | 44    | threshold policy    |
    pub struct TempThreshold {
        threshold1, set_threshold1: 0, 7;
        threshold1_enable, set_threshold1_enable: 7, 1;
        threshold2, set_threshold2: 8, 7;
        threshold2_enable, set_threshold2_enable: 15, 1;
        pro_hot_setpoint, set_pro_hot_setpoint: 16, 7;
        trip_threshold, set_trip_threshold: 24, 7;
        threshold1_status, set_threshold1_status: 32, 1;
        threshold2_status, set_threshold2_status: 33, 1;
        trip_status, set_trip_status: 35, 1;
        policy, set_policy: 44, 1;
    }
}

csr! {
    /// Temperature sensor read-out, format 1
    pub struct TempSensor {
        fpga_temp, set_fpga_temp: 0, 7;
        reading_seq_num, set_reading_seq_num: 8, 16;
        reading_valid, set_reading_valid: 24, 1;
        dbg_mode, set_dbg_mode: 32, 10;
    }
}

pub const HEADER: Register<FeatureHeader> = Register::new(0x00);
pub const THRESHOLD: Register<TempThreshold> = Register::new(0x08);
pub const RDSENSOR_FMT1: Register<TempSensor> = Register::new(0x10);
