//! Thermal management feature (`thermal_mgmt` group)

use fpgamon_raw::fme::feature_id;
use fpgamon_raw::fme::header;
use fpgamon_raw::fme::thermal::{self, TempThreshold, POLICY_AP1, POLICY_AP2, TEMP_THRESHOLD_MAX};

use crate::common::mmio::CsrAccess;
use crate::common::text::{parse_u8, show_dec};
use crate::error::{FpgaError, Result};
use crate::feature::{AttrGroup, Attribute, FeatureDriver, FeatureTable};

const GROUP: &str = "thermal_mgmt";

pub struct ThermalDriver;

#[derive(Clone, Copy)]
enum Threshold {
    One,
    Two,
}

impl Threshold {
    fn get(self, csr: &TempThreshold) -> u64 {
        match self {
            Threshold::One => csr.threshold1(),
            Threshold::Two => csr.threshold2(),
        }
    }

    fn set(self, csr: &mut TempThreshold, value: u64) {
        let enable = u64::from(value != 0);
        match self {
            Threshold::One => {
                csr.set_threshold1_enable(enable);
                csr.set_threshold1(value);
            }
            Threshold::Two => {
                csr.set_threshold2_enable(enable);
                csr.set_threshold2(value);
            }
        }
    }
}

/// Program a temperature threshold; 0 disables it
///
/// Refused while the FME capability lock bit is set.
fn store_threshold(table: &FeatureTable, index: usize, which: Threshold, input: &str) -> Result<()> {
    let guard = table.lock();
    let window = guard.window(index)?;
    let mut csr = window.read_csr(thermal::THRESHOLD)?;
    let value = u64::from(parse_u8(input)?);

    let capability = guard.window(feature_id::HEADER)?.read_csr(header::CAPABILITY)?;
    if capability.lock_bit() == 1 {
        return Err(FpgaError::busy("thermal thresholds are locked"));
    }
    if value > TEMP_THRESHOLD_MAX {
        return Err(FpgaError::invalid(format!(
            "threshold {value} above {TEMP_THRESHOLD_MAX}"
        )));
    }

    which.set(&mut csr, value);
    window.write_csr(thermal::THRESHOLD, csr)
}

fn store_policy(table: &FeatureTable, index: usize, input: &str) -> Result<()> {
    let guard = table.lock();
    let window = guard.window(index)?;
    let mut csr = window.read_csr(thermal::THRESHOLD)?;
    let policy = u64::from(parse_u8(input)?);
    if policy != POLICY_AP1 && policy != POLICY_AP2 {
        return Err(FpgaError::invalid(format!("threshold policy {policy} is not 0 or 1")));
    }
    csr.set_policy(policy);
    window.write_csr(thermal::THRESHOLD, csr)
}

fn threshold_field(index: usize, name: &'static str, field: fn(&TempThreshold) -> u64) -> Attribute {
    Attribute::ro(name, move |t| Ok(show_dec(field(&t.read_csr(index, thermal::THRESHOLD)?))))
}

fn threshold_attr(index: usize, name: &'static str, which: Threshold) -> Attribute {
    Attribute::rw(
        name,
        move |t| Ok(show_dec(which.get(&t.read_csr(index, thermal::THRESHOLD)?))),
        move |t, v| store_threshold(t, index, which, v),
    )
}

fn attrs(index: usize) -> Vec<Attribute> {
    vec![
        Attribute::ro("revision", move |t| {
            Ok(show_dec(t.read_csr(index, thermal::HEADER)?.revision()))
        }),
        threshold_attr(index, "threshold1", Threshold::One),
        threshold_attr(index, "threshold2", Threshold::Two),
        threshold_field(index, "threshold_trip", TempThreshold::trip_threshold),
        threshold_field(index, "threshold1_reached", TempThreshold::threshold1_status),
        threshold_field(index, "threshold2_reached", TempThreshold::threshold2_status),
        Attribute::rw(
            "threshold1_policy",
            move |t| Ok(show_dec(t.read_csr(index, thermal::THRESHOLD)?.policy())),
            move |t, v| store_policy(t, index, v),
        ),
        Attribute::ro("temperature", move |t| {
            Ok(show_dec(t.read_csr(index, thermal::RDSENSOR_FMT1)?.fpga_temp()))
        }),
    ]
}

impl FeatureDriver for ThermalDriver {
    fn name(&self) -> &'static str {
        "fme_thermal"
    }

    fn init(&self, table: &FeatureTable, index: usize) -> Result<()> {
        table
            .namespace()
            .add_group("", AttrGroup::named(GROUP, attrs(index)))
    }

    fn uninit(&self, table: &FeatureTable, _index: usize) {
        table.namespace().remove_group("", Some(GROUP));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::sim::SimWindow;
    use std::sync::Arc;

    fn setup() -> (Arc<SimWindow>, Arc<SimWindow>, FeatureTable) {
        let hdr = Arc::new(SimWindow::new(0x70));
        let win = Arc::new(SimWindow::new(0x20));
        win.poke(thermal::RDSENSOR_FMT1.offset, 57);
        let mut table = FeatureTable::attach("fme", 2).unwrap();
        table.add_feature(feature_id::HEADER, "fme_hdr", hdr.clone()).unwrap();
        table
            .add_feature(feature_id::THERMAL_MGMT, "fme_thermal", win.clone())
            .unwrap();
        let drivers: Vec<Arc<dyn FeatureDriver>> = vec![Arc::new(ThermalDriver)];
        table.init_all(&drivers).unwrap();
        (hdr, win, table)
    }

    #[test]
    fn test_threshold_enable_and_disable() {
        let (_hdr, win, table) = setup();
        table.store("thermal_mgmt/threshold1", "90\n").unwrap();
        assert_eq!(win.peek(thermal::THRESHOLD.offset), 90 | (1 << 7));
        assert_eq!(table.show("thermal_mgmt/threshold1").unwrap(), "90\n");

        table.store("thermal_mgmt/threshold2", "0x10").unwrap();
        table.store("thermal_mgmt/threshold1", "0").unwrap();
        assert_eq!(win.peek(thermal::THRESHOLD.offset), (0x10 << 8) | (1 << 15));
    }

    #[test]
    fn test_threshold_limits() {
        let (_hdr, win, table) = setup();
        assert!(matches!(
            table.store("thermal_mgmt/threshold1", "101"),
            Err(FpgaError::InvalidArgument(_))
        ));
        assert!(matches!(
            table.store("thermal_mgmt/threshold1", "300"),
            Err(FpgaError::InvalidArgument(_))
        ));
        assert!(win.writes_to(thermal::THRESHOLD.offset).is_empty());
    }

    #[test]
    fn test_locked_thresholds() {
        let (hdr, win, table) = setup();
        hdr.poke(header::CAPABILITY.offset, 1 << 63);
        assert!(matches!(
            table.store("thermal_mgmt/threshold2", "50"),
            Err(FpgaError::Busy(_))
        ));
        assert_eq!(win.write_count(), 0);
    }

    #[test]
    fn test_policy_and_sensor() {
        let (_hdr, win, table) = setup();
        table.store("thermal_mgmt/threshold1_policy", "1").unwrap();
        assert_eq!(win.peek(thermal::THRESHOLD.offset), 1 << 44);
        assert!(table.store("thermal_mgmt/threshold1_policy", "2").is_err());
        assert_eq!(table.show("thermal_mgmt/temperature").unwrap(), "57\n");
    }
}
