//! Power management feature (`power_mgmt` group)

use fpgamon_raw::fme::power::{self, PmApThreshold, PmStatus, PWR_THRESHOLD_MAX};

use crate::common::mmio::CsrAccess;
use crate::common::text::{parse_u8, show_dec, show_hex};
use crate::error::{FpgaError, Result};
use crate::feature::{AttrGroup, Attribute, FeatureDriver, FeatureTable};

const GROUP: &str = "power_mgmt";

pub struct PowerDriver;

fn store_threshold(
    table: &FeatureTable,
    index: usize,
    input: &str,
    set: fn(&mut PmApThreshold, u64),
) -> Result<()> {
    let guard = table.lock();
    let window = guard.window(index)?;
    let mut csr = window.read_csr(power::AP_THRESHOLD)?;
    let value = u64::from(parse_u8(input)?);
    if value > PWR_THRESHOLD_MAX {
        return Err(FpgaError::invalid(format!(
            "power threshold 0x{value:x} above 0x{PWR_THRESHOLD_MAX:x}"
        )));
    }
    set(&mut csr, value);
    window.write_csr(power::AP_THRESHOLD, csr)
}

fn threshold_attr(
    index: usize,
    name: &'static str,
    get: fn(&PmApThreshold) -> u64,
    set: fn(&mut PmApThreshold, u64),
) -> Attribute {
    Attribute::rw(
        name,
        move |t| Ok(show_hex(get(&t.read_csr(index, power::AP_THRESHOLD)?))),
        move |t, v| store_threshold(t, index, v, set),
    )
}

fn status_attr(index: usize, name: &'static str, get: fn(&PmApThreshold) -> u64) -> Attribute {
    Attribute::ro(name, move |t| Ok(show_dec(get(&t.read_csr(index, power::AP_THRESHOLD)?))))
}

fn attrs(index: usize) -> Vec<Attribute> {
    vec![
        Attribute::ro("revision", move |t| {
            Ok(show_dec(t.read_csr(index, power::HEADER)?.revision()))
        }),
        Attribute::ro("consumed", move |t| {
            Ok(show_hex(t.read_csr(index, power::STATUS)?.pwr_consumed()))
        }),
        threshold_attr(
            index,
            "threshold1",
            PmApThreshold::threshold1,
            PmApThreshold::set_threshold1,
        ),
        threshold_attr(
            index,
            "threshold2",
            PmApThreshold::threshold2,
            PmApThreshold::set_threshold2,
        ),
        status_attr(index, "threshold1_status", PmApThreshold::threshold1_status),
        status_attr(index, "threshold2_status", PmApThreshold::threshold2_status),
        Attribute::ro("rtl", move |t| {
            let status: PmStatus = t.read_csr(index, power::STATUS)?;
            Ok(show_dec(status.fpga_latency_report()))
        }),
    ]
}

impl FeatureDriver for PowerDriver {
    fn name(&self) -> &'static str {
        "fme_power"
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
