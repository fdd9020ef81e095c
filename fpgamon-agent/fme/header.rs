//! FME header feature: device identity attributes and port management requests

use std::sync::Arc;

use fpgamon_raw::fme::header::{self, Capability};
use fpgamon_raw::Register;

use crate::common::text::{show_dec, show_hex};
use crate::error::{FpgaError, Result};
use crate::feature::{AttrGroup, Attribute, FeatureDriver, FeatureTable};
use crate::fme::ioctl::{self, FmeInfo, FmePort};
use crate::fme::PortControl;

pub struct HeaderDriver {
    ports: Arc<dyn PortControl>,
}

impl HeaderDriver {
    pub fn new(ports: Arc<dyn PortControl>) -> Self {
        Self { ports }
    }
}

fn cap_attr(index: usize, name: &'static str, field: fn(&Capability) -> u64) -> Attribute {
    Attribute::ro(name, move |t| Ok(show_dec(field(&t.read_csr(index, header::CAPABILITY)?))))
}

fn hex_attr(index: usize, name: &'static str, reg: Register<u64>) -> Attribute {
    Attribute::ro(name, move |t| Ok(show_hex(t.read_csr(index, reg)?)))
}

fn attrs(index: usize) -> Vec<Attribute> {
    vec![
        Attribute::ro("revision", move |t| {
            Ok(show_dec(t.read_csr(index, header::HEADER)?.revision()))
        }),
        cap_attr(index, "ports_num", Capability::num_ports),
        cap_attr(index, "cache_size", Capability::cache_size),
        cap_attr(index, "version", Capability::fabric_verid),
        cap_attr(index, "socket_id", Capability::socket_id),
        hex_attr(index, "bitstream_id", header::BITSTREAM_ID),
        hex_attr(index, "bitstream_metadata", header::BITSTREAM_MD),
    ]
}

impl HeaderDriver {
    fn get_info(&self, table: &FeatureTable, index: usize, arg: &mut [u8]) -> Result<i64> {
        let capability = table.read_csr(index, header::CAPABILITY)?;
        let info = FmeInfo {
            flags: 0,
            // the ABI carries the low 32 bits only
            capability: capability.0 as u32,
        };
        info.encode(arg)?;
        Ok(0)
    }

    fn config_port(
        &self,
        table: &FeatureTable,
        index: usize,
        arg: &[u8],
        release: bool,
    ) -> Result<i64> {
        let req = FmePort::decode(arg)?;
        if req.flags != 0 {
            return Err(FpgaError::invalid(format!("port flags 0x{:x} must be 0", req.flags)));
        }

        let num_ports = table.read_csr(index, header::CAPABILITY)?.num_ports();
        if u64::from(req.port_id) >= num_ports {
            return Err(FpgaError::invalid(format!(
                "port {} beyond {} ports",
                req.port_id, num_ports
            )));
        }

        self.ports.config_port(req.port_id, release)?;
        Ok(0)
    }
}

impl FeatureDriver for HeaderDriver {
    fn name(&self) -> &'static str {
        "fme_hdr"
    }

    fn init(&self, table: &FeatureTable, index: usize) -> Result<()> {
        let hdr = table.read_csr(index, header::HEADER)?;
        tracing::debug!("FME header revision {}", hdr.revision());
        table.namespace().add_group("", AttrGroup::new(attrs(index)))
    }

    fn uninit(&self, table: &FeatureTable, _index: usize) {
        table.namespace().remove_group("", None);
    }

    fn ioctl(&self, table: &FeatureTable, index: usize, cmd: u32, arg: &mut [u8]) -> Result<i64> {
        match cmd {
            ioctl::FPGA_FME_GET_INFO => self.get_info(table, index, arg),
            ioctl::FPGA_FME_PORT_RELEASE => self.config_port(table, index, arg, true),
            ioctl::FPGA_FME_PORT_ASSIGN => self.config_port(table, index, arg, false),
            _ => Err(FpgaError::NotMine),
        }
    }
}
