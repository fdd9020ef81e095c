//! FME header block and the generic feature header shared by every feature

use crate::register::Register;

/// Feature header type field values
pub const FEATURE_TYPE_PRIVATE: u64 = 0x3;
/// FPGA interface unit (FME or port header)
pub const FEATURE_TYPE_FIU: u64 = 0x4;

csr! {
    /// Generic feature header, first CSR of every feature window
    ///
    /// | Bits  | Field              |
    /// |-------|--------------------|
    /// | 0-11  | id                 |
    /// | 12-15 | revision           |
    /// | 16-39 | next_header_offset |
    /// | 60-63 | type               |
    pub struct FeatureHeader {
        id, set_id: 0, 12;
        revision, set_revision: 12, 4;
        next_header_offset, set_next_header_offset: 16, 24;
        feature_type, set_feature_type: 60, 4;
    }
}

csr! {
    /// FME capability register
    pub struct Capability {
        fabric_verid, set_fabric_verid: 0, 8;
        socket_id, set_socket_id: 8, 1;
        pci0_link_avail, set_pci0_link_avail: 12, 1;
        pci1_link_avail, set_pci1_link_avail: 13, 1;
        qpi_link_avail, set_qpi_link_avail: 14, 1;
        iommu_support, set_iommu_support: 16, 1;
        num_ports, set_num_ports: 17, 3;
        address_width_bits, set_address_width_bits: 24, 6;
        cache_size, set_cache_size: 32, 12;
        cache_assoc, set_cache_assoc: 44, 4;
        lock_bit, set_lock_bit: 63, 1;
    }
}

csr! {
    /// Per-port descriptor in the FME header
    pub struct PortDescriptor {
        port_offset, set_port_offset: 0, 24;
        port_bar, set_port_bar: 32, 3;
        afu_access_control, set_afu_access_control: 55, 1;
        port_implemented, set_port_implemented: 60, 1;
    }
}

pub const HEADER: Register<FeatureHeader> = Register::new(0x00);
pub const CAPABILITY: Register<Capability> = Register::new(0x30);
pub const BITSTREAM_ID: Register<u64> = Register::new(0x60);
pub const BITSTREAM_MD: Register<u64> = Register::new(0x68);

/// Port descriptors, one CSR each starting at 0x38
pub const fn port(index: usize) -> Register<PortDescriptor> {
    Register::new(0x38 + 8 * index as u64)
}
