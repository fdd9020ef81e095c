//! Global performance counter feature (`fme_gperf`)
//!
//! Three counter banks share this window: the cache channel, the fabric and
//! the VT-d (IOMMU) bank. Each bank is a control register selecting the event
//! and a counter register that echoes the latched event code in its top
//! nibble next to the accumulated count.

use crate::fme::header::FeatureHeader;
use crate::register::Register;

/// Number of fabric ports with their own counter scope
pub const PERF_MAX_PORT_NUM: u32 = 2;

/// Number of AFUs behind the VT-d bank
pub const PERF_MAX_AFU_NUM: u32 = 2;

/// Cache channel selector
pub mod channel {
    pub const RD: u64 = 0;
    pub const WR: u64 = 1;
}

/// Cache bank event codes
pub mod cache_event {
    pub const RD_HIT: u64 = 0;
    pub const WR_HIT: u64 = 1;
    pub const RD_MISS: u64 = 2;
    pub const WR_MISS: u64 = 3;
    pub const RSVD: u64 = 4;
    pub const HOLD_REQ: u64 = 5;
    pub const DATA_WR_PORT_CONTEN: u64 = 6;
    pub const TAG_WR_PORT_CONTEN: u64 = 7;
    pub const TX_REQ_STALL: u64 = 8;
    pub const RX_REQ_STALL: u64 = 9;
    pub const EVICTIONS: u64 = 10;
}

/// Fabric bank event codes
pub mod fab_event {
    pub const PCIE0_RD: u64 = 0;
    pub const PCIE0_WR: u64 = 1;
    pub const PCIE1_RD: u64 = 2;
    pub const PCIE1_WR: u64 = 3;
    pub const UPI_RD: u64 = 4;
    pub const UPI_WR: u64 = 5;
    pub const MMIO_RD: u64 = 6;
    pub const MMIO_WR: u64 = 7;
}

/// VT-d bank event bases; the AFU index is added to select a unit
pub mod vtd_event {
    pub const AFU_MEM_RD_TRANS: u64 = 0;
    pub const AFU_MEM_WR_TRANS: u64 = 2;
    pub const AFU_TLB_RD_HIT: u64 = 4;
    pub const AFU_TLB_WR_HIT: u64 = 6;
}

/// Fabric port filter states
pub const FAB_DISABLE_FILTER: u64 = 0;
pub const FAB_ENABLE_FILTER: u64 = 1;

csr! {
    /// Cache channel control
    pub struct CacheCtl {
        reset_counters, set_reset_counters: 0, 1;
        freeze, set_freeze: 8, 1;
        cache_event, set_cache_event: 16, 4;
        cci_chsel, set_cci_chsel: 20, 1;
    }
}

csr! {
    /// Cache channel counter (even and odd parity banks share the layout)
    pub struct CacheCtr {
        cache_counter, set_cache_counter: 0, 48;
        event_code, set_event_code: 60, 4;
    }
}

csr! {
    /// Fabric control
    pub struct FabCtl {
        reset_counters, set_reset_counters: 0, 1;
        freeze, set_freeze: 8, 1;
        fab_evtcode, set_fab_evtcode: 16, 4;
        port_id, set_port_id: 20, 2;
        port_filter, set_port_filter: 23, 1;
    }
}

csr! {
    /// Fabric counter
    pub struct FabCtr {
        fab_cnt, set_fab_cnt: 0, 60;
        event_code, set_event_code: 60, 4;
    }
}

csr! {
    /// VT-d control
    pub struct VtdCtl {
        reset_counters, set_reset_counters: 0, 1;
        freeze, set_freeze: 8, 1;
        vtd_evtcode, set_vtd_evtcode: 16, 4;
    }
}

csr! {
    /// VT-d counter
    pub struct VtdCtr {
        vtd_counter, set_vtd_counter: 0, 48;
        event_code, set_event_code: 60, 4;
    }
}

pub const HEADER: Register<FeatureHeader> = Register::new(0x00);
pub const CACHE_CTL: Register<CacheCtl> = Register::new(0x08);
pub const CACHE_CTR0: Register<CacheCtr> = Register::new(0x10);
pub const CACHE_CTR1: Register<CacheCtr> = Register::new(0x18);
pub const FAB_CTL: Register<FabCtl> = Register::new(0x20);
pub const FAB_CTR: Register<FabCtr> = Register::new(0x28);
pub const CLK: Register<u64> = Register::new(0x30);
pub const VTD_CTL: Register<VtdCtl> = Register::new(0x38);
pub const VTD_CTR: Register<VtdCtr> = Register::new(0x40);
