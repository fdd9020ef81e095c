// Counter events exposed by the global performance feature
use crate::{enum_with_data, enum_with_selector, metric_enum};
use fpgamon_raw::fme::gperf::{cache_event, channel, fab_event, vtd_event};

metric_enum! {
    pub enum PerfBank {
        Cache => "cache",
        Fabric => "fabric",
        Iommu => "iommu",
    }
}

// Cache counters, each bound to a channel
enum_with_selector! {
    pub enum CacheEvent {
        ReadHit => ("read_hit", channel::RD, cache_event::RD_HIT),
        WriteHit => ("write_hit", channel::WR, cache_event::WR_HIT),
        ReadMiss => ("read_miss", channel::RD, cache_event::RD_MISS),
        WriteMiss => ("write_miss", channel::WR, cache_event::WR_MISS),
        HoldRequest => ("hold_request", channel::RD, cache_event::HOLD_REQ),
        TxReqStall => ("tx_req_stall", channel::RD, cache_event::TX_REQ_STALL),
        RxReqStall => ("rx_req_stall", channel::RD, cache_event::RX_REQ_STALL),
        RxEviction => ("rx_eviction", channel::RD, cache_event::EVICTIONS),
        DataWritePortContention => ("data_write_port_contention", channel::WR, cache_event::DATA_WR_PORT_CONTEN),
        TagWritePortContention => ("tag_write_port_contention", channel::WR, cache_event::TAG_WR_PORT_CONTEN),
    }
}

enum_with_data! {
    pub enum FabricEvent: u64 {
        Pcie0Read => ("pcie0_read", fab_event::PCIE0_RD),
        Pcie0Write => ("pcie0_write", fab_event::PCIE0_WR),
        Pcie1Read => ("pcie1_read", fab_event::PCIE1_RD),
        Pcie1Write => ("pcie1_write", fab_event::PCIE1_WR),
        UpiRead => ("upi_read", fab_event::UPI_RD),
        UpiWrite => ("upi_write", fab_event::UPI_WR),
        MmioRead => ("mmio_read", fab_event::MMIO_RD),
        MmioWrite => ("mmio_write", fab_event::MMIO_WR),
    }
    impl code -> u64
}

// VT-d events interleave the two AFUs: code = base + afu
enum_with_data! {
    pub enum VtdEvent: u64 {
        ReadTransaction => ("read_transaction", vtd_event::AFU_MEM_RD_TRANS),
        WriteTransaction => ("write_transaction", vtd_event::AFU_MEM_WR_TRANS),
        TlbReadHit => ("tlb_read_hit", vtd_event::AFU_TLB_RD_HIT),
        TlbWriteHit => ("tlb_write_hit", vtd_event::AFU_TLB_WR_HIT),
    }
    impl base -> u64
}

impl VtdEvent {
    pub fn code(&self, afu: u32) -> u64 {
        self.base() + u64::from(afu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_selectors() {
        assert_eq!(CacheEvent::all().len(), 10);
        assert_eq!(CacheEvent::RxEviction.selector(), (0, 10));
        assert_eq!(CacheEvent::DataWritePortContention.selector(), (1, 6));
        assert!(CacheEvent::all()
            .iter()
            .all(|e| e.selector().1 != cache_event::RSVD));
    }

    #[test]
    fn test_vtd_codes() {
        assert_eq!(VtdEvent::ReadTransaction.code(1), 1);
        assert_eq!(VtdEvent::WriteTransaction.code(0), 2);
        assert_eq!(VtdEvent::TlbWriteHit.code(1), 7);
    }

    #[test]
    fn test_fabric_codes_distinct() {
        let mut codes: Vec<u64> = FabricEvent::all().iter().map(FabricEvent::code).collect();
        codes.dedup();
        assert_eq!(codes, (0..8).collect::<Vec<u64>>());
    }
}
