//! Global performance feature: builds the `perf` counter tree
//!
//! ```text
//! perf/                 clock/{revision,clock}, cache/{<events>,freeze}
//! perf/iommu/           freeze                  (only with iommu_support)
//! perf/iommu/afuN/      <vtd events>
//! perf/fabric/          <fabric events>, enable, freeze
//! perf/fabric/portN/    <fabric events>, enable
//! ```

use std::sync::Arc;

use fpgamon_raw::fme::gperf::{self, PERF_MAX_AFU_NUM, PERF_MAX_PORT_NUM};
use fpgamon_raw::fme::{feature_id, header};

use crate::common::mmio::CsrAccess;
use crate::common::poll::Delay;
use crate::common::text::{parse_bool, show_dec, show_hex};
use crate::counters::events::{CacheEvent, FabricEvent, PerfBank, VtdEvent};
use crate::counters::fabric;
use crate::counters::mux::{CACHE, IOMMU};
use crate::counters::tree::{PerfId, PerfObject};
use crate::error::{FpgaError, Result};
use crate::feature::{AttrGroup, Attribute, FeatureDriver, FeatureTable};
use crate::fme::Fme;

pub const PERF_OBJECT: &str = "perf";

pub struct GperfDriver {
    delay: Arc<dyn Delay>,
}

impl GperfDriver {
    pub fn new(delay: Arc<dyn Delay>) -> Self {
        Self { delay }
    }
}

fn freeze_attr(index: usize, bank: PerfBank) -> Attribute {
    let mux = bank.mux();
    Attribute::rw(
        "freeze",
        move |t| Ok(show_dec(u64::from(mux.is_frozen(&t.lock(), index)?))),
        move |t, v| {
            let frozen = parse_bool(v)?;
            mux.set_frozen(&t.lock(), index, frozen)
        },
    )
}

fn cache_group(index: usize, delay: &Arc<dyn Delay>) -> AttrGroup {
    let mut attrs: Vec<Attribute> = CacheEvent::all()
        .into_iter()
        .map(|event| {
            let delay = Arc::clone(delay);
            let (channel, code) = event.selector();
            Attribute::ro(event.name(), move |t| {
                Ok(show_hex(CACHE.read(&t.lock(), index, code, channel, delay.as_ref())?))
            })
        })
        .collect();
    attrs.push(freeze_attr(index, PerfBank::Cache));
    AttrGroup::named("cache", attrs)
}

fn clock_group(index: usize) -> AttrGroup {
    AttrGroup::named(
        "clock",
        vec![
            Attribute::ro("revision", move |t| {
                Ok(show_dec(t.read_csr(index, gperf::HEADER)?.revision()))
            }),
            Attribute::ro("clock", move |t| Ok(show_hex(t.read_csr(index, gperf::CLK)?))),
        ],
    )
}

fn vtd_attrs(index: usize, afu: u32, delay: &Arc<dyn Delay>) -> Vec<Attribute> {
    VtdEvent::all()
        .into_iter()
        .map(|event| {
            let delay = Arc::clone(delay);
            let code = event.code(afu);
            Attribute::ro(event.name(), move |t| {
                Ok(show_hex(IOMMU.read(&t.lock(), index, code, 0, delay.as_ref())?))
            })
        })
        .collect()
}

fn fabric_attrs(index: usize, id: PerfId, delay: &Arc<dyn Delay>) -> Vec<Attribute> {
    let mut attrs: Vec<Attribute> = FabricEvent::all()
        .into_iter()
        .map(|event| {
            let delay = Arc::clone(delay);
            Attribute::ro(event.name(), move |t| {
                Ok(show_hex(fabric::read(&t.lock(), index, id, event, delay.as_ref())?))
            })
        })
        .collect();

    attrs.push(Attribute::rw(
        "enable",
        move |t| Ok(show_dec(u64::from(fabric::is_enabled(&t.lock(), index, id)?))),
        move |t, v| {
            if !parse_bool(v)? {
                return Err(FpgaError::invalid(
                    "fabric monitoring is disabled by enabling another scope",
                ));
            }
            fabric::enable(&t.lock(), index, id).map(|_| ())
        },
    ));
    attrs
}

impl GperfDriver {
    fn build(&self, table: &FeatureTable, index: usize, iommu: bool) -> Result<PerfObject> {
        let registry = table.namespace();
        let mut root = PerfObject::create(
            registry,
            PERF_OBJECT,
            PerfId::Root,
            vec![clock_group(index), cache_group(index, &self.delay)],
        )?;

        if let Err(e) = self.populate(&mut root, table, index, iommu) {
            root.destroy(registry);
            return Err(e);
        }
        Ok(root)
    }

    fn populate(&self, root: &mut PerfObject, table: &FeatureTable, index: usize, iommu: bool) -> Result<()> {
        let registry = table.namespace();

        if iommu {
            let node = root.add_child(
                registry,
                "iommu",
                PerfId::Root,
                vec![AttrGroup::new(vec![freeze_attr(index, PerfBank::Iommu)])],
            )?;
            for afu in 0..PERF_MAX_AFU_NUM {
                node.add_child(
                    registry,
                    "afu",
                    PerfId::Index(afu),
                    vec![AttrGroup::new(vtd_attrs(index, afu, &self.delay))],
                )?;
            }
        }

        let mut top = fabric_attrs(index, PerfId::Root, &self.delay);
        top.push(freeze_attr(index, PerfBank::Fabric));
        let node = root.add_child(registry, "fabric", PerfId::Root, vec![AttrGroup::new(top)])?;
        for port in 0..PERF_MAX_PORT_NUM {
            let id = PerfId::Index(port);
            node.add_child(
                registry,
                "port",
                id,
                vec![AttrGroup::new(fabric_attrs(index, id, &self.delay))],
            )?;
        }
        Ok(())
    }
}

impl FeatureDriver for GperfDriver {
    fn name(&self) -> &'static str {
        "fme_gperf"
    }

    fn init(&self, table: &FeatureTable, index: usize) -> Result<()> {
        let iommu = table
            .read_csr(feature_id::HEADER, header::CAPABILITY)?
            .iommu_support()
            == 1;

        let tree = self.build(table, index, iommu)?;
        tracing::debug!("Counter tree built with {} scopes", tree.node_count());

        let mut guard = table.lock();
        let missing = guard.private::<Fme>().err();
        if let Some(e) = missing {
            drop(guard);
            tree.destroy(table.namespace());
            return Err(e);
        }
        guard.private_mut::<Fme>()?.perf = Some(tree);
        Ok(())
    }

    fn uninit(&self, table: &FeatureTable, _index: usize) {
        let tree = match table.lock().private_mut::<Fme>() {
            Ok(fme) => fme.perf.take(),
            Err(_) => None,
        };
        if let Some(tree) = tree {
            tree.destroy(table.namespace());
        }
    }
}
