//! Device Feature Header (DFH) walk over an FME BAR

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use fpgamon_raw::fme::header::{self, FeatureHeader, FEATURE_TYPE_PRIVATE};
use fpgamon_raw::fme::{FEATURE_NAMES, FEATURE_WINDOW_SIZE, FME_FEATURE_NUM};

use crate::common::mmio::{CsrAccess, RegisterDomain, RegisterWindow};
use crate::error::{FpgaError, Result};
use crate::feature::FeatureTable;

/// Feature id to driver name
static FEATURE_IDS: Lazy<HashMap<u64, &'static str>> = Lazy::new(|| {
    FEATURE_NAMES
        .iter()
        .enumerate()
        .map(|(id, &name)| (id as u64, name))
        .collect()
});

/// One feature header found on the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFeature {
    pub id: usize,
    pub name: &'static str,
    pub revision: u64,
    pub offset: u64,
    pub len: u64,
}

/// Walk the DFH chain starting at offset 0 of `bar`
///
/// The first header is the FME header itself; every following one must be a
/// private feature. Unknown ids are skipped, and so is any repeat of an id
/// already found; the first header with an id owns its slot.
pub fn walk(bar: &dyn RegisterDomain) -> Result<Vec<DiscoveredFeature>> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = 0u64;

    loop {
        let dfh: FeatureHeader = bar.read_csr(header::HEADER.at(offset))?;
        let next = dfh.next_header_offset();

        if offset != 0 && dfh.feature_type() != FEATURE_TYPE_PRIVATE {
            tracing::warn!(
                "Feature at {:#x} has type {}, stopping walk",
                offset,
                dfh.feature_type()
            );
            break;
        }

        let len = if next == 0 {
            FEATURE_WINDOW_SIZE.min(bar.len() - offset)
        } else {
            next
        };

        match FEATURE_IDS.get(&dfh.id()) {
            Some(&name) if !seen.insert(dfh.id()) => {
                tracing::warn!("Duplicate {} at {:#x}, keeping the first one", name, offset)
            }
            Some(&name) => {
                tracing::debug!(
                    "Found {} (id {}, rev {}) at {:#x}",
                    name,
                    dfh.id(),
                    dfh.revision(),
                    offset
                );
                found.push(DiscoveredFeature {
                    id: dfh.id() as usize,
                    name,
                    revision: dfh.revision(),
                    offset,
                    len,
                });
            }
            None => tracing::warn!("Unknown FME feature id {:#x} at {:#x}", dfh.id(), offset),
        }

        if next == 0 {
            break;
        }
        match offset.checked_add(next) {
            Some(n) if n < bar.len() => offset = n,
            _ => {
                tracing::warn!("Next feature at {:#x}+{:#x} is outside the BAR", offset, next);
                break;
            }
        }
    }

    if found.first().map(|f| f.id) != Some(0) {
        return Err(FpgaError::NoDevice("BAR does not start with an FME header".into()));
    }
    Ok(found)
}

/// Build an FME feature table from the features found on `bar`
pub fn build_table(bar: Arc<dyn RegisterDomain>) -> Result<FeatureTable> {
    let features = walk(bar.as_ref())?;
    let mut table = FeatureTable::attach("fme", FME_FEATURE_NUM)?;

    for feature in features {
        let window = RegisterWindow::new(Arc::clone(&bar), feature.offset, feature.len, feature.name)?;
        table.add_feature(feature.id, feature.name, Arc::new(window))?;
    }
    Ok(table)
}
