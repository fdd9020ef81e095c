//! FPGA Management Engine device
//!
//! Discovery fills a [`FeatureTable`] with the FME features, the drivers
//! below bind to them by name, and [`FmeDevice`] is the handle the CLI and
//! the monitoring agent operate through.

pub mod discovery;
pub mod error;
pub mod header;
pub mod ioctl;
pub mod perf;
pub mod power;
pub mod sim;
pub mod thermal;

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

use fpgamon_raw::fme::feature_id;

use crate::common::mmio::RegisterDomain;
use crate::common::poll::Delay;
use crate::counters::tree::PerfObject;
use crate::error::{FpgaError, Result};
use crate::feature::{FeatureDriver, FeatureTable};

pub use error::ErrorDriver;
pub use header::HeaderDriver;
pub use perf::GperfDriver;
pub use power::PowerDriver;
pub use sim::SimulatedFme;
pub use thermal::ThermalDriver;

/// Per-device payload kept behind the device lock
#[derive(Debug, Default)]
pub struct Fme {
    pub(crate) perf: Option<PerfObject>,
    /// Interrupt vector bound to each error interrupt, if any
    pub(crate) err_irqs: Vec<Option<i32>>,
}

impl Fme {
    pub fn perf(&self) -> Option<&PerfObject> {
        self.perf.as_ref()
    }

    pub fn err_irqs(&self) -> &[Option<i32>] {
        &self.err_irqs
    }
}

/// Releases ports from, and assigns them back to, the host
pub trait PortControl: Send + Sync {
    fn config_port(&self, port_id: u32, release: bool) -> Result<()>;
}

/// Port bookkeeping for a device with no port driver attached
#[derive(Debug, Default)]
pub struct PortAssignments {
    released: Mutex<BTreeSet<u32>>,
}

impl PortAssignments {
    pub fn is_released(&self, port_id: u32) -> bool {
        self.released.lock().contains(&port_id)
    }
}

impl PortControl for PortAssignments {
    fn config_port(&self, port_id: u32, release: bool) -> Result<()> {
        let mut released = self.released.lock();
        if release {
            if !released.insert(port_id) {
                return Err(FpgaError::busy(format!("port {port_id} already released")));
            }
        } else if !released.remove(&port_id) {
            return Err(FpgaError::busy(format!("port {port_id} is assigned to the host")));
        }
        tracing::info!(
            "Port {} {}",
            port_id,
            if release { "released" } else { "assigned" }
        );
        Ok(())
    }
}

/// A probed FME: its feature table with every driver initialized
pub struct FmeDevice {
    table: FeatureTable,
}

impl FmeDevice {
    /// The drivers an FME binds, one per feature with behavior
    pub fn drivers(delay: Arc<dyn Delay>, ports: Arc<dyn PortControl>) -> Vec<Arc<dyn FeatureDriver>> {
        vec![
            Arc::new(HeaderDriver::new(ports)),
            Arc::new(ThermalDriver),
            Arc::new(PowerDriver),
            Arc::new(GperfDriver::new(delay)),
            Arc::new(ErrorDriver),
        ]
    }

    /// Install the private payload and initialize every feature
    pub fn probe(mut table: FeatureTable, drivers: &[Arc<dyn FeatureDriver>]) -> Result<Self> {
        table.set_quiesce_feature(feature_id::GLOBAL_ERR);
        table.lock().set_private(Fme::default())?;

        if let Err(e) = table.init_all(drivers) {
            if let Err(te) = table.lock().take_private::<Fme>() {
                tracing::warn!("Failed to drop FME private data: {}", te);
            }
            return Err(e);
        }

        tracing::info!("FME probed, {} attributes exposed", table.namespace().list("").len());
        Ok(Self { table })
    }

    /// Discover the features behind `bar` and probe them
    pub fn open_bar(
        bar: Arc<dyn RegisterDomain>,
        delay: Arc<dyn Delay>,
        ports: Arc<dyn PortControl>,
    ) -> Result<Self> {
        let table = discovery::build_table(bar)?;
        Self::probe(table, &Self::drivers(delay, ports))
    }

    /// Tear every feature down and drop the private payload
    pub fn remove(self) {
        drop(self);
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    pub fn open(&self, exclusive: bool) -> Result<()> {
        self.table.open(exclusive)
    }

    pub fn release(&self) -> Result<()> {
        self.table.release()
    }

    /// Handle a device-level request, or offer it to the features
    pub fn ioctl(&self, cmd: u32, arg: &mut [u8]) -> Result<i64> {
        match cmd {
            ioctl::FPGA_GET_API_VERSION => Ok(ioctl::FPGA_API_VERSION),
            // no extensions
            ioctl::FPGA_CHECK_EXTENSION => Ok(0),
            _ => self.table.dispatch(cmd, arg),
        }
    }

    pub fn show(&self, path: &str) -> Result<String> {
        self.table.show(path)
    }

    pub fn store(&self, path: &str, value: &str) -> Result<()> {
        self.table.store(path, value)
    }

    /// Attribute paths under `prefix`
    pub fn list(&self, prefix: &str) -> Vec<String> {
        self.table.namespace().list(prefix)
    }

    pub fn irq_bindings(&self) -> Result<Vec<Option<i32>>> {
        Ok(self.table.lock().private::<Fme>()?.err_irqs().to_vec())
    }
}

impl Drop for FmeDevice {
    fn drop(&mut self) {
        self.table.uninit_all();
        if let Err(e) = self.table.lock().take_private::<Fme>() {
            tracing::warn!("FME removed without private data: {}", e);
        }
        tracing::info!("FME removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::poll::NoDelay;

    fn probe(sim: &SimulatedFme) -> Result<FmeDevice> {
        FmeDevice::open_bar(
            sim.domain(),
            Arc::new(NoDelay),
            Arc::new(PortAssignments::default()),
        )
    }

    #[test]
    fn test_probe_binds_all_features() {
        let sim = SimulatedFme::new();
        let fme = probe(&sim).unwrap();
        assert_eq!(fme.show("ports_num").unwrap(), "2\n");
        assert_eq!(fme.show("thermal_mgmt/temperature").unwrap(), "48\n");
        assert_eq!(fme.show("power_mgmt/consumed").unwrap(), "0x1f\n");
        assert!(fme.list("perf/iommu").contains(&"perf/iommu/afu0/read_transaction".to_string()));
        assert_eq!(fme.irq_bindings().unwrap(), vec![None; 4]);
    }

    #[test]
    fn test_generic_requests() {
        let sim = SimulatedFme::new();
        let fme = probe(&sim).unwrap();
        assert_eq!(fme.ioctl(ioctl::FPGA_GET_API_VERSION, &mut []).unwrap(), 0);
        assert_eq!(fme.ioctl(ioctl::FPGA_CHECK_EXTENSION, &mut []).unwrap(), 0);
        assert!(matches!(
            fme.ioctl(ioctl::FPGA_FME_PORT_PR, &mut [0u8; 16]),
            Err(FpgaError::Unsupported(_))
        ));
    }

    struct Broken;

    impl FeatureDriver for Broken {
        fn name(&self) -> &'static str {
            "fme_error"
        }

        fn init(&self, _table: &FeatureTable, _index: usize) -> Result<()> {
            Err(FpgaError::NoDevice("error block not responding".into()))
        }
    }

    #[test]
    fn test_failed_probe_unwinds() {
        let sim = SimulatedFme::new();
        let table = discovery::build_table(sim.domain()).unwrap();
        let mut drivers: Vec<Arc<dyn FeatureDriver>> = vec![Arc::new(Broken)];
        drivers.extend(FmeDevice::drivers(
            Arc::new(NoDelay),
            Arc::new(PortAssignments::default()),
        ));

        assert!(matches!(
            FmeDevice::probe(table, &drivers),
            Err(FpgaError::NoDevice(_))
        ));
        // the same hardware probes cleanly afterwards
        assert!(probe(&sim).is_ok());
    }

    #[test]
    fn test_remove_and_reprobe() {
        let sim = SimulatedFme::new();
        let fme = probe(&sim).unwrap();
        fme.open(true).unwrap();
        fme.release().unwrap();
        fme.remove();

        let fme = probe(&sim).unwrap();
        assert_eq!(fme.list("errors/fme-errors").len(), 4);
    }

    #[test]
    fn test_port_assignments() {
        let ports = PortAssignments::default();
        assert!(matches!(ports.config_port(0, false), Err(FpgaError::Busy(_))));
        ports.config_port(0, true).unwrap();
        assert!(ports.is_released(0));
        ports.config_port(0, false).unwrap();
        assert!(!ports.is_released(0));
    }
}
