use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::common::mmio::{MmioRegion, RegisterDomain};
use crate::common::poll::{Delay, NoDelay, ThreadDelay};
use crate::error::Result;
use crate::fme::{FmeDevice, PortAssignments, SimulatedFme};

/// Where the FME registers come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSource {
    /// PCI BAR resource file, e.g. `/sys/bus/pci/devices/<bdf>/resource0`
    Resource(PathBuf),
    /// Built-in simulated FME
    Simulated,
}

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub source: DeviceSource,
}

impl DeviceConfig {
    pub fn new(source: DeviceSource) -> Self {
        Self { source }
    }

    /// Time source for counter polling
    ///
    /// The simulated banks answer on the first read, so there is nothing to wait for.
    pub fn delay(&self) -> Arc<dyn Delay> {
        match self.source {
            DeviceSource::Resource(_) => Arc::new(ThreadDelay),
            DeviceSource::Simulated => Arc::new(NoDelay),
        }
    }

    /// Map the registers and probe the FME behind them
    pub fn open(&self) -> Result<FmeDevice> {
        let bar: Arc<dyn RegisterDomain> = match &self.source {
            DeviceSource::Resource(path) => Arc::new(MmioRegion::open(path)?),
            DeviceSource::Simulated => SimulatedFme::new().domain(),
        };
        tracing::info!("Probing FME from {:?}", self.source);
        FmeDevice::open_bar(bar, self.delay(), Arc::new(PortAssignments::default()))
    }
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub listen: SocketAddr,
    pub interval: Duration,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FpgaError;

    #[test]
    fn test_open_simulated() {
        let device = DeviceConfig::new(DeviceSource::Simulated).open().unwrap();
        assert_eq!(device.show("perf/clock/clock").unwrap(), "0x17d78400\n");
    }

    #[test]
    fn test_open_missing_resource() {
        let config = DeviceConfig::new(DeviceSource::Resource("/nonexistent/resource0".into()));
        assert!(matches!(config.open(), Err(FpgaError::MmioError(_))));
    }
}
