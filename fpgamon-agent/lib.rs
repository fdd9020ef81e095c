// Macros (must be first for visibility)
#[macro_use]
pub mod macros;

pub mod common;
pub mod config;
pub mod counters;
pub mod error;
pub mod feature;
pub mod fme;
pub mod orchestrator;
pub mod prom;

pub use config::{DeviceConfig, DeviceSource, ServeConfig};
pub use error::{FpgaError, Result};
pub use fme::{FmeDevice, PortAssignments, PortControl, SimulatedFme};
pub use orchestrator::{CollectorConfig, MetricCollector};
pub use prom::FmeMetricExporter;
