use prometheus::{Gauge, Registry};
use std::sync::Arc;

use crate::common::text::parse_u64;
use crate::error::Result;
use crate::fme::error::ERRORS_OBJECT;
use crate::fme::perf::PERF_OBJECT;
use crate::fme::FmeDevice;

/// Attributes that are controls rather than measurements
const CONTROLS: [&str; 4] = ["freeze", "enable", "inject_error", "revision"];

/// Sensor attributes exported next to the counter and error trees
const SENSORS: [&str; 3] = [
    "thermal_mgmt/temperature",
    "power_mgmt/consumed",
    "power_mgmt/rtl",
];

/// Prometheus name of an attribute path
pub fn metric_name(path: &str) -> String {
    format!("fpga_{}", path.replace(['/', '-'], "_"))
}

pub struct FmeMetricExporter {
    device: Arc<FmeDevice>,
    registry: Arc<Registry>,
    gauges: Vec<(String, Gauge)>,
}

impl FmeMetricExporter {
    pub fn new(device: Arc<FmeDevice>) -> Result<Self> {
        let mut exporter = Self {
            device,
            registry: Arc::new(Registry::new()),
            gauges: Vec::new(),
        };

        exporter.register_metrics()?;

        Ok(exporter)
    }

    fn exported_paths(&self) -> Vec<String> {
        let namespace = self.device.table().namespace();
        let mut paths = self.device.list(PERF_OBJECT);
        paths.extend(self.device.list(ERRORS_OBJECT));
        paths.extend(SENSORS.iter().map(|s| s.to_string()));

        paths
            .into_iter()
            .filter(|path| {
                let name = path.rsplit('/').next().unwrap_or(path);
                !CONTROLS.contains(&name)
            })
            .filter(|path| {
                namespace
                    .attribute(path)
                    .map(|a| a.is_readable())
                    .unwrap_or(false)
            })
            .collect()
    }

    fn register_metrics(&mut self) -> Result<()> {
        for path in self.exported_paths() {
            let opts = prometheus::Opts::new(metric_name(&path), format!("FME attribute {path}"));
            let gauge = Gauge::with_opts(opts)?;
            self.registry.register(Box::new(gauge.clone()))?;
            self.gauges.push((path, gauge));
        }

        tracing::info!("FME exporter registered {} gauges", self.gauges.len());
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Collect metrics once (called by orchestrator)
    pub async fn collect(&self) {
        for (path, gauge) in &self.gauges {
            match self.device.show(path).and_then(|text| parse_u64(&text)) {
                Ok(value) => gauge.set(value as f64),
                Err(e) => tracing::warn!("Failed to read {}: {}", path, e),
            }
        }
    }
}
