// Periodic metric collection for the serve mode
// Refreshes every exporter from one async loop until cancelled

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::fme::FmeDevice;
use crate::prom::FmeMetricExporter;

/// Configuration for the collection loop
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub interval: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Centralized collector that refreshes all exporters on a fixed interval
pub struct MetricCollector {
    collector_config: CollectorConfig,
    fme_exporter: Option<Arc<FmeMetricExporter>>,
}

impl MetricCollector {
    pub fn new(device: Arc<FmeDevice>, collector_config: CollectorConfig) -> Self {
        let fme_exporter = match FmeMetricExporter::new(device) {
            Ok(exporter) => {
                tracing::info!("FME exporter initialized");
                Some(Arc::new(exporter))
            }
            Err(e) => {
                tracing::error!("Failed to initialize FME exporter: {}", e);
                None
            }
        };

        Self {
            collector_config,
            fme_exporter,
        }
    }

    /// Start the collection loop; it stops once `cancel_token` is cancelled
    pub fn start(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tracing::warn!(
            "Starting metric collection every {:?}",
            self.collector_config.interval
        );

        tokio::spawn(async move {
            self.collection_loop(cancel_token).await;
        })
    }

    async fn collection_loop(self, cancel_token: CancellationToken) {
        let mut interval = tokio::time::interval(self.collector_config.interval);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    tracing::info!("Collection loop cancelled");
                    break;
                }
                _ = interval.tick() => {}
            }

            let mut tasks = Vec::new();

            crate::spawn_collector!(tasks, &self.fme_exporter);

            for task in tasks {
                if let Err(e) = task.await {
                    tracing::error!("Collection task failed: {}", e);
                }
            }
        }
    }

    /// Get a reference to the exporter for the metrics handler
    pub fn fme_exporter(&self) -> Option<Arc<FmeMetricExporter>> {
        self.fme_exporter.clone()
    }
}
