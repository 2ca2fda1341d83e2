//! Prometheus gauge sink

use async_trait::async_trait;
use parking_lot::Mutex;
use prometheus::{GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;

use super::{ExportError, MetricSink};

/// Keeps one `GaugeVec` per metric name, labeled by server address,
/// registered in its own registry so the status server can expose it.
pub struct PrometheusSink {
    registry: Registry,
    gauges: Mutex<HashMap<String, GaugeVec>>,
}

impl PrometheusSink {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            gauges: Mutex::new(HashMap::new()),
        }
    }

    fn gauge(&self, metric: &str) -> Result<GaugeVec, ExportError> {
        let mut gauges = self.gauges.lock();
        if let Some(gauge) = gauges.get(metric) {
            return Ok(gauge.clone());
        }

        let gauge = GaugeVec::new(
            Opts::new(metric, format!("{} per SDK server", metric)),
            &["address"],
        )
        .map_err(|e| ExportError::Register(e.to_string()))?;
        self.registry
            .register(Box::new(gauge.clone()))
            .map_err(|e| ExportError::Register(e.to_string()))?;
        gauges.insert(metric.to_string(), gauge.clone());
        Ok(gauge)
    }

    /// Render all gauges in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, ExportError> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|e| ExportError::Write(e.to_string()))
    }
}

impl Default for PrometheusSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSink for PrometheusSink {
    async fn set_gauge(&self, metric: &str, address: &str, value: f64) -> Result<(), ExportError> {
        self.gauge(metric)?.with_label_values(&[address]).set(value);
        Ok(())
    }

    fn name(&self) -> &str {
        "prometheus"
    }
}
