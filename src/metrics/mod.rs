//! Pluggable gauge sinks for per-server load

mod influxdb;
mod prometheus;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use self::influxdb::InfluxDbSink;
pub use self::prometheus::PrometheusSink;

/// Gauge reporting the number of wallets loaded on each server.
pub const WALLETS_LOADED: &str = "lbrynet_wallets_loaded";

/// Gauge value reported for a server that failed its load query.
pub const UNRESPONSIVE: f64 = -1.0;

/// Background exports still running after this are abandoned.
pub const EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for metric sinks
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Set gauge `metric` for the server at `address` to `value`
    async fn set_gauge(&self, metric: &str, address: &str, value: f64) -> Result<(), ExportError>;

    /// Name of the sink
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Registration error: {0}")]
    Register(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Fans a gauge update out to every configured sink.
///
/// Updates are fire-and-forget: each sink is written on its own task, and a
/// failing or stalled sink is logged and skipped.
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn MetricSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add(&mut self, sink: Arc<dyn MetricSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Export a gauge on one background task per sink and return immediately
    pub fn spawn_gauge(&self, metric: &'static str, address: &str, value: f64) {
        for sink in &self.sinks {
            let sink = Arc::clone(sink);
            let address = address.to_string();
            tokio::spawn(async move {
                match tokio::time::timeout(EXPORT_TIMEOUT, sink.set_gauge(metric, &address, value)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(sink = sink.name(), metric, address = %address, error = %e, "Failed to export gauge");
                    }
                    Err(_) => {
                        tracing::warn!(sink = sink.name(), metric, address = %address, "Gauge export timed out");
                    }
                }
            });
        }
    }
}
