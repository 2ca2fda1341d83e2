//! InfluxDB v2 gauge sink

use async_trait::async_trait;

use super::{ExportError, MetricSink};
use crate::config::InfluxDbConfig;

/// Writes every gauge update as a point tagged with the server address
pub struct InfluxDbSink {
    #[allow(dead_code)] // Used when influxdb feature is enabled
    bucket: String,
    #[cfg(feature = "influxdb")]
    client: influxdb2::Client,
}

impl InfluxDbSink {
    #[cfg(feature = "influxdb")]
    pub fn from_config(config: &InfluxDbConfig) -> Result<Self, ExportError> {
        if config.bucket.is_empty() {
            return Err(ExportError::Config("influxdb bucket is empty".to_string()));
        }
        Ok(Self {
            bucket: config.bucket.clone(),
            client: influxdb2::Client::new(&config.url, &config.org, &config.token),
        })
    }

    #[cfg(not(feature = "influxdb"))]
    pub fn from_config(config: &InfluxDbConfig) -> Result<Self, ExportError> {
        tracing::warn!(
            "InfluxDB sink requested but 'influxdb' feature is not enabled. \
             Enable with --features influxdb"
        );
        Ok(Self {
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl MetricSink for InfluxDbSink {
    #[cfg(feature = "influxdb")]
    async fn set_gauge(&self, metric: &str, address: &str, value: f64) -> Result<(), ExportError> {
        use influxdb2::models::DataPoint;

        let point = DataPoint::builder(metric)
            .tag("address", address)
            .field("value", value)
            .timestamp(chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0))
            .build()
            .map_err(|e| ExportError::Write(format!("Failed to build data point: {}", e)))?;

        self.client
            .write(&self.bucket, futures::stream::iter(vec![point]))
            .await
            .map_err(|e| ExportError::Write(e.to_string()))
    }

    #[cfg(not(feature = "influxdb"))]
    async fn set_gauge(&self, _metric: &str, _address: &str, _value: f64) -> Result<(), ExportError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "influxdb"
    }
}
