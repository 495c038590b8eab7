// Metrics provider seam: per-device snapshot queries and one-time discovery.

mod nvidia_smi;

pub use nvidia_smi::{NvidiaSmi, parse_csv_line, parse_temperature_limits};

use crate::error::Result;
use crate::models::DeviceProperties;

/// Source of instantaneous per-device metrics.
#[async_trait::async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Query `fields` for one device; returns one raw value per field, in order.
    ///
    /// # Errors
    /// `CollectorError::Provider` if the call fails or times out,
    /// `CollectorError::DataFormat` if the response has the wrong field count.
    async fn query_device(&self, device_id: u32, fields: &[String]) -> Result<Vec<String>>;
}

/// One-time enumeration of devices with their identity and static limits.
#[async_trait::async_trait]
pub trait DeviceDiscovery: Send + Sync {
    async fn discover(&self) -> anyhow::Result<Vec<DeviceProperties>>;
}
