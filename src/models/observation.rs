// Aggregated observation: one row per device per publish cycle.
// Identity comes from the last sample of the window; metrics are window means.

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

/// One named metric value. Stored in the `metrics` blob of `device_observations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
pub struct MetricValue {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedRecord {
    pub timestamp: i64,
    pub device_id: u32,
    pub serial: String,
    pub uuid: String,
    pub sample_count: u32,
    pub metrics: Vec<MetricValue>,
}

impl AggregatedRecord {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|m| m.name == name).map(|m| m.value)
    }
}

/// Outcome of one publish cycle, exposed on GET /api/latest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleSummary {
    pub cycle: u64,
    /// Unix milliseconds once the write attempt finished.
    pub completed_at: i64,
    pub records: Vec<AggregatedRecord>,
    pub excluded_devices: Vec<u32>,
    pub persisted: bool,
}
