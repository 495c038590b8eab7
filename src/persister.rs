// Persistence seam: device property upserts (bootstrap) and observation inserts (each cycle).

use crate::models::{AggregatedRecord, DeviceIdentity, DeviceLimits};

#[async_trait::async_trait]
pub trait Persister: Send + Sync {
    /// Keyed by `identity.uuid`. Identity is written on first insert only;
    /// limits are overwritten every time.
    async fn upsert_device_properties(
        &self,
        identity: &DeviceIdentity,
        limits: &DeviceLimits,
    ) -> anyhow::Result<()>;

    /// Appends one cycle's records. Returns the number of rows written.
    async fn insert_aggregated_batch(&self, records: &[AggregatedRecord]) -> anyhow::Result<u64>;
}
