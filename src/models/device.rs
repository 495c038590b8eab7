// Device identity and capability limits (discovered once at bootstrap)

use serde::{Deserialize, Serialize};

/// Immutable per-device identity. `uuid` is the stable key across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    pub device_id: u32,
    pub model: String,
    pub serial: String,
    pub uuid: String,
}

/// Mutable capability snapshot; refreshed on every bootstrap.
/// Limits the driver reports as unsupported are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLimits {
    pub memory_total_mib: u64,
    pub power_limit_w: Option<f64>,
    pub temperature_slowdown_c: Option<f64>,
    pub temperature_shutdown_c: Option<f64>,
}

/// Identity + limits, as discovered and as stored in `device_properties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProperties {
    #[serde(flatten)]
    pub identity: DeviceIdentity,
    pub limits: DeviceLimits,
}
