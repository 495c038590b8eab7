// One-time startup: enumerate devices, apply the configured selection, upsert their properties.
// Any failure here aborts startup.

use std::time::Duration;

use tracing::info;

use crate::config::DeviceSelection;
use crate::models::DeviceProperties;
use crate::persister::Persister;
use crate::provider::DeviceDiscovery;

/// Discovers devices, keeps the selected ones and records their properties.
/// Returns the selected devices ordered by device id.
pub async fn run(
    discovery: &dyn DeviceDiscovery,
    persister: &dyn Persister,
    selection: &DeviceSelection,
    write_timeout: Duration,
) -> anyhow::Result<Vec<DeviceProperties>> {
    let discovered = discovery.discover().await?;
    anyhow::ensure!(!discovered.is_empty(), "no devices found");
    info!(count = discovered.len(), "identified device(s)");

    let selected = select_devices(discovered, selection)?;
    for device in &selected {
        tokio::time::timeout(
            write_timeout,
            persister.upsert_device_properties(&device.identity, &device.limits),
        )
        .await
        .map_err(|_| {
            anyhow::anyhow!(
                "upsert for device {} timed out after {}ms",
                device.identity.device_id,
                write_timeout.as_millis()
            )
        })??;
        info!(
            device_id = device.identity.device_id,
            model = %device.identity.model,
            uuid = %device.identity.uuid,
            memory_total_mib = device.limits.memory_total_mib,
            power_limit_w = ?device.limits.power_limit_w,
            temperature_slowdown_c = ?device.limits.temperature_slowdown_c,
            temperature_shutdown_c = ?device.limits.temperature_shutdown_c,
            "device registered"
        );
    }
    Ok(selected)
}

/// Applies the configured selection. Unknown ids are an error; duplicates collapse.
pub fn select_devices(
    discovered: Vec<DeviceProperties>,
    selection: &DeviceSelection,
) -> anyhow::Result<Vec<DeviceProperties>> {
    let mut selected = match selection {
        DeviceSelection::All => discovered,
        DeviceSelection::List(ids) => {
            for id in ids {
                anyhow::ensure!(
                    discovered.iter().any(|d| d.identity.device_id == *id),
                    "configured device {} not found (discovered {} device(s))",
                    id,
                    discovered.len()
                );
            }
            discovered
                .into_iter()
                .filter(|d| ids.contains(&d.identity.device_id))
                .collect()
        }
    };
    selected.sort_by_key(|d| d.identity.device_id);
    selected.dedup_by_key(|d| d.identity.device_id);
    Ok(selected)
}
