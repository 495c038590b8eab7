// nvidia-smi backed provider. Each call spawns the binary and is bounded by a timeout.

use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::{DeviceDiscovery, MetricsProvider};
use crate::error::{CollectorError, Result};
use crate::models::{DeviceIdentity, DeviceLimits, DeviceProperties};

const CSV_FORMAT: &str = "--format=csv,noheader,nounits";
const DISCOVERY_FIELDS: [&str; 5] = [
    "gpu_name",
    "gpu_serial",
    "gpu_uuid",
    "memory.total",
    "power.limit",
];

pub struct NvidiaSmi {
    command: String,
    timeout: Duration,
}

impl NvidiaSmi {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    /// Runs the binary with `args`; Err carries a human-readable reason.
    async fn run(&self, args: &[String]) -> std::result::Result<String, String> {
        let child = Command::new(&self.command)
            .args(args)
            .kill_on_drop(true)
            .output();
        let output = match timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("failed to run {}: {}", self.command, e)),
            Err(_) => {
                return Err(format!(
                    "{} timed out after {}ms",
                    self.command,
                    self.timeout.as_millis()
                ));
            }
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(format!("{} exited with {}: {}", self.command, output.status, detail));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn query_csv(&self, device_id: Option<u32>, fields: &[&str]) -> anyhow::Result<String> {
        let mut args = Vec::with_capacity(3);
        if let Some(id) = device_id {
            args.push(format!("--id={}", id));
        }
        args.push(format!("--query-gpu={}", fields.join(",")));
        args.push(CSV_FORMAT.to_string());
        self.run(&args).await.map_err(|e| anyhow::anyhow!(e))
    }

    async fn discover_one(&self, device_id: u32) -> anyhow::Result<DeviceProperties> {
        let raw = self.query_csv(Some(device_id), &DISCOVERY_FIELDS).await?;
        let values = parse_csv_line(&raw, DISCOVERY_FIELDS.len())
            .map_err(|e| anyhow::anyhow!("device {} properties: {} (raw: {:?})", device_id, e, raw))?;
        let memory_total_mib = values[3].parse::<f64>().map_err(|_| {
            anyhow::anyhow!("device {}: memory.total not numeric: {:?}", device_id, values[3])
        })? as u64;

        let temp_args = vec![
            format!("--id={}", device_id),
            "-q".to_string(),
            "-d".to_string(),
            "TEMPERATURE".to_string(),
        ];
        let (temperature_slowdown_c, temperature_shutdown_c) = match self.run(&temp_args).await {
            Ok(text) => parse_temperature_limits(&text),
            Err(e) => {
                warn!(device_id, error = %e, "temperature limits unavailable");
                (None, None)
            }
        };

        Ok(DeviceProperties {
            identity: DeviceIdentity {
                device_id,
                model: values[0].clone(),
                serial: values[1].clone(),
                uuid: values[2].clone(),
            },
            limits: DeviceLimits {
                memory_total_mib,
                power_limit_w: parse_optional(&values[4]),
                temperature_slowdown_c,
                temperature_shutdown_c,
            },
        })
    }
}

#[async_trait::async_trait]
impl MetricsProvider for NvidiaSmi {
    async fn query_device(&self, device_id: u32, fields: &[String]) -> Result<Vec<String>> {
        let args = vec![
            CSV_FORMAT.to_string(),
            format!("--id={}", device_id),
            format!("--query-gpu={}", fields.join(",")),
        ];
        let raw = self
            .run(&args)
            .await
            .map_err(|reason| CollectorError::Provider { device_id, reason })?;
        parse_csv_line(&raw, fields.len()).map_err(|reason| CollectorError::DataFormat {
            device_id,
            reason,
            raw,
        })
    }
}

#[async_trait::async_trait]
impl DeviceDiscovery for NvidiaSmi {
    #[instrument(skip(self), fields(provider = "nvidia-smi", operation = "discover"))]
    async fn discover(&self) -> anyhow::Result<Vec<DeviceProperties>> {
        let raw = self.query_csv(None, &["count"]).await?;
        let count: u32 = raw
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .and_then(|l| l.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("unexpected device count output: {:?}", raw))?;
        debug!(count, "device count");

        let mut devices = Vec::with_capacity(count as usize);
        for device_id in 0..count {
            devices.push(self.discover_one(device_id).await?);
        }
        Ok(devices)
    }
}

/// Splits one CSV response line into exactly `expected` trimmed values.
pub fn parse_csv_line(raw: &str, expected: usize) -> std::result::Result<Vec<String>, String> {
    let mut lines = raw.lines().map(str::trim).filter(|l| !l.is_empty());
    let Some(line) = lines.next() else {
        return Err("empty response".into());
    };
    if lines.next().is_some() {
        return Err("expected a single line".into());
    }
    let values: Vec<String> = line.split(',').map(|v| v.trim().to_string()).collect();
    if values.len() != expected {
        return Err(format!("expected {} values, got {}", expected, values.len()));
    }
    Ok(values)
}

/// Extracts (slowdown, shutdown) thresholds in °C from `nvidia-smi -q -d TEMPERATURE`.
pub fn parse_temperature_limits(text: &str) -> (Option<f64>, Option<f64>) {
    let mut slowdown = None;
    let mut shutdown = None;
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_end_matches('C').trim();
        match key.trim() {
            "GPU Slowdown Temp" => slowdown = parse_optional(value),
            "GPU Shutdown Temp" => shutdown = parse_optional(value),
            _ => {}
        }
    }
    (slowdown, shutdown)
}

/// "N/A", "[N/A]", "[Not Supported]" and other non-numeric markers become None.
fn parse_optional(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_line_trims_values() {
        let values = parse_csv_line("GPU-SN, GPU-abc, 120.5, 63\n", 4).unwrap();
        assert_eq!(values, vec!["GPU-SN", "GPU-abc", "120.5", "63"]);
    }

    #[test]
    fn csv_line_rejects_wrong_count() {
        let err = parse_csv_line("1, 2", 3).unwrap_err();
        assert!(err.contains("expected 3"));
    }

    #[test]
    fn csv_line_rejects_empty_and_multiline() {
        assert!(parse_csv_line("  \n", 1).is_err());
        assert!(parse_csv_line("1\n2\n", 1).is_err());
    }

    #[test]
    fn temperature_limits_from_query_output() {
        let text = "\
==============NVSMI LOG==============

GPU 00000000:3B:00.0
    Temperature
        GPU Current Temp                  : 34 C
        GPU Shutdown Temp                 : 90 C
        GPU Slowdown Temp                 : 87 C
        GPU Max Operating Temp            : 83 C
        Memory Current Temp               : N/A
";
        assert_eq!(parse_temperature_limits(text), (Some(87.0), Some(90.0)));
    }

    #[test]
    fn temperature_limits_missing_or_unsupported() {
        let text = "        GPU Shutdown Temp                 : N/A\n";
        assert_eq!(parse_temperature_limits(text), (None, None));
    }

    #[test]
    fn optional_values() {
        assert_eq!(parse_optional("250.00"), Some(250.0));
        assert_eq!(parse_optional("[N/A]"), None);
        assert_eq!(parse_optional("[Not Supported]"), None);
    }
}
