// Shared test helpers: scripted provider, in-memory persister, sample builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use gpulogger::error::{CollectorError, Result};
use gpulogger::models::*;
use gpulogger::persister::Persister;
use gpulogger::provider::{DeviceDiscovery, MetricsProvider};

/// What the scripted provider answers for one call.
pub enum Reply {
    /// Metric values; identity fields are added by the provider.
    Values(Vec<f64>),
    /// Raw response, identity fields included.
    Raw(Vec<String>),
    Fail(String),
    Hang,
    /// Metric values answered after `Duration` of latency.
    Delay(Duration, Vec<f64>),
}

type Script = Box<dyn Fn(u32, usize) -> Reply + Send + Sync>;

/// Provider driven by a closure of (device_id, call index for that device).
pub struct ScriptedProvider {
    script: Script,
    calls: Mutex<HashMap<u32, usize>>,
    call_times: Mutex<Vec<(u32, tokio::time::Instant)>>,
}

impl ScriptedProvider {
    pub fn new(script: impl Fn(u32, usize) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(HashMap::new()),
            call_times: Mutex::new(Vec::new()),
        }
    }

    /// Every device answers `values` forever.
    pub fn constant(values: Vec<f64>) -> Self {
        Self::new(move |_, _| Reply::Values(values.clone()))
    }

    /// Device `d` answers `rows[d][i]` on its i-th call (last row repeats).
    pub fn rows(rows: HashMap<u32, Vec<Vec<f64>>>) -> Self {
        Self::new(move |device, i| {
            let device_rows = &rows[&device];
            Reply::Values(device_rows[i.min(device_rows.len() - 1)].clone())
        })
    }

    pub fn calls_for(&self, device_id: u32) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&device_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn call_times(&self, device_id: u32) -> Vec<tokio::time::Instant> {
        self.call_times
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| *d == device_id)
            .map(|(_, t)| *t)
            .collect()
    }
}

pub fn serial_of(device_id: u32) -> String {
    format!("SN-{}", device_id)
}

pub fn uuid_of(device_id: u32) -> String {
    format!("GPU-0000-{}", device_id)
}

fn with_identity(device_id: u32, values: &[f64]) -> Vec<String> {
    let mut raw = vec![serial_of(device_id), uuid_of(device_id)];
    raw.extend(values.iter().map(|v| v.to_string()));
    raw
}

#[async_trait::async_trait]
impl MetricsProvider for ScriptedProvider {
    async fn query_device(&self, device_id: u32, fields: &[String]) -> Result<Vec<String>> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(device_id).or_insert(0);
            let index = *entry;
            *entry += 1;
            index
        };
        self.call_times
            .lock()
            .unwrap()
            .push((device_id, tokio::time::Instant::now()));

        let raw = match (self.script)(device_id, index) {
            Reply::Values(values) => with_identity(device_id, &values),
            Reply::Delay(latency, values) => {
                tokio::time::sleep(latency).await;
                with_identity(device_id, &values)
            }
            Reply::Raw(raw) => raw,
            Reply::Fail(reason) => return Err(CollectorError::Provider { device_id, reason }),
            Reply::Hang => std::future::pending().await,
        };
        if raw.len() != fields.len() {
            return Err(CollectorError::DataFormat {
                device_id,
                reason: format!("expected {} values, got {}", fields.len(), raw.len()),
                raw: raw.join(","),
            });
        }
        Ok(raw)
    }
}

/// Discovery returning a fixed device list.
pub struct StaticDiscovery(pub Vec<DeviceProperties>);

#[async_trait::async_trait]
impl DeviceDiscovery for StaticDiscovery {
    async fn discover(&self) -> anyhow::Result<Vec<DeviceProperties>> {
        Ok(self.0.clone())
    }
}

pub fn device(device_id: u32) -> DeviceProperties {
    DeviceProperties {
        identity: DeviceIdentity {
            device_id,
            model: "NVIDIA A100-SXM4-80GB".into(),
            serial: serial_of(device_id),
            uuid: uuid_of(device_id),
        },
        limits: DeviceLimits {
            memory_total_mib: 81920,
            power_limit_w: Some(400.0),
            temperature_slowdown_c: Some(87.0),
            temperature_shutdown_c: Some(90.0),
        },
    }
}

/// Keeps everything in memory. Inserts fail while `fail_inserts` is set;
/// they never complete while `hang_inserts` is set.
#[derive(Default)]
pub struct MemoryPersister {
    pub properties: Mutex<HashMap<String, (DeviceIdentity, DeviceLimits)>>,
    pub batches: Mutex<Vec<Vec<AggregatedRecord>>>,
    pub fail_inserts: AtomicBool,
    pub hang_inserts: AtomicBool,
    /// Wall clock (unix ms) when the last successful insert returned.
    pub last_insert_ms: AtomicI64,
}

impl MemoryPersister {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn batches(&self) -> Vec<Vec<AggregatedRecord>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Persister for MemoryPersister {
    async fn upsert_device_properties(
        &self,
        identity: &DeviceIdentity,
        limits: &DeviceLimits,
    ) -> anyhow::Result<()> {
        let mut props = self.properties.lock().unwrap();
        props
            .entry(identity.uuid.clone())
            .and_modify(|(_, l)| *l = limits.clone())
            .or_insert_with(|| (identity.clone(), limits.clone()));
        Ok(())
    }

    async fn insert_aggregated_batch(&self, records: &[AggregatedRecord]) -> anyhow::Result<u64> {
        if self.hang_inserts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        self.batches.lock().unwrap().push(records.to_vec());
        self.last_insert_ms
            .store(gpulogger::clock::now_ms(), Ordering::SeqCst);
        Ok(records.len() as u64)
    }
}

pub fn field_set(names: &[&str]) -> Arc<FieldSet> {
    Arc::new(FieldSet::new(names.iter().map(|s| s.to_string()).collect()))
}

pub fn sample(fields: &Arc<FieldSet>, device_id: u32, timestamp: i64, values: &[f64]) -> Sample {
    Sample {
        timestamp,
        device_id,
        serial: serial_of(device_id),
        uuid: uuid_of(device_id),
        fields: fields.clone(),
        values: values.to_vec(),
    }
}
