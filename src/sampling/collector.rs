// SampleCollector: one provider call for one device, parsed into a typed Sample.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::now_ms;
use crate::error::{CollectorError, Result};
use crate::models::{FieldSet, IDENTITY_FIELDS, Sample};
use crate::provider::MetricsProvider;

pub struct SampleCollector {
    provider: Arc<dyn MetricsProvider>,
    fields: Arc<FieldSet>,
    /// Identity fields followed by metric fields; built once.
    query: Vec<String>,
    timeout: Duration,
}

impl SampleCollector {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        fields: Arc<FieldSet>,
        timeout: Duration,
    ) -> Self {
        let query = fields.query();
        Self {
            provider,
            fields,
            query,
            timeout,
        }
    }

    pub fn fields(&self) -> &Arc<FieldSet> {
        &self.fields
    }

    /// Queries the provider once and parses every metric value as `f64`.
    pub async fn collect(&self, device_id: u32) -> Result<Sample> {
        let raw = tokio::time::timeout(
            self.timeout,
            self.provider.query_device(device_id, &self.query),
        )
        .await
        .map_err(|_| CollectorError::Provider {
            device_id,
            reason: format!("no response within {}ms", self.timeout.as_millis()),
        })??;
        if raw.len() != self.query.len() {
            return Err(CollectorError::DataFormat {
                device_id,
                reason: format!("expected {} values, got {}", self.query.len(), raw.len()),
                raw: raw.join(","),
            });
        }

        let n_identity = IDENTITY_FIELDS.len();
        let mut values = Vec::with_capacity(self.fields.len());
        for (name, text) in self.fields.names().iter().zip(&raw[n_identity..]) {
            let value = text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| CollectorError::DataFormat {
                    device_id,
                    reason: format!("field {} is not numeric: {:?}", name, text),
                    raw: raw.join(","),
                })?;
            values.push(value);
        }

        Ok(Sample {
            timestamp: now_ms(),
            device_id,
            serial: raw[0].clone(),
            uuid: raw[1].clone(),
            fields: self.fields.clone(),
            values,
        })
    }
}
