// Aggregator: reduce one complete window into one averaged record.

use crate::error::{CollectorError, Result};
use crate::models::{AggregatedRecord, MetricValue, SampleWindow};

/// Identity from the last sample; every metric is `sum / n` over the window.
pub fn reduce(window: &SampleWindow) -> Result<AggregatedRecord> {
    let Some(last) = window.samples.last() else {
        return Err(CollectorError::InvariantViolation(format!(
            "cannot reduce empty window for device {}",
            window.device_id
        )));
    };
    let fields = &last.fields;

    let mut sums = vec![0.0_f64; fields.len()];
    for sample in &window.samples {
        if sample.device_id != window.device_id || sample.fields != *fields {
            return Err(CollectorError::InvariantViolation(format!(
                "window for device {} mixes devices or field sets",
                window.device_id
            )));
        }
        if sample.values.len() != fields.len() {
            return Err(CollectorError::DataFormat {
                device_id: window.device_id,
                reason: format!(
                    "sample has {} values for {} fields",
                    sample.values.len(),
                    fields.len()
                ),
                raw: format!("{:?}", sample.values),
            });
        }
        for (sum, value) in sums.iter_mut().zip(&sample.values) {
            *sum += value;
        }
    }

    let n = window.samples.len() as f64;
    let metrics = fields
        .names()
        .iter()
        .zip(sums)
        .map(|(name, sum)| MetricValue {
            name: name.clone(),
            value: sum / n,
        })
        .collect::<Vec<_>>();

    if let Some(bad) = metrics.iter().find(|m| !m.value.is_finite()) {
        return Err(CollectorError::DataFormat {
            device_id: window.device_id,
            reason: format!("mean of {} is not finite", bad.name),
            raw: format!("{:?}", bad.value),
        });
    }

    Ok(AggregatedRecord {
        timestamp: last.timestamp,
        device_id: window.device_id,
        serial: last.serial.clone(),
        uuid: last.uuid.clone(),
        sample_count: window.samples.len() as u32,
        metrics,
    })
}
