// Raw samples and per-device sampling windows

use std::sync::Arc;

/// Identity fields prepended to every provider query, in this order.
pub const IDENTITY_FIELDS: [&str; 2] = ["serial", "uuid"];

/// Ordered metric field names, captured once from configuration.
/// Every sample and aggregate of a run shares one `FieldSet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet {
    names: Vec<String>,
}

impl FieldSet {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Full provider query: identity fields followed by the metric fields.
    pub fn query(&self) -> Vec<String> {
        IDENTITY_FIELDS
            .iter()
            .map(|s| s.to_string())
            .chain(self.names.iter().cloned())
            .collect()
    }
}

/// One observation of one device. `values[i]` belongs to `fields.names()[i]`.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Unix milliseconds when the provider answered.
    pub timestamp: i64,
    pub device_id: u32,
    pub serial: String,
    pub uuid: String,
    pub fields: Arc<FieldSet>,
    pub values: Vec<f64>,
}

impl Sample {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.fields.position(name).and_then(|i| self.values.get(i).copied())
    }
}

/// Chronologically ordered samples of one device for one publish cycle.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    pub device_id: u32,
    pub samples: Vec<Sample>,
}

impl SampleWindow {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
