// Domain models

mod device;
mod observation;
mod sample;

pub use device::{DeviceIdentity, DeviceLimits, DeviceProperties};
pub use observation::{AggregatedRecord, CycleSummary, MetricValue};
pub use sample::{FieldSet, IDENTITY_FIELDS, Sample, SampleWindow};
