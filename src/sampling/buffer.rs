// SampleBuffer: one independent window per device, for exactly one publish cycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{CollectorError, Result};
use crate::models::{FieldSet, Sample, SampleWindow};

/// Upper bound on the per-device reserve; larger windows grow on demand.
const INITIAL_WINDOW_CAPACITY: usize = 1024;

#[derive(Debug)]
enum Slot {
    Filling(Vec<Sample>),
    /// Device hit a provider/format error this cycle; its window cannot complete.
    Excluded(CollectorError),
}

/// Per-cycle buffer. Construct a fresh one for every cycle.
#[derive(Debug)]
pub struct SampleBuffer {
    n_samples: usize,
    fields: Arc<FieldSet>,
    slots: BTreeMap<u32, Slot>,
}

impl SampleBuffer {
    pub fn new(device_ids: &[u32], n_samples: u32, fields: Arc<FieldSet>) -> Self {
        let n_samples = n_samples as usize;
        let reserve = n_samples.min(INITIAL_WINDOW_CAPACITY);
        let slots = device_ids
            .iter()
            .map(|&id| (id, Slot::Filling(Vec::with_capacity(reserve))))
            .collect();
        Self {
            n_samples,
            fields,
            slots,
        }
    }

    pub fn append(&mut self, device_id: u32, sample: Sample) -> Result<()> {
        if sample.device_id != device_id {
            return Err(CollectorError::InvariantViolation(format!(
                "sample for device {} appended to window of device {}",
                sample.device_id, device_id
            )));
        }
        if *sample.fields != *self.fields {
            return Err(CollectorError::InvariantViolation(format!(
                "sample for device {} has a different field set",
                device_id
            )));
        }
        match self.slots.get_mut(&device_id) {
            Some(Slot::Filling(samples)) => {
                if samples.len() >= self.n_samples {
                    return Err(CollectorError::InvariantViolation(format!(
                        "window for device {} already holds {} samples",
                        device_id, self.n_samples
                    )));
                }
                samples.push(sample);
                Ok(())
            }
            // Late samples for an excluded device are dropped.
            Some(Slot::Excluded(_)) => Ok(()),
            None => Err(CollectorError::InvariantViolation(format!(
                "device {} is not part of this cycle",
                device_id
            ))),
        }
    }

    /// Marks the device's window incomplete for the rest of the cycle.
    /// The first error is kept.
    pub fn exclude(&mut self, device_id: u32, error: CollectorError) {
        if let Some(slot) = self.slots.get_mut(&device_id)
            && matches!(slot, Slot::Filling(_))
        {
            *slot = Slot::Excluded(error);
        }
    }

    pub fn is_excluded(&self, device_id: u32) -> bool {
        matches!(self.slots.get(&device_id), Some(Slot::Excluded(_)))
    }

    pub fn exclusion(&self, device_id: u32) -> Option<&CollectorError> {
        match self.slots.get(&device_id) {
            Some(Slot::Excluded(e)) => Some(e),
            _ => None,
        }
    }

    pub fn is_complete(&self, device_id: u32) -> bool {
        matches!(
            self.slots.get(&device_id),
            Some(Slot::Filling(samples)) if samples.len() == self.n_samples
        )
    }

    pub fn len(&self, device_id: u32) -> usize {
        match self.slots.get(&device_id) {
            Some(Slot::Filling(samples)) => samples.len(),
            _ => 0,
        }
    }

    /// Devices still collecting, in ascending id order.
    pub fn active_devices(&self) -> Vec<u32> {
        self.slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Filling(_)))
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn device_ids(&self) -> Vec<u32> {
        self.slots.keys().copied().collect()
    }

    /// Takes the device's complete window out of the buffer.
    pub fn drain(&mut self, device_id: u32) -> Result<SampleWindow> {
        if !self.is_complete(device_id) {
            return Err(CollectorError::InvariantViolation(format!(
                "window for device {} drained before completion ({}/{})",
                device_id,
                self.len(device_id),
                self.n_samples
            )));
        }
        match self.slots.remove(&device_id) {
            Some(Slot::Filling(samples)) => Ok(SampleWindow { device_id, samples }),
            _ => Err(CollectorError::InvariantViolation(format!(
                "window for device {} vanished",
                device_id
            ))),
        }
    }
}
