//! Error taxonomy of the sampling hot loop.
//!
//! Nothing here is fatal to the process: provider and format errors exclude a
//! device from one cycle, invariant violations abort one cycle, persistence
//! errors drop one cycle's write. Bootstrap and configuration failures use
//! `anyhow` and abort startup instead.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CollectorError>;

#[derive(Error, Debug)]
pub enum CollectorError {
    /// Metrics call failed, exited non-zero or timed out.
    #[error("metrics provider failed for device {device_id}: {reason}")]
    Provider { device_id: u32, reason: String },

    /// Response had the wrong shape or a value was not numeric.
    #[error("malformed provider output for device {device_id}: {reason} (raw: {raw:?})")]
    DataFormat {
        device_id: u32,
        reason: String,
        raw: String,
    },

    /// Internal contract broken (buffer overfill, empty-window reduction).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl CollectorError {
    /// Device the error is scoped to, if any.
    pub fn device_id(&self) -> Option<u32> {
        match self {
            CollectorError::Provider { device_id, .. }
            | CollectorError::DataFormat { device_id, .. } => Some(*device_id),
            _ => None,
        }
    }

    /// True when the whole cycle must be abandoned, not just one device.
    pub fn is_fatal_to_cycle(&self) -> bool {
        matches!(self, CollectorError::InvariantViolation(_))
    }
}
