// SampleScheduler: bounded inner loop. Tick 0 fires immediately, then one tick
// per sample_poll_interval until n_samples ticks have fired.

use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use super::buffer::SampleBuffer;
use super::collector::SampleCollector;
use crate::error::{CollectorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// Next tick to fire.
    Running { tick: u32 },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All n_samples ticks fired.
    Completed,
    /// Shutdown observed between ticks; the partial buffer must be discarded.
    Cancelled,
}

/// One-shot state machine; construct a fresh one per publish cycle.
pub struct SampleScheduler {
    n_samples: u32,
    sample_interval: Duration,
    state: SchedulerState,
    ticks_fired: u32,
}

impl SampleScheduler {
    pub fn new(n_samples: u32, sample_interval: Duration) -> Self {
        Self {
            n_samples,
            sample_interval,
            state: SchedulerState::Idle,
            ticks_fired: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn ticks_fired(&self) -> u32 {
        self.ticks_fired
    }

    /// Runs to `Done`. Spacing is schedule-relative on tokio's monotonic clock:
    /// a late tick fires immediately and the next one is one interval after it.
    pub async fn run(
        &mut self,
        collector: &SampleCollector,
        buffer: &mut SampleBuffer,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RunOutcome> {
        if self.state != SchedulerState::Idle {
            return Err(CollectorError::InvariantViolation(format!(
                "sample scheduler started in state {:?}",
                self.state
            )));
        }
        if self.n_samples == 0 {
            self.state = SchedulerState::Done;
            return Err(CollectorError::InvariantViolation(
                "sample scheduler needs n_samples >= 1".into(),
            ));
        }

        let mut tick = interval(self.sample_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.state = SchedulerState::Running { tick: 0 };

        while let SchedulerState::Running { tick: next } = self.state {
            if next >= self.n_samples {
                self.state = SchedulerState::Done;
                break;
            }
            tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => {
                    debug!(ticks_fired = self.ticks_fired, "sampling cancelled");
                    self.state = SchedulerState::Done;
                    return Ok(RunOutcome::Cancelled);
                }
                _ = tick.tick() => {}
            }
            let fired = self.fire(collector, buffer).await;
            self.ticks_fired += 1;
            if let Err(e) = fired {
                self.state = SchedulerState::Done;
                return Err(e);
            }
            self.state = SchedulerState::Running { tick: next + 1 };
        }
        Ok(RunOutcome::Completed)
    }

    /// One tick: every still-active device is queried; all results land in the
    /// buffer before the next scheduling decision.
    async fn fire(&self, collector: &SampleCollector, buffer: &mut SampleBuffer) -> Result<()> {
        let devices = buffer.active_devices();
        let results = join_all(devices.iter().map(|&id| collector.collect(id))).await;
        for (device_id, result) in devices.into_iter().zip(results) {
            match result {
                Ok(sample) => buffer.append(device_id, sample)?,
                Err(e) if e.is_fatal_to_cycle() => return Err(e),
                Err(e) => {
                    match &e {
                        CollectorError::DataFormat { reason, raw, .. } => {
                            warn!(device_id, reason = %reason, raw = %raw, "malformed sample; device excluded from this cycle")
                        }
                        _ => {
                            warn!(device_id, error = %e, "provider error; device excluded from this cycle")
                        }
                    }
                    buffer.exclude(device_id, e);
                }
            }
        }
        Ok(())
    }
}

/// Resolves once shutdown is requested or the sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|&stop| stop).await;
}
