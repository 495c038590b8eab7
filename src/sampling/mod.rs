// Fine-grained sampling: collect, buffer, schedule, reduce.

pub mod aggregate;
mod buffer;
mod collector;
mod scheduler;

pub use buffer::SampleBuffer;
pub use collector::SampleCollector;
pub use scheduler::{RunOutcome, SampleScheduler, SchedulerState, wait_for_shutdown};
