// Publish loop. Every log_poll_interval one cycle runs: a full sampling window
// (blocking the loop), reduction per device, then one batch insert.
// Cycles never overlap; a failed cycle never stops the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{Instrument, debug, error, info, warn};

use crate::clock::now_ms;
use crate::config::AppConfig;
use crate::error::CollectorError;
use crate::models::{AggregatedRecord, CycleSummary, FieldSet};
use crate::persister::Persister;
use crate::provider::MetricsProvider;
use crate::sampling::{
    RunOutcome, SampleBuffer, SampleCollector, SampleScheduler, aggregate, wait_for_shutdown,
};

/// Provider, sink, devices and channels for the publish loop.
pub struct WorkerDeps {
    pub provider: Arc<dyn MetricsProvider>,
    pub persister: Arc<dyn Persister>,
    pub device_ids: Vec<u32>,
    pub summary_tx: watch::Sender<Option<CycleSummary>>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Timing and field configuration; immutable after startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub sample_interval: Duration,
    pub n_samples: u32,
    pub publish_interval: Duration,
    pub query_fields: Vec<String>,
    pub provider_timeout: Duration,
    pub write_timeout: Duration,
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            sample_interval: Duration::from_millis(config.sampling.sample_poll_interval_ms),
            n_samples: config.sampling.n_samples,
            publish_interval: Duration::from_secs(config.sampling.log_poll_interval_secs),
            query_fields: config.sampling.query_fields.clone(),
            provider_timeout: Duration::from_millis(config.provider.timeout_ms),
            write_timeout: Duration::from_millis(config.database.write_timeout_ms),
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    Published(CycleSummary),
    /// Shutdown arrived mid-window; nothing was written.
    Cancelled,
    /// Invariant violation; nothing was written.
    Aborted(CollectorError),
}

/// State carried across cycles: device list, field set, counters. Owned by the
/// publish loop; every cycle builds its own buffer and scheduler.
pub struct CollectorSession {
    device_ids: Vec<u32>,
    n_samples: u32,
    sample_interval: Duration,
    write_timeout: Duration,
    collector: SampleCollector,
    persister: Arc<dyn Persister>,
    cycles: u64,
    records_written: u64,
}

impl CollectorSession {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        persister: Arc<dyn Persister>,
        device_ids: Vec<u32>,
        config: &WorkerConfig,
    ) -> Self {
        let fields = Arc::new(FieldSet::new(config.query_fields.clone()));
        Self {
            device_ids,
            n_samples: config.n_samples,
            sample_interval: config.sample_interval,
            write_timeout: config.write_timeout,
            collector: SampleCollector::new(provider, fields, config.provider_timeout),
            persister,
            cycles: 0,
            records_written: 0,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// One publish cycle: sample, reduce, persist.
    pub async fn run_cycle(&mut self, shutdown: &mut watch::Receiver<bool>) -> CycleOutcome {
        self.cycles += 1;
        let cycle = self.cycles;
        let mut buffer = SampleBuffer::new(
            &self.device_ids,
            self.n_samples,
            self.collector.fields().clone(),
        );
        let mut scheduler = SampleScheduler::new(self.n_samples, self.sample_interval);

        match scheduler
            .run(&self.collector, &mut buffer, shutdown)
            .await
        {
            Ok(RunOutcome::Completed) => {}
            Ok(RunOutcome::Cancelled) => {
                debug!(cycle, "cycle cancelled; partial windows discarded");
                return CycleOutcome::Cancelled;
            }
            Err(e) => {
                error!(cycle, error = %e, "sampling aborted");
                return CycleOutcome::Aborted(e);
            }
        }

        let mut records: Vec<AggregatedRecord> = Vec::with_capacity(self.device_ids.len());
        let mut excluded = Vec::new();
        for device_id in buffer.device_ids() {
            if !buffer.is_complete(device_id) {
                debug!(
                    cycle,
                    device_id,
                    reason = ?buffer.exclusion(device_id).map(|e| e.to_string()),
                    "window incomplete"
                );
                excluded.push(device_id);
                continue;
            }
            let reduced = buffer.drain(device_id).and_then(|w| aggregate::reduce(&w));
            match reduced {
                Ok(record) => records.push(record),
                Err(e) if e.is_fatal_to_cycle() => {
                    error!(cycle, device_id, error = %e, "aggregation aborted");
                    return CycleOutcome::Aborted(e);
                }
                Err(e) => {
                    warn!(cycle, device_id, error = %e, "aggregate dropped");
                    excluded.push(device_id);
                }
            }
        }

        let persisted = self.persist(cycle, &records).await;
        if persisted {
            self.records_written += records.len() as u64;
            if !excluded.is_empty() {
                warn!(
                    cycle,
                    written = records.len(),
                    excluded = ?excluded,
                    "partial cycle persisted"
                );
            } else {
                info!(cycle, written = records.len(), "cycle persisted");
            }
        }

        CycleOutcome::Published(CycleSummary {
            cycle,
            completed_at: now_ms(),
            records,
            excluded_devices: excluded,
            persisted,
        })
    }

    async fn persist(&self, cycle: u64, records: &[AggregatedRecord]) -> bool {
        if records.is_empty() {
            warn!(cycle, "no complete windows; nothing to persist");
            return false;
        }
        let result = match timeout(
            self.write_timeout,
            self.persister.insert_aggregated_batch(records),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(CollectorError::Persistence(e.to_string())),
            Err(_) => Err(CollectorError::Persistence(format!(
                "batch insert timed out after {}ms",
                self.write_timeout.as_millis()
            ))),
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    cycle,
                    error = %e,
                    operation = "insert_aggregated_batch",
                    records_count = records.len(),
                    "cycle write dropped"
                );
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Idle,
    Cycling,
}

/// Outer loop: first cycle immediately, then one per publish_interval until shutdown.
pub struct PublishScheduler {
    session: CollectorSession,
    publish_interval: Duration,
    summary_tx: watch::Sender<Option<CycleSummary>>,
    state: PublishState,
}

impl PublishScheduler {
    pub fn new(
        session: CollectorSession,
        publish_interval: Duration,
        summary_tx: watch::Sender<Option<CycleSummary>>,
    ) -> Self {
        Self {
            session,
            publish_interval,
            summary_tx,
            state: PublishState::Idle,
        }
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    /// Runs until shutdown; returns the session for inspection.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> CollectorSession {
        let mut tick = interval(self.publish_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    debug!("publish loop shutting down");
                    break;
                }
                _ = tick.tick() => {}
            }

            self.state = PublishState::Cycling;
            let outcome = self.session.run_cycle(&mut shutdown).await;
            self.state = PublishState::Idle;
            match outcome {
                CycleOutcome::Published(summary) => {
                    self.summary_tx.send_replace(Some(summary));
                }
                CycleOutcome::Cancelled => break,
                // Already logged; next tick starts a fresh cycle.
                CycleOutcome::Aborted(_) => {}
            }
        }

        info!(
            cycles = self.session.cycles(),
            records_written = self.session.records_written(),
            "collector stopped"
        );
        self.session
    }
}

pub fn spawn(deps: WorkerDeps, config: WorkerConfig) -> tokio::task::JoinHandle<()> {
    let WorkerDeps {
        provider,
        persister,
        device_ids,
        summary_tx,
        shutdown_rx,
    } = deps;

    let worker_span = tracing::span!(
        tracing::Level::DEBUG,
        "worker",
        n_samples = config.n_samples,
        sample_interval_ms = config.sample_interval.as_millis() as u64
    );
    tokio::spawn(
        async move {
            let session = CollectorSession::new(provider, persister, device_ids, &config);
            let scheduler = PublishScheduler::new(session, config.publish_interval, summary_tx);
            scheduler.run(shutdown_rx).await;
        }
        .instrument(worker_span),
    )
}
