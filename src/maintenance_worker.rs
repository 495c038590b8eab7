// Storage upkeep: drop observations older than retention_days, then VACUUM on a
// cron expression (local time) or a fixed period.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, info, instrument, warn};

use crate::config::DatabaseConfig;
use crate::history_repo::HistoryRepo;
use crate::sampling::wait_for_shutdown;

#[derive(Debug, Clone)]
pub struct MaintenanceWorkerConfig {
    pub maintenance_interval_secs: u64,
    /// Cron expression with seconds, e.g. "0 0 3 * * *" for 03:00 local time.
    pub vacuum_schedule: Option<String>,
    /// Used when `vacuum_schedule` is unset.
    pub vacuum_interval_secs: u64,
}

impl From<&DatabaseConfig> for MaintenanceWorkerConfig {
    fn from(db: &DatabaseConfig) -> Self {
        Self {
            maintenance_interval_secs: db.maintenance_interval_secs,
            vacuum_schedule: db.vacuum_schedule.clone(),
            vacuum_interval_secs: db.vacuum_interval_secs,
        }
    }
}

enum VacuumSchedule {
    Cron(Box<cron::Schedule>),
    Every(Duration),
    Never,
}

impl VacuumSchedule {
    fn from_config(config: &MaintenanceWorkerConfig) -> Self {
        match config.vacuum_schedule.as_deref() {
            Some(expr) => match cron::Schedule::from_str(expr) {
                Ok(schedule) => VacuumSchedule::Cron(Box::new(schedule)),
                Err(e) => {
                    warn!(cron = %expr, error = %e, "unusable vacuum_schedule; VACUUM disabled");
                    VacuumSchedule::Never
                }
            },
            None => VacuumSchedule::Every(Duration::from_secs(config.vacuum_interval_secs)),
        }
    }

    /// Deadline of the next VACUUM, or None when it never runs.
    fn next_deadline(&self) -> Option<Instant> {
        match self {
            VacuumSchedule::Cron(schedule) => {
                let now = chrono::Local::now();
                let next = schedule.after(&now).next()?;
                let wait = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                Some(Instant::now() + wait)
            }
            VacuumSchedule::Every(period) => Some(Instant::now() + *period),
            VacuumSchedule::Never => None,
        }
    }
}

pub fn spawn(
    repo: Arc<HistoryRepo>,
    config: MaintenanceWorkerConfig,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(repo, config, shutdown))
}

#[instrument(skip_all, fields(interval_secs = config.maintenance_interval_secs))]
async fn run(
    repo: Arc<HistoryRepo>,
    config: MaintenanceWorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut prune_tick = interval(Duration::from_secs(config.maintenance_interval_secs));
    prune_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let vacuum = VacuumSchedule::from_config(&config);
    let mut vacuum_at = vacuum.next_deadline();

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = prune_tick.tick() => match repo.prune_old_data().await {
                Ok(0) => debug!("nothing to prune"),
                Ok(pruned) => info!(pruned, "old observations pruned"),
                Err(e) => warn!(error = %e, operation = "prune_old_data", "prune failed"),
            },
            _ = sleep_until(vacuum_at.unwrap_or_else(Instant::now)), if vacuum_at.is_some() => {
                match repo.vacuum().await {
                    Ok(()) => info!("vacuum complete"),
                    Err(e) => warn!(error = %e, operation = "vacuum", "vacuum failed"),
                }
                vacuum_at = vacuum.next_deadline();
            }
        }
    }
    debug!("maintenance worker stopped");
}

/// True when `schedule` parses as a cron expression accepted by the vacuum scheduler.
pub fn is_valid_schedule(schedule: &str) -> bool {
    cron::Schedule::from_str(schedule).is_ok()
}
