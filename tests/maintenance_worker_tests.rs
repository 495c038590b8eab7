// Maintenance worker: prunes on its first tick and stops on shutdown

use std::sync::Arc;
use std::time::Duration;

use gpulogger::history_repo::HistoryRepo;
use gpulogger::maintenance_worker::{MaintenanceWorkerConfig, is_valid_schedule, spawn};
use gpulogger::models::{AggregatedRecord, MetricValue};
use tempfile::TempDir;
use tokio::sync::watch;

fn record(timestamp: i64) -> AggregatedRecord {
    AggregatedRecord {
        timestamp,
        device_id: 0,
        serial: "SN-0".into(),
        uuid: "GPU-0000-0".into(),
        sample_count: 1,
        metrics: vec![MetricValue {
            name: "power.draw".into(),
            value: 1.0,
        }],
    }
}

#[tokio::test]
async fn maintenance_worker_prunes_and_shuts_down() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gpulog.db");
    let repo = Arc::new(HistoryRepo::connect(path.to_str().unwrap(), 1).await.unwrap());
    repo.init().await.unwrap();

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;
    repo.insert_aggregated_batch(&[record(now - 2 * 24 * 60 * 60 * 1000), record(now)])
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn(
        repo.clone(),
        MaintenanceWorkerConfig {
            maintenance_interval_secs: 3600,
            vacuum_schedule: None,
            vacuum_interval_secs: 3600,
        },
        shutdown_rx,
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if repo.get_recent_observations(10).await.unwrap().len() == 1 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "prune never ran");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker stops on shutdown")
        .unwrap();
}

#[test]
fn vacuum_schedule_validation() {
    assert!(is_valid_schedule("0 0 3 * * *"));
    assert!(is_valid_schedule("0 30 2 * * Sun"));
    assert!(!is_valid_schedule("nightly"));
    assert!(!is_valid_schedule(""));
}
