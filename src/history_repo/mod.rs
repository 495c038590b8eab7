// SQLite store: device_properties (keyed upsert by uuid) and device_observations (append-only).
// Uses sqlx for async + connection pooling. Metric lists stored as versioned wincode BLOBs.

mod blob;

use crate::clock::now_ms;
use crate::models::{
    AggregatedRecord, DeviceIdentity, DeviceLimits, DeviceProperties, MetricValue,
};
use crate::persister::Persister;
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub struct HistoryRepo {
    pool: SqlitePool,
    retention_ms: i64,
}

impl HistoryRepo {
    /// Opens (creating if needed) the database at `path` in WAL mode.
    pub async fn connect(path: &str, retention_days: u32) -> anyhow::Result<Self> {
        let db_path = Path::new(path);
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self {
            pool,
            retention_ms: i64::from(retention_days) * DAY_MS,
        })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_properties (
                uuid TEXT PRIMARY KEY,
                device_id INTEGER NOT NULL,
                model TEXT NOT NULL,
                serial TEXT NOT NULL,
                memory_total_mib INTEGER NOT NULL,
                power_limit_w REAL,
                temperature_slowdown_c REAL,
                temperature_shutdown_c REAL,
                first_seen_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                device_id INTEGER NOT NULL,
                serial TEXT NOT NULL,
                uuid TEXT NOT NULL,
                sample_count INTEGER NOT NULL,
                metrics BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_observations_uuid_created_at ON device_observations(uuid, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_observations_created_at ON device_observations(created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, identity, limits), fields(repo = "history", operation = "upsert_device_properties", uuid = %identity.uuid))]
    pub async fn upsert_device_properties(
        &self,
        identity: &DeviceIdentity,
        limits: &DeviceLimits,
    ) -> anyhow::Result<()> {
        let now = now_ms();
        sqlx::query(
            r#"
            INSERT INTO device_properties
            (uuid, device_id, model, serial, memory_total_mib, power_limit_w,
             temperature_slowdown_c, temperature_shutdown_c, first_seen_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT(uuid) DO UPDATE SET
                memory_total_mib = excluded.memory_total_mib,
                power_limit_w = excluded.power_limit_w,
                temperature_slowdown_c = excluded.temperature_slowdown_c,
                temperature_shutdown_c = excluded.temperature_shutdown_c,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&identity.uuid)
        .bind(identity.device_id as i64)
        .bind(&identity.model)
        .bind(&identity.serial)
        .bind(limits.memory_total_mib as i64)
        .bind(limits.power_limit_w)
        .bind(limits.temperature_slowdown_c)
        .bind(limits.temperature_shutdown_c)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, records), fields(repo = "history", operation = "insert_aggregated_batch", records_count = records.len()))]
    pub async fn insert_aggregated_batch(&self, records: &[AggregatedRecord]) -> anyhow::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for r in records {
            let metrics = blob::with_version_prefix(
                blob::METRICS_BLOB_VERSION,
                wincode::serialize(&r.metrics).map_err(|e| anyhow::anyhow!("wincode: {}", e))?,
            );
            let res = sqlx::query(
                "INSERT INTO device_observations (created_at, device_id, serial, uuid, sample_count, metrics) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(r.timestamp)
            .bind(r.device_id as i64)
            .bind(&r.serial)
            .bind(&r.uuid)
            .bind(r.sample_count as i64)
            .bind(&metrics)
            .execute(&mut *tx)
            .await?;
            written += res.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    /// All stored device properties, ordered by device ordinal.
    pub async fn get_device_properties(&self) -> anyhow::Result<Vec<DeviceProperties>> {
        let rows = sqlx::query(
            "SELECT uuid, device_id, model, serial, memory_total_mib, power_limit_w,
                    temperature_slowdown_c, temperature_shutdown_c
             FROM device_properties ORDER BY device_id ASC, uuid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let device_id: i64 = row.try_get("device_id")?;
            let memory_total_mib: i64 = row.try_get("memory_total_mib")?;
            out.push(DeviceProperties {
                identity: DeviceIdentity {
                    device_id: device_id as u32,
                    model: row.try_get("model")?,
                    serial: row.try_get("serial")?,
                    uuid: row.try_get("uuid")?,
                },
                limits: DeviceLimits {
                    memory_total_mib: memory_total_mib as u64,
                    power_limit_w: row.try_get("power_limit_w")?,
                    temperature_slowdown_c: row.try_get("temperature_slowdown_c")?,
                    temperature_shutdown_c: row.try_get("temperature_shutdown_c")?,
                },
            });
        }
        Ok(out)
    }

    /// Most recent observations, returned oldest first.
    pub async fn get_recent_observations(&self, limit: u32) -> anyhow::Result<Vec<AggregatedRecord>> {
        let rows = sqlx::query(
            "SELECT created_at, device_id, serial, uuid, sample_count, metrics
             FROM device_observations ORDER BY id DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_observation_row(&row)?);
        }
        out.reverse();
        Ok(out)
    }

    #[instrument(skip(self), fields(repo = "history", operation = "prune_old_data"))]
    pub async fn prune_old_data(&self) -> anyhow::Result<u64> {
        let cutoff = now_ms() - self.retention_ms;
        let r = sqlx::query("DELETE FROM device_observations WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }

    /// Reclaim space after deletes (run periodically after pruning).
    #[instrument(skip(self), fields(repo = "history", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    fn parse_observation_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<AggregatedRecord> {
        let created_at: i64 = row.try_get("created_at")?;
        let device_id: i64 = row.try_get("device_id")?;
        let sample_count: i64 = row.try_get("sample_count")?;
        let metrics_data: Vec<u8> = row.try_get("metrics")?;
        let metrics = blob::blob_payload(&metrics_data, blob::METRICS_BLOB_VERSION)
            .ok_or_else(|| anyhow::anyhow!("unknown metrics blob version"))?;
        let metrics: Vec<MetricValue> = wincode::deserialize(metrics)
            .map_err(|e| anyhow::anyhow!("wincode deserialize metrics: {}", e))?;

        Ok(AggregatedRecord {
            timestamp: created_at,
            device_id: device_id as u32,
            serial: row.try_get("serial")?,
            uuid: row.try_get("uuid")?,
            sample_count: sample_count as u32,
            metrics,
        })
    }
}

#[async_trait::async_trait]
impl Persister for HistoryRepo {
    async fn upsert_device_properties(
        &self,
        identity: &DeviceIdentity,
        limits: &DeviceLimits,
    ) -> anyhow::Result<()> {
        HistoryRepo::upsert_device_properties(self, identity, limits).await
    }

    async fn insert_aggregated_batch(&self, records: &[AggregatedRecord]) -> anyhow::Result<u64> {
        HistoryRepo::insert_aggregated_batch(self, records).await
    }
}
