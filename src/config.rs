use serde::Deserialize;

use crate::models::IDENTITY_FIELDS;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    /// Spacing between samples inside one publish cycle.
    pub sample_poll_interval_ms: u64,
    /// Samples averaged into one published record.
    pub n_samples: u32,
    /// Spacing between publish cycles. Must cover a full sampling window.
    pub log_poll_interval_secs: u64,
    /// Ordered metric names passed to the provider (identity fields are added automatically).
    pub query_fields: Vec<String>,
    #[serde(default)]
    pub devices: DeviceSelection,
}

/// Which device ordinals to sample: `devices = "all"` or `devices = [0, 2]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "DeviceSelectionRaw")]
pub enum DeviceSelection {
    #[default]
    All,
    List(Vec<u32>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DeviceSelectionRaw {
    Keyword(String),
    List(Vec<u32>),
}

impl TryFrom<DeviceSelectionRaw> for DeviceSelection {
    type Error = String;

    fn try_from(raw: DeviceSelectionRaw) -> Result<Self, Self::Error> {
        match raw {
            DeviceSelectionRaw::Keyword(s) if s.eq_ignore_ascii_case("all") => {
                Ok(DeviceSelection::All)
            }
            DeviceSelectionRaw::Keyword(s) => Err(format!(
                "sampling.devices must be \"all\" or a list of device ids, got {:?}",
                s
            )),
            DeviceSelectionRaw::List(ids) => Ok(DeviceSelection::List(ids)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_command")]
    pub command: String,
    /// Upper bound on a single provider invocation.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            command: default_provider_command(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_provider_command() -> String {
    "nvidia-smi".into()
}

fn default_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    /// Upper bound on a single upsert / batch insert.
    #[serde(default = "default_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *"). Uses local time.
    #[serde(default)]
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
}

fn default_retention_days() -> u32 {
    30
}

fn default_maintenance_interval_secs() -> u64 {
    3600
}

fn default_vacuum_interval_secs() -> u64 {
    86400
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_server_enabled(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_server_enabled() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8082
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let sampling = &self.sampling;
        anyhow::ensure!(
            sampling.sample_poll_interval_ms > 0,
            "sampling.sample_poll_interval_ms must be > 0, got {}",
            sampling.sample_poll_interval_ms
        );
        anyhow::ensure!(
            sampling.n_samples >= 1,
            "sampling.n_samples must be >= 1, got {}",
            sampling.n_samples
        );
        anyhow::ensure!(
            sampling.log_poll_interval_secs > 0,
            "sampling.log_poll_interval_secs must be > 0, got {}",
            sampling.log_poll_interval_secs
        );
        let window_ms = sampling
            .sample_poll_interval_ms
            .saturating_mul(sampling.n_samples as u64);
        anyhow::ensure!(
            sampling.log_poll_interval_secs.saturating_mul(1000) >= window_ms,
            "sampling.log_poll_interval_secs ({}s) must be >= sample_poll_interval_ms * n_samples ({}ms)",
            sampling.log_poll_interval_secs,
            window_ms
        );
        anyhow::ensure!(
            !sampling.query_fields.is_empty(),
            "sampling.query_fields must be non-empty"
        );
        for (i, field) in sampling.query_fields.iter().enumerate() {
            anyhow::ensure!(
                !field.trim().is_empty(),
                "sampling.query_fields[{}] must be non-empty",
                i
            );
            anyhow::ensure!(
                !field.contains(','),
                "sampling.query_fields[{}] must not contain ',', got {:?}",
                i,
                field
            );
            anyhow::ensure!(
                !is_identity_field(field),
                "sampling.query_fields[{}]: {:?} is an identity field and is always queried",
                i,
                field
            );
            anyhow::ensure!(
                !sampling.query_fields[..i].contains(field),
                "sampling.query_fields contains duplicate {:?}",
                field
            );
        }
        if let DeviceSelection::List(ids) = &sampling.devices {
            anyhow::ensure!(
                !ids.is_empty(),
                "sampling.devices must be \"all\" or a non-empty list"
            );
        }
        anyhow::ensure!(
            !self.provider.command.is_empty(),
            "provider.command must be non-empty"
        );
        anyhow::ensure!(
            self.provider.timeout_ms > 0,
            "provider.timeout_ms must be > 0, got {}",
            self.provider.timeout_ms
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.write_timeout_ms > 0,
            "database.write_timeout_ms must be > 0, got {}",
            self.database.write_timeout_ms
        );
        anyhow::ensure!(
            self.database.retention_days > 0,
            "database.retention_days must be > 0, got {}",
            self.database.retention_days
        );
        anyhow::ensure!(
            self.database.maintenance_interval_secs > 0,
            "database.maintenance_interval_secs must be > 0, got {}",
            self.database.maintenance_interval_secs
        );
        anyhow::ensure!(
            self.database.vacuum_interval_secs > 0,
            "database.vacuum_interval_secs must be > 0, got {}",
            self.database.vacuum_interval_secs
        );
        if let Some(schedule) = &self.database.vacuum_schedule {
            anyhow::ensure!(
                crate::maintenance_worker::is_valid_schedule(schedule),
                "database.vacuum_schedule is not a valid cron expression: {:?}",
                schedule
            );
        }
        if self.server.enabled {
            anyhow::ensure!(
                self.server.port > 0,
                "server.port must be between 1 and 65535, got {}",
                self.server.port
            );
        }
        Ok(())
    }
}

fn is_identity_field(field: &str) -> bool {
    let f = field.trim();
    IDENTITY_FIELDS.contains(&f) || f == "gpu_serial" || f == "gpu_uuid"
}
