// Config loading and validation tests

use gpulogger::config::{AppConfig, DeviceSelection};

const VALID_CONFIG: &str = r#"
[sampling]
sample_poll_interval_ms = 100
n_samples = 20
log_poll_interval_secs = 10
query_fields = ["power.draw", "temperature.gpu", "utilization.gpu"]

[database]
path = "data/gpulog.db"
"#;

fn with_sampling(sample_ms: u64, n: u32, log_secs: u64) -> String {
    format!(
        r#"
[sampling]
sample_poll_interval_ms = {}
n_samples = {}
log_poll_interval_secs = {}
query_fields = ["power.draw"]

[database]
path = "data/gpulog.db"
"#,
        sample_ms, n, log_secs
    )
}

fn replace(from: &str, to: &str) -> String {
    VALID_CONFIG.replace(from, to)
}

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.sampling.sample_poll_interval_ms, 100);
    assert_eq!(config.sampling.n_samples, 20);
    assert_eq!(config.sampling.log_poll_interval_secs, 10);
    assert_eq!(
        config.sampling.query_fields,
        vec!["power.draw", "temperature.gpu", "utilization.gpu"]
    );
    assert_eq!(config.sampling.devices, DeviceSelection::All);
    assert_eq!(config.database.path, "data/gpulog.db");
}

#[test]
fn test_config_defaults() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    assert_eq!(config.provider.command, "nvidia-smi");
    assert_eq!(config.provider.timeout_ms, 5000);
    assert_eq!(config.database.write_timeout_ms, 5000);
    assert_eq!(config.database.retention_days, 30);
    assert_eq!(config.database.maintenance_interval_secs, 3600);
    assert!(config.database.vacuum_schedule.is_none());
    assert!(config.server.enabled);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8082);
}

#[test]
fn test_config_device_selection() {
    let all = replace("[database]", "devices = \"all\"\n\n[database]");
    assert_eq!(
        AppConfig::load_from_str(&all).unwrap().sampling.devices,
        DeviceSelection::All
    );

    let list = replace("[database]", "devices = [0, 2]\n\n[database]");
    assert_eq!(
        AppConfig::load_from_str(&list).unwrap().sampling.devices,
        DeviceSelection::List(vec![0, 2])
    );

    let bogus = replace("[database]", "devices = \"some\"\n\n[database]");
    assert!(AppConfig::load_from_str(&bogus).is_err());

    let empty = replace("[database]", "devices = []\n\n[database]");
    let err = AppConfig::load_from_str(&empty).unwrap_err();
    assert!(err.to_string().contains("sampling.devices"));
}

#[test]
fn test_config_log_interval_must_cover_sampling_window() {
    // 100ms * 20 = 2s window
    assert!(AppConfig::load_from_str(&with_sampling(100, 20, 2)).is_ok());
    let err = AppConfig::load_from_str(&with_sampling(100, 20, 1)).unwrap_err();
    assert!(
        err.to_string().contains("sampling.log_poll_interval_secs"),
        "got {}",
        err
    );
    // 1s * 30 = 30s window
    assert!(AppConfig::load_from_str(&with_sampling(1000, 30, 29)).is_err());
}

#[test]
fn test_config_rejects_zero_values() {
    assert!(AppConfig::load_from_str(&with_sampling(0, 20, 10)).is_err());
    assert!(AppConfig::load_from_str(&with_sampling(100, 0, 10)).is_err());
    assert!(AppConfig::load_from_str(&with_sampling(100, 1, 0)).is_err());
}

#[test]
fn test_config_rejects_bad_query_fields() {
    let empty = replace(
        "[\"power.draw\", \"temperature.gpu\", \"utilization.gpu\"]",
        "[]",
    );
    assert!(AppConfig::load_from_str(&empty).is_err());

    let comma = replace("\"utilization.gpu\"", "\"utilization.gpu,fan.speed\"");
    assert!(AppConfig::load_from_str(&comma).is_err());

    let identity = replace("\"utilization.gpu\"", "\"uuid\"");
    let err = AppConfig::load_from_str(&identity).unwrap_err();
    assert!(err.to_string().contains("identity field"));

    let dup = replace("\"utilization.gpu\"", "\"power.draw\"");
    let err = AppConfig::load_from_str(&dup).unwrap_err();
    assert!(err.to_string().contains("duplicate"));
}

#[test]
fn test_config_rejects_bad_vacuum_schedule() {
    let ok = replace(
        "path = \"data/gpulog.db\"",
        "path = \"data/gpulog.db\"\nvacuum_schedule = \"0 0 3 * * *\"",
    );
    assert!(AppConfig::load_from_str(&ok).is_ok());

    let bad = replace(
        "path = \"data/gpulog.db\"",
        "path = \"data/gpulog.db\"\nvacuum_schedule = \"every night\"",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("database.vacuum_schedule"));
}

#[test]
fn test_config_rejects_zero_port_when_server_enabled() {
    let config = format!("{}\n[server]\nport = 0\n", VALID_CONFIG);
    assert!(AppConfig::load_from_str(&config).is_err());

    let disabled = format!("{}\n[server]\nenabled = false\nport = 0\n", VALID_CONFIG);
    assert!(AppConfig::load_from_str(&disabled).is_ok());
}

#[test]
fn test_config_missing_section_is_error() {
    let no_sampling = "[database]\npath = \"x.db\"\n";
    assert!(AppConfig::load_from_str(no_sampling).is_err());
}

#[test]
fn test_config_load_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    // SAFETY: no other test in this binary reads CONFIG_FILE.
    unsafe {
        std::env::set_var("CONFIG_FILE", &path);
    }
    let config = AppConfig::load().expect("load from CONFIG_FILE");
    assert_eq!(config.sampling.n_samples, 20);
}

#[test]
fn test_example_config_is_valid() {
    let config = AppConfig::load_from_str(include_str!("../config.example.toml"))
        .expect("config.example.toml");
    let fields = &config.sampling.query_fields;
    assert_eq!(fields[..2], ["power.draw", "temperature.gpu"]);
    assert!(!fields.iter().any(|f| f == "fan.speed"));
}
