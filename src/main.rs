use anyhow::Result;
use gpulogger::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    // Configuration errors abort before any polling.
    let app_config = config::AppConfig::load()?;
    tracing::info!(name = version::NAME, version = version::VERSION, "starting");

    let smi = Arc::new(provider::NvidiaSmi::new(
        app_config.provider.command.clone(),
        Duration::from_millis(app_config.provider.timeout_ms),
    ));
    let history_repo = Arc::new(
        history_repo::HistoryRepo::connect(
            &app_config.database.path,
            app_config.database.retention_days,
        )
        .await?,
    );
    history_repo.init().await?;

    let devices = bootstrap::run(
        smi.as_ref(),
        history_repo.as_ref(),
        &app_config.sampling.devices,
        Duration::from_millis(app_config.database.write_timeout_ms),
    )
    .await?;
    let devices = Arc::new(devices);
    tracing::info!(
        fields = %app_config.sampling.query_fields.join(","),
        n_samples = app_config.sampling.n_samples,
        sample_poll_interval_ms = app_config.sampling.sample_poll_interval_ms,
        log_poll_interval_secs = app_config.sampling.log_poll_interval_secs,
        "acquiring averages"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (summary_tx, summary_rx) = watch::channel(None);

    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            provider: smi.clone(),
            persister: history_repo.clone(),
            device_ids: devices.iter().map(|d| d.identity.device_id).collect(),
            summary_tx,
            shutdown_rx: shutdown_rx.clone(),
        },
        worker::WorkerConfig::from_app_config(&app_config),
    );
    let maintenance_handle = maintenance_worker::spawn(
        history_repo.clone(),
        maintenance_worker::MaintenanceWorkerConfig::from(&app_config.database),
        shutdown_rx.clone(),
    );

    if app_config.server.enabled {
        let app = routes::app(devices.clone(), summary_rx);
        let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Listening on http://{}", addr);
        let mut server_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    sampling::wait_for_shutdown(&mut server_shutdown).await;
                })
                .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "status server stopped");
            }
        });
    }

    shutdown_signal().await;
    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    let _ = maintenance_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
