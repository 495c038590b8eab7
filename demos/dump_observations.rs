// Dump registered devices and recent device_observations rows as JSON (decodes wincode BLOBs).
//
// Usage: cargo run --example dump_observations -- [DB_PATH] [LIMIT]
//   DB_PATH  default: ./data/gpulogger.db
//   LIMIT    default: 5

use gpulogger::history_repo::HistoryRepo;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let path = args
        .get(1)
        .map(String::as_str)
        .unwrap_or("./data/gpulogger.db");
    let limit: u32 = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    // Retention only matters for pruning, which this tool never does.
    let repo = HistoryRepo::connect(path, 1).await?;
    let devices = repo.get_device_properties().await?;
    let observations = repo.get_recent_observations(limit).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "devices": devices,
            "observations": observations,
        }))?
    );
    Ok(())
}
