//! Overlay Sim - drives trackers through joins and churn
//!
//! Configuration comes from `SIM_*` environment variables and
//! `OVERLAY_MAX_NEIGHBORS`; logging is controlled by `RUST_LOG`.

use overlay_sim::SimConfig;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("overlay_sim=info,overlay_tracker=info,overlay_topology=warn")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SimConfig::from_env()?;
    info!(
        seed = config.seed,
        stream_parts = config.stream_parts,
        workers = config.workers,
        nodes = config.nodes,
        rounds = config.rounds,
        leave_rate = config.leave_rate,
        max_neighbors_per_node = config.tracker.max_neighbors_per_node,
        "Starting overlay simulation"
    );

    let report_path = config.report_path.clone();
    let report = overlay_sim::run(config).await?;

    for shard in &report.shards {
        info!(
            shard = shard.shard,
            stream_parts = shard.stream_parts,
            nodes = shard.nodes,
            instructions = shard.instructions,
            mean_degree = %format!("{:.2}", shard.mean_degree),
            saturated = shard.saturated,
            "Shard finished"
        );
    }
    info!(
        nodes = report.nodes(),
        instructions = report.instructions(),
        mean_degree = %format!("{:.2}", report.mean_degree()),
        saturated = report.saturated(),
        truncated_cascades = report.truncated_cascades(),
        "Simulation finished"
    );

    if let Some(path) = report_path {
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        info!(path = %path, "Wrote report");
    }

    let violations = report.violations();
    if violations > 0 {
        error!(violations, "Topology invariants violated");
        return Err(format!("{violations} topology invariant violations").into());
    }

    Ok(())
}
