//! Overlay Sim - churn simulation for overlay trackers
//!
//! Stream parts are sharded across worker tasks. Each shard owns a
//! [`Tracker`](overlay_tracker::Tracker) and a set of simulated nodes that
//! join, leave and obey instructions until the run ends, after which every
//! overlay is checked for invariant violations.

pub mod config;
pub mod shard;

pub use config::SimConfig;
pub use shard::{run_shard, ShardReport};

use anyhow::Result;
use overlay_tracker::StreamPartId;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::debug;

/// Partitions per simulated stream.
const PARTITIONS_PER_STREAM: usize = 4;

/// Aggregated result of a simulation run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimReport {
    pub seed: u64,
    pub max_neighbors_per_node: i64,
    pub shards: Vec<ShardReport>,
}

impl SimReport {
    pub fn nodes(&self) -> usize {
        self.shards.iter().map(|s| s.nodes).sum()
    }

    pub fn instructions(&self) -> u64 {
        self.shards.iter().map(|s| s.instructions).sum()
    }

    pub fn saturated(&self) -> usize {
        self.shards.iter().map(|s| s.saturated).sum()
    }

    pub fn violations(&self) -> usize {
        self.shards.iter().map(|s| s.violations).sum()
    }

    pub fn truncated_cascades(&self) -> u64 {
        self.shards.iter().map(|s| s.truncated_cascades).sum()
    }

    /// Mean degree over all subscribed nodes.
    pub fn mean_degree(&self) -> f64 {
        let nodes = self.nodes();
        if nodes == 0 {
            return 0.0;
        }
        let degree_sum: f64 = self
            .shards
            .iter()
            .map(|s| s.mean_degree * s.nodes as f64)
            .sum();
        degree_sum / nodes as f64
    }
}

/// Stream parts `sim-stream-{n}#{partition}` for the run.
pub fn stream_parts(count: usize) -> Vec<StreamPartId> {
    (0..count)
        .map(|i| {
            StreamPartId::new(
                format!("sim-stream-{}", i / PARTITIONS_PER_STREAM),
                (i % PARTITIONS_PER_STREAM) as u32,
            )
        })
        .collect()
}

/// Run the simulation, one blocking task per shard.
pub async fn run(config: SimConfig) -> Result<SimReport> {
    config.validate()?;

    let mut shards: Vec<Vec<StreamPartId>> = vec![Vec::new(); config.workers];
    for (i, stream_part) in stream_parts(config.stream_parts).into_iter().enumerate() {
        shards[i % config.workers].push(stream_part);
    }

    let mut join_set = JoinSet::new();
    for (shard, parts) in shards.into_iter().enumerate() {
        let config = config.clone();
        debug!(shard, stream_parts = parts.len(), "Spawning shard");
        join_set.spawn_blocking(move || run_shard(&config, shard, parts));
    }

    let mut reports = Vec::with_capacity(config.workers);
    while let Some(joined) = join_set.join_next().await {
        reports.push(joined??);
    }
    reports.sort_by_key(|report| report.shard);

    Ok(SimReport {
        seed: config.seed,
        max_neighbors_per_node: config.tracker.max_neighbors_per_node,
        shards: reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_tracker::TrackerConfig;

    #[test]
    fn stream_parts_group_partitions_by_stream() {
        let parts = stream_parts(6);
        assert_eq!(parts[0], StreamPartId::new("sim-stream-0", 0));
        assert_eq!(parts[3], StreamPartId::new("sim-stream-0", 3));
        assert_eq!(parts[4], StreamPartId::new("sim-stream-1", 0));
        assert_eq!(parts[5], StreamPartId::new("sim-stream-1", 1));
    }

    #[tokio::test]
    async fn sharded_run_keeps_invariants() {
        let config = SimConfig {
            seed: 11,
            stream_parts: 5,
            workers: 2,
            nodes: 12,
            rounds: 3,
            leave_rate: 0.1,
            max_deliveries: 10_000,
            report_path: None,
            tracker: TrackerConfig::new(4),
        };

        let report = run(config).await.unwrap();

        assert_eq!(report.shards.len(), 2);
        assert_eq!(report.shards[0].shard, 0);
        assert_eq!(report.shards[0].stream_parts, 3);
        assert_eq!(report.shards[1].stream_parts, 2);
        assert_eq!(report.violations(), 0);
        assert!(report.instructions() > 0);
    }

    #[tokio::test]
    async fn more_workers_than_parts_leaves_idle_shards() {
        let config = SimConfig {
            stream_parts: 1,
            workers: 3,
            nodes: 4,
            rounds: 0,
            ..SimConfig::default()
        };

        let report = run(config).await.unwrap();

        assert_eq!(report.shards.len(), 3);
        assert_eq!(report.nodes(), 4);
        assert_eq!(report.shards[2].instructions, 0);
        assert_eq!(report.mean_degree(), 3.0);
    }
}
