//! One shard of the simulation: a tracker and the nodes it coordinates.
//!
//! Nodes obey every instruction they receive by reporting the instructed
//! neighbor list back with the instruction's counter, the way a real node
//! would after connecting to its new neighbors.

use std::collections::{HashSet, VecDeque};

use anyhow::Result;
use overlay_topology::UniformRandom;
use overlay_tracker::{
    Instruction, InstructionCounterValue, NodeId, StatusReport, StreamPartId, Tracker,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SimConfig;

/// Summary of a finished shard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardReport {
    pub shard: usize,
    pub stream_parts: usize,
    /// Subscribed nodes summed over stream parts
    pub nodes: usize,
    pub instructions: u64,
    pub lone_node_instructions: u64,
    /// Events whose instruction cascade hit `max_deliveries`
    pub truncated_cascades: u64,
    pub mean_degree: f64,
    /// Nodes with `min(max_neighbors, overlay_size - 1)` neighbors
    pub saturated: usize,
    pub violations: usize,
}

/// Nodes of a shard as seen from their side.
struct Network {
    subscribed: HashSet<(StreamPartId, NodeId)>,
    max_deliveries: usize,
    instructions: u64,
    lone_node_instructions: u64,
    truncated_cascades: u64,
}

impl Network {
    fn new(max_deliveries: usize) -> Self {
        Self {
            subscribed: HashSet::new(),
            max_deliveries,
            instructions: 0,
            lone_node_instructions: 0,
            truncated_cascades: 0,
        }
    }

    fn join(
        &mut self,
        tracker: &mut Tracker,
        node_id: NodeId,
        stream_part: &StreamPartId,
    ) -> Result<()> {
        self.subscribed.insert((stream_part.clone(), node_id.clone()));
        let instructions =
            tracker.process_status(StatusReport::subscribed(node_id, stream_part, Vec::new(), 0))?;
        self.deliver(tracker, instructions)
    }

    fn leave(
        &mut self,
        tracker: &mut Tracker,
        node_id: NodeId,
        stream_part: &StreamPartId,
    ) -> Result<()> {
        self.subscribed.remove(&(stream_part.clone(), node_id.clone()));
        let instructions = tracker.process_status(StatusReport::unsubscribed(node_id, stream_part))?;
        self.deliver(tracker, instructions)
    }

    fn is_subscribed(&self, node_id: &NodeId, stream_part: &StreamPartId) -> bool {
        self.subscribed
            .contains(&(stream_part.clone(), node_id.clone()))
    }

    /// Deliver instructions and every instruction their reports trigger.
    fn deliver(&mut self, tracker: &mut Tracker, initial: Vec<Instruction>) -> Result<()> {
        let mut queue = VecDeque::from(initial);
        let mut delivered = 0;

        while let Some(instruction) = queue.pop_front() {
            if delivered == self.max_deliveries {
                warn!(
                    pending = queue.len() + 1,
                    "Instruction cascade truncated"
                );
                self.truncated_cascades += 1;
                break;
            }
            delivered += 1;
            self.instructions += 1;

            let Instruction {
                node_id,
                stream_part,
                new_neighbors,
                counter,
            } = instruction;

            // Nodes that left in the meantime ignore the instruction
            if !self.is_subscribed(&node_id, &stream_part) {
                continue;
            }

            match counter {
                InstructionCounterValue::LoneNode => self.lone_node_instructions += 1,
                InstructionCounterValue::Sequence(seq) => {
                    let report =
                        StatusReport::subscribed(node_id, &stream_part, new_neighbors, seq);
                    queue.extend(tracker.process_status(report)?);
                }
            }
        }
        Ok(())
    }
}

/// Run joins and churn for `stream_parts` on a dedicated tracker.
///
/// Shard `shard` is seeded with `config.seed + shard`, so equal configs give
/// equal reports. Fails without running anything if `config` is invalid.
pub fn run_shard(
    config: &SimConfig,
    shard: usize,
    stream_parts: Vec<StreamPartId>,
) -> Result<ShardReport> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(shard as u64));
    let mut seeder = StdRng::seed_from_u64(rng.gen());
    let mut tracker = Tracker::with_randomness(&config.tracker, move || {
        UniformRandom::seeded(seeder.gen())
    })?;
    let mut network = Network::new(config.max_deliveries);

    let node_ids: Vec<NodeId> = (0..config.nodes)
        .map(|i| NodeId::new(format!("node-{i}")))
        .collect();

    for stream_part in &stream_parts {
        for node_id in &node_ids {
            network.join(&mut tracker, node_id.clone(), stream_part)?;
        }
    }
    debug!(shard, instructions = network.instructions, "Initial joins done");

    for round in 0..config.rounds {
        for stream_part in &stream_parts {
            for node_id in &node_ids {
                if network.is_subscribed(node_id, stream_part) {
                    if rng.gen_bool(config.leave_rate) {
                        network.leave(&mut tracker, node_id.clone(), stream_part)?;
                    }
                } else if rng.gen_bool(0.5) {
                    network.join(&mut tracker, node_id.clone(), stream_part)?;
                }
            }
        }
        debug!(
            shard,
            round,
            subscribed = network.subscribed.len(),
            instructions = network.instructions,
            "Churn round done"
        );
    }

    let max = tracker.max_neighbors_per_node();
    let mut nodes = 0;
    let mut degree_sum = 0;
    let mut saturated = 0;
    let mut violations = 0;

    for stream_part in &stream_parts {
        let Some(overlay) = tracker.overlay(stream_part) else {
            continue;
        };
        let target = max.min(overlay.node_count().saturating_sub(1));
        for node_id in overlay.nodes() {
            let degree = overlay.degree(node_id);
            nodes += 1;
            degree_sum += degree;
            if degree == target {
                saturated += 1;
            }
        }
        for violation in overlay.invariant_violations() {
            warn!(shard, %stream_part, ?violation, "Topology invariant violated");
            violations += 1;
        }
    }

    tracker.stop();

    Ok(ShardReport {
        shard,
        stream_parts: stream_parts.len(),
        nodes,
        instructions: network.instructions,
        lone_node_instructions: network.lone_node_instructions,
        truncated_cascades: network.truncated_cascades,
        mean_degree: if nodes == 0 {
            0.0
        } else {
            degree_sum as f64 / nodes as f64
        },
        saturated,
        violations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_tracker::TrackerConfig;

    fn small_config() -> SimConfig {
        SimConfig {
            seed: 7,
            stream_parts: 2,
            workers: 1,
            nodes: 10,
            rounds: 4,
            leave_rate: 0.2,
            max_deliveries: 10_000,
            report_path: None,
            tracker: TrackerConfig::new(3),
        }
    }

    fn parts() -> Vec<StreamPartId> {
        vec![StreamPartId::new("s", 0), StreamPartId::new("s", 1)]
    }

    #[test]
    fn shard_keeps_invariants() {
        let report = run_shard(&small_config(), 0, parts()).unwrap();

        assert_eq!(report.stream_parts, 2);
        assert_eq!(report.violations, 0);
        assert!(report.instructions > 0);
        assert_eq!(report.truncated_cascades, 0);
    }

    #[test]
    fn equal_seeds_give_equal_reports() {
        let config = small_config();
        let first = run_shard(&config, 3, parts()).unwrap();
        let second = run_shard(&config, 3, parts()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn joins_without_churn_saturate_every_node() {
        let config = SimConfig {
            rounds: 0,
            ..small_config()
        };
        let report = run_shard(&config, 0, parts()).unwrap();

        assert_eq!(report.nodes, 20);
        assert_eq!(report.saturated, 20);
        assert_eq!(report.mean_degree, 3.0);
    }

    #[test]
    fn invalid_leave_rate_is_an_error() {
        for leave_rate in [f64::NAN, -0.5, 1.5] {
            let config = SimConfig {
                leave_rate,
                ..small_config()
            };
            assert!(run_shard(&config, 0, parts()).is_err(), "accepted {leave_rate}");
        }
    }

    #[test]
    fn lone_node_gets_lone_node_instruction() {
        let config = SimConfig {
            nodes: 1,
            rounds: 0,
            ..small_config()
        };
        let report = run_shard(&config, 0, vec![StreamPartId::new("s", 0)]).unwrap();

        assert_eq!(report.nodes, 1);
        assert_eq!(report.lone_node_instructions, 1);
        assert_eq!(report.saturated, 1);
    }
}
