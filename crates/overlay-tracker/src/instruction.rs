//! Instructions sent to nodes, and their per-node sequence numbers.
//!
//! Every instruction a node receives for a stream part carries an increasing
//! counter. Nodes echo the counter of the last instruction they applied in
//! their status reports, which lets the tracker drop reports that were sent
//! before the node saw its latest instruction.

use std::collections::HashMap;

use overlay_topology::NodeId;
use serde::{Deserialize, Serialize};

use crate::status::{StatusCounter, StatusReport, StreamPartId};

/// Counter attached to an outgoing instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstructionCounterValue {
    /// Position in the node's instruction sequence for the stream part.
    Sequence(u64),
    /// The node is alone in the stream part; not part of any sequence.
    LoneNode,
}

/// "Set your neighbors in this stream part to exactly these nodes."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    pub node_id: NodeId,
    pub stream_part: StreamPartId,
    pub new_neighbors: Vec<NodeId>,
    pub counter: InstructionCounterValue,
}

/// Instruction sequence numbers per node and stream part.
#[derive(Debug, Default)]
pub struct InstructionCounter {
    counters: HashMap<NodeId, HashMap<StreamPartId, u64>>,
}

impl InstructionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the node's counter for the stream part and return the new value.
    pub fn set_or_increment(&mut self, node_id: &NodeId, stream_part: &StreamPartId) -> u64 {
        let counter = self.entry(node_id, stream_part);
        *counter += 1;
        *counter
    }

    /// Whether the report reflects the latest instruction sent to its node.
    ///
    /// Unsubscribes are always accepted.
    pub fn is_most_recent(&mut self, report: &StatusReport) -> bool {
        let stream_part = report.stream_part.stream_part_id();
        let current = *self.entry(&report.node_id, &stream_part);

        match report.stream_part.counter {
            StatusCounter::Unsubscribe => true,
            StatusCounter::Value(counter) => counter >= current,
        }
    }

    /// Current counter value, zero if nothing was sent yet.
    pub fn current(&self, node_id: &NodeId, stream_part: &StreamPartId) -> u64 {
        self.counters
            .get(node_id)
            .and_then(|parts| parts.get(stream_part))
            .copied()
            .unwrap_or(0)
    }

    pub fn remove_node_from_stream_part(&mut self, node_id: &NodeId, stream_part: &StreamPartId) {
        if let Some(parts) = self.counters.get_mut(node_id) {
            parts.remove(stream_part);
            if parts.is_empty() {
                self.counters.remove(node_id);
            }
        }
    }

    pub fn remove_stream_part(&mut self, stream_part: &StreamPartId) {
        self.counters.retain(|_, parts| {
            parts.remove(stream_part);
            !parts.is_empty()
        });
    }

    /// Number of nodes with at least one tracked stream part.
    pub fn node_count(&self) -> usize {
        self.counters.len()
    }

    fn entry(&mut self, node_id: &NodeId, stream_part: &StreamPartId) -> &mut u64 {
        self.counters
            .entry(node_id.clone())
            .or_default()
            .entry(stream_part.clone())
            .or_insert(0)
    }
}
