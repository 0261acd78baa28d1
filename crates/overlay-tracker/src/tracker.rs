//! Tracker - one overlay topology per stream part.
//!
//! The tracker turns status reports and disconnects into instructions. It
//! does no I/O: every entry point returns the instructions the protocol layer
//! should deliver, in the order they were formed.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use overlay_topology::{NodeId, OverlayTopology, Randomness, UniformRandom};
use tracing::{debug, trace};

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::instruction::{Instruction, InstructionCounter, InstructionCounterValue};
use crate::metadata::{ExtraMetadata, Location, NodeMetadata, Rtts};
use crate::status::{StatusCounter, StatusReport, StreamPartId};

/// Builds the randomness strategy of each new overlay.
pub type RandomnessFactory<R> = Box<dyn FnMut() -> R + Send>;

/// Coordinator of all stream part overlays.
pub struct Tracker<R = UniformRandom> {
    max_neighbors_per_node: usize,
    overlays: BTreeMap<StreamPartId, OverlayTopology<NodeId, R>>,
    instruction_counter: InstructionCounter,
    metadata: NodeMetadata,
    new_randomness: RandomnessFactory<R>,
    stopped: bool,
}

impl Tracker<UniformRandom> {
    /// Create a tracker whose overlays use entropy-seeded randomness.
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        Self::with_randomness(config, UniformRandom::new)
    }
}

impl<R: Randomness> Tracker<R> {
    /// Create a tracker whose overlays take their randomness from `factory`.
    pub fn with_randomness<F>(config: &TrackerConfig, factory: F) -> Result<Self>
    where
        F: FnMut() -> R + Send + 'static,
    {
        let max_neighbors_per_node = config.validate()?;
        debug!(max_neighbors_per_node, "Created tracker");

        Ok(Self {
            max_neighbors_per_node,
            overlays: BTreeMap::new(),
            instruction_counter: InstructionCounter::new(),
            metadata: NodeMetadata::new(),
            new_randomness: Box::new(factory),
            stopped: false,
        })
    }

    /// Apply a node's status report and form instructions for it.
    ///
    /// Reports older than the last instruction sent to the node are dropped.
    pub fn process_status(&mut self, report: StatusReport) -> Result<Vec<Instruction>> {
        if self.stopped {
            return Ok(Vec::new());
        }

        if !self.instruction_counter.is_most_recent(&report) {
            trace!(
                node = %report.node_id,
                counter = ?report.stream_part.counter,
                "Dropping stale status report"
            );
            return Ok(Vec::new());
        }

        self.metadata.record(&report);

        let stream_part = report.stream_part.stream_part_id();
        let StatusReport {
            node_id,
            stream_part: status,
            ..
        } = report;
        let mut instructions = Vec::new();

        self.ensure_overlay(&stream_part)?;
        match status.counter {
            StatusCounter::Unsubscribe => {
                self.leave_and_check_empty(&stream_part, &node_id, &mut instructions);
            }
            StatusCounter::Value(_) => {
                if let Some(overlay) = self.overlays.get_mut(&stream_part) {
                    overlay.update(node_id.clone(), status.neighbors);
                }
            }
        }

        self.form_and_send(&node_id, &stream_part, false, &mut instructions);
        Ok(instructions)
    }

    /// Remove a node from every stream part and repair its former neighbors.
    ///
    /// The node's metadata is dropped as well.
    pub fn node_disconnected(&mut self, node_id: &NodeId) -> Vec<Instruction> {
        debug!(node = %node_id, "Node disconnected");
        self.metadata.remove(node_id);

        let stream_parts: Vec<StreamPartId> = self.overlays.keys().cloned().collect();
        let mut instructions = Vec::new();
        for stream_part in &stream_parts {
            self.leave_and_check_empty(stream_part, node_id, &mut instructions);
        }
        instructions
    }

    /// Stop producing instructions.
    pub fn stop(&mut self) {
        debug!("Stopping tracker");
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn max_neighbors_per_node(&self) -> usize {
        self.max_neighbors_per_node
    }

    /// Stream parts that currently have an overlay.
    pub fn stream_parts(&self) -> impl Iterator<Item = &StreamPartId> {
        self.overlays.keys()
    }

    pub fn overlay(&self, stream_part: &StreamPartId) -> Option<&OverlayTopology<NodeId, R>> {
        self.overlays.get(stream_part)
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.len()
    }

    /// Last instruction counter sent to a node for a stream part.
    pub fn instruction_counter(&self, node_id: &NodeId, stream_part: &StreamPartId) -> u64 {
        self.instruction_counter.current(node_id, stream_part)
    }

    /// Latest round-trip times reported by each node.
    pub fn overlay_connection_rtts(&self) -> &BTreeMap<NodeId, Rtts> {
        self.metadata.rtts()
    }

    pub fn node_locations(&self) -> &BTreeMap<NodeId, Location> {
        self.metadata.locations()
    }

    pub fn node_location(&self, node_id: &NodeId) -> Option<&Location> {
        self.metadata.location(node_id)
    }

    /// Extra fields from each node's latest report.
    pub fn extra_metadata(&self) -> &BTreeMap<NodeId, ExtraMetadata> {
        self.metadata.extra()
    }

    fn ensure_overlay(&mut self, stream_part: &StreamPartId) -> Result<()> {
        if let Entry::Vacant(entry) = self.overlays.entry(stream_part.clone()) {
            let overlay = OverlayTopology::with_randomness(
                self.max_neighbors_per_node,
                (self.new_randomness)(),
            )?;
            entry.insert(overlay);
            debug!(stream_part = %stream_part, "Created overlay");
        }
        Ok(())
    }

    fn form_and_send(
        &mut self,
        node_id: &NodeId,
        stream_part: &StreamPartId,
        force_generate: bool,
        out: &mut Vec<Instruction>,
    ) {
        if self.stopped {
            return;
        }
        let Some(overlay) = self.overlays.get_mut(stream_part) else {
            return;
        };

        let formed = overlay.form_instructions(node_id, force_generate);

        // A node alone in its stream part still needs to hear that it has no neighbors
        if overlay.has_node(node_id) && overlay.node_count() == 1 && formed.is_empty() {
            out.push(Instruction {
                node_id: node_id.clone(),
                stream_part: stream_part.clone(),
                new_neighbors: Vec::new(),
                counter: InstructionCounterValue::LoneNode,
            });
            return;
        }

        for (target, new_neighbors) in formed {
            let counter = self.instruction_counter.set_or_increment(&target, stream_part);
            out.push(Instruction {
                node_id: target,
                stream_part: stream_part.clone(),
                new_neighbors,
                counter: InstructionCounterValue::Sequence(counter),
            });
        }
    }

    fn leave_and_check_empty(
        &mut self,
        stream_part: &StreamPartId,
        node_id: &NodeId,
        out: &mut Vec<Instruction>,
    ) {
        let Some(overlay) = self.overlays.get_mut(stream_part) else {
            return;
        };
        let former_neighbors = overlay.leave(node_id);
        let now_empty = overlay.is_empty();
        self.instruction_counter
            .remove_node_from_stream_part(node_id, stream_part);

        if now_empty {
            self.instruction_counter.remove_stream_part(stream_part);
            self.overlays.remove(stream_part);
            debug!(stream_part = %stream_part, "Removed empty overlay");
            return;
        }

        for neighbor in &former_neighbors {
            self.form_and_send(neighbor, stream_part, true, out);
        }
    }
}

impl<R> fmt::Debug for Tracker<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("max_neighbors_per_node", &self.max_neighbors_per_node)
            .field("stream_parts", &self.overlays.keys().collect::<Vec<_>>())
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overlay_topology::Deterministic;

    fn tracker(max: i64) -> Tracker<Deterministic> {
        Tracker::with_randomness(&TrackerConfig::new(max), || Deterministic).unwrap()
    }

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn nodes(ids: &[&str]) -> Vec<NodeId> {
        ids.iter().map(|id| node(id)).collect()
    }

    fn join(tracker: &mut Tracker<Deterministic>, id: &str, part: &StreamPartId) -> Vec<Instruction> {
        tracker
            .process_status(StatusReport::subscribed(id, part, Vec::new(), 0))
            .unwrap()
    }

    fn sequence(id: &str, part: &StreamPartId, neighbors: &[&str], counter: u64) -> Instruction {
        Instruction {
            node_id: node(id),
            stream_part: part.clone(),
            new_neighbors: nodes(neighbors),
            counter: InstructionCounterValue::Sequence(counter),
        }
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(Tracker::new(&TrackerConfig::new(0)).is_err());
        assert!(Tracker::new(&TrackerConfig::new(-1)).is_err());
    }

    #[test]
    fn lone_node_gets_empty_instruction() {
        let mut tracker = tracker(4);
        let part = StreamPartId::new("stream", 0);

        assert_eq!(
            join(&mut tracker, "n1", &part),
            vec![Instruction {
                node_id: node("n1"),
                stream_part: part.clone(),
                new_neighbors: Vec::new(),
                counter: InstructionCounterValue::LoneNode,
            }]
        );
        assert_eq!(tracker.overlay_count(), 1);
    }

    #[test]
    fn second_node_connects_both() {
        let mut tracker = tracker(4);
        let part = StreamPartId::new("stream", 0);
        join(&mut tracker, "n1", &part);

        assert_eq!(
            join(&mut tracker, "n2", &part),
            vec![sequence("n1", &part, &["n2"], 1), sequence("n2", &part, &["n1"], 1)]
        );
    }

    #[test]
    fn stale_reports_are_ignored() {
        let mut tracker = tracker(4);
        let part = StreamPartId::new("stream", 0);
        join(&mut tracker, "n1", &part);
        join(&mut tracker, "n2", &part);

        // n1 has been sent instruction 1; a report with counter 0 predates it
        let stale = tracker
            .process_status(StatusReport::subscribed("n1", &part, Vec::new(), 0))
            .unwrap();
        assert!(stale.is_empty());
        assert_eq!(
            tracker.overlay(&part).unwrap().neighbors(&node("n1")).len(),
            1
        );

        let fresh = tracker
            .process_status(StatusReport::subscribed("n1", &part, nodes(&["n2"]), 1))
            .unwrap();
        assert!(fresh.is_empty());
    }

    #[test]
    fn unsubscribe_repairs_remaining_nodes() {
        let mut tracker = tracker(4);
        let part = StreamPartId::new("stream", 0);
        join(&mut tracker, "n1", &part);
        join(&mut tracker, "n2", &part);

        let instructions = tracker
            .process_status(StatusReport::unsubscribed("n2", &part))
            .unwrap();

        assert_eq!(instructions, vec![sequence("n1", &part, &[], 2)]);
        assert!(!tracker.overlay(&part).unwrap().has_node(&node("n2")));
        assert_eq!(tracker.instruction_counter(&node("n2"), &part), 0);
    }

    #[test]
    fn last_unsubscribe_removes_overlay() {
        let mut tracker = tracker(4);
        let part = StreamPartId::new("stream", 0);
        join(&mut tracker, "n1", &part);

        let instructions = tracker
            .process_status(StatusReport::unsubscribed("n1", &part))
            .unwrap();

        assert!(instructions.is_empty());
        assert_eq!(tracker.overlay_count(), 0);
    }

    #[test]
    fn disconnect_forces_instructions_for_former_neighbors() {
        let mut tracker = tracker(2);
        let part = StreamPartId::new("stream", 0);
        join(&mut tracker, "n1", &part);
        join(&mut tracker, "n2", &part);
        assert_eq!(
            join(&mut tracker, "n3", &part),
            vec![
                sequence("n1", &part, &["n2", "n3"], 2),
                sequence("n2", &part, &["n1", "n3"], 2),
                sequence("n3", &part, &["n1", "n2"], 1),
            ]
        );

        assert_eq!(
            tracker.node_disconnected(&node("n3")),
            vec![sequence("n1", &part, &["n2"], 3), sequence("n2", &part, &["n1"], 3)]
        );
    }

    #[test]
    fn disconnect_cleans_every_stream_part() {
        let mut tracker = tracker(4);
        let first = StreamPartId::new("stream", 0);
        let second = StreamPartId::new("other", 5);
        join(&mut tracker, "n1", &first);
        join(&mut tracker, "n1", &second);
        join(&mut tracker, "n2", &second);
        assert_eq!(tracker.overlay_count(), 2);

        let instructions = tracker.node_disconnected(&node("n1"));

        assert_eq!(tracker.stream_parts().collect::<Vec<_>>(), vec![&second]);
        assert_eq!(instructions, vec![sequence("n2", &second, &[], 2)]);
    }

    #[test]
    fn disconnect_of_unknown_node_is_noop() {
        let mut tracker = tracker(4);
        let part = StreamPartId::new("stream", 0);
        join(&mut tracker, "n1", &part);

        assert!(tracker.node_disconnected(&node("ghost")).is_empty());
        assert_eq!(tracker.overlay_count(), 1);
    }

    #[test]
    fn stopped_tracker_emits_nothing() {
        let mut tracker = tracker(4);
        let part = StreamPartId::new("stream", 0);
        join(&mut tracker, "n1", &part);
        tracker.stop();

        assert!(tracker.is_stopped());
        assert!(join(&mut tracker, "n2", &part).is_empty());
        assert!(tracker.node_disconnected(&node("n1")).is_empty());
    }

    #[test]
    fn report_metadata_is_stored() {
        let mut tracker = tracker(4);
        let part = StreamPartId::new("stream", 0);
        let rtts: Rtts = [(node("n2"), 25)].into_iter().collect();
        let mut extra = ExtraMetadata::new();
        extra.insert("version".into(), serde_json::json!("1.2.0"));

        tracker
            .process_status(
                StatusReport::subscribed("n1", &part, Vec::new(), 0)
                    .with_rtts(rtts.clone())
                    .with_location(Location::new("CH", "Zug"))
                    .with_extra(extra.clone()),
            )
            .unwrap();

        assert_eq!(tracker.overlay_connection_rtts()[&node("n1")], rtts);
        assert_eq!(tracker.node_location(&node("n1")), Some(&Location::new("CH", "Zug")));
        assert_eq!(tracker.node_locations().len(), 1);
        assert_eq!(tracker.extra_metadata()[&node("n1")], extra);
    }

    #[test]
    fn stale_report_metadata_is_ignored() {
        let mut tracker = tracker(4);
        let part = StreamPartId::new("stream", 0);
        join(&mut tracker, "n1", &part);
        join(&mut tracker, "n2", &part);

        tracker
            .process_status(
                StatusReport::subscribed("n1", &part, Vec::new(), 0)
                    .with_location(Location::new("FI", "Helsinki")),
            )
            .unwrap();

        assert_eq!(tracker.node_location(&node("n1")), None);
    }

    #[test]
    fn disconnect_clears_metadata() {
        let mut tracker = tracker(4);
        let part = StreamPartId::new("stream", 0);
        tracker
            .process_status(
                StatusReport::subscribed("n1", &part, Vec::new(), 0)
                    .with_rtts(Rtts::new())
                    .with_location(Location::new("CH", "Zug")),
            )
            .unwrap();
        join(&mut tracker, "n2", &part);

        tracker.node_disconnected(&node("n1"));

        assert!(!tracker.overlay_connection_rtts().contains_key(&node("n1")));
        assert_eq!(tracker.node_location(&node("n1")), None);
        assert_eq!(
            tracker.extra_metadata().keys().collect::<Vec<_>>(),
            vec![&node("n2")]
        );
    }

    #[test]
    fn stream_parts_are_independent() {
        let mut tracker = tracker(4);
        let first = StreamPartId::new("stream", 0);
        let second = StreamPartId::new("stream", 1);
        join(&mut tracker, "n1", &first);
        join(&mut tracker, "n2", &second);

        let first_overlay = tracker.overlay(&first).unwrap();
        let second_overlay = tracker.overlay(&second).unwrap();
        assert!(first_overlay.has_node(&node("n1")) && !first_overlay.has_node(&node("n2")));
        assert!(second_overlay.has_node(&node("n2")) && !second_overlay.has_node(&node("n1")));
    }
}
