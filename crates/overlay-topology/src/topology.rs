//! Overlay topology of a single stream partition.
//!
//! The topology is an undirected graph stored as an adjacency map. Every
//! mutation goes through [`OverlayTopology::update`], which keeps the graph
//! symmetric, free of self-loops and closed over known nodes, and keeps the
//! open-slot index in sync.
//!
//! # Repair
//!
//! [`OverlayTopology::form_instructions`] brings one node's degree as close
//! to the configured maximum as the rest of the graph allows:
//!
//! 1. **Shed**: a node above the limit keeps a random subset of its neighbors.
//! 2. **Fill**: connect to random nodes that still have open slots.
//! 3. **Rewire**: while at least two slots are missing, cut an edge between
//!    two full nodes and connect the repaired node to both endpoints.
//!
//! Rewiring only runs when two or more slots are missing. Cutting one edge
//! frees two slots; if only one of them were taken, the other would be left
//! open somewhere else and repairing it could cut yet another edge, and so on
//! without end.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::{debug, trace};

use crate::config::TopologyConfig;
use crate::error::{Error, Result};
use crate::node::{NodeId, NodeKey};
use crate::random::{Randomness, UniformRandom};

/// Complete target neighbor list for every node whose neighbors changed.
pub type Instructions<N = NodeId> = BTreeMap<N, Vec<N>>;

/// Sorted snapshot of the whole topology.
pub type TopologyState<N = NodeId> = BTreeMap<N, Vec<N>>;

/// A broken graph invariant, as reported by [`OverlayTopology::invariant_violations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation<N> {
    /// `node` lists `neighbor` but not the other way around.
    Asymmetric { node: N, neighbor: N },
    /// `node` lists itself as a neighbor.
    SelfLoop { node: N },
    /// `node` lists a neighbor that is not a known node.
    Dangling { node: N, neighbor: N },
    /// The open-slot index disagrees with the node's degree.
    StaleOpenSlot { node: N },
}

/// Degree-bounded overlay of one stream partition.
///
/// Owns the adjacency map and the randomness strategy. Not synchronized:
/// one instance is driven by a single thread of control at a time.
#[derive(Debug, Clone)]
pub struct OverlayTopology<N = NodeId, R = UniformRandom> {
    max_neighbors_per_node: usize,
    nodes: BTreeMap<N, BTreeSet<N>>,
    /// Known nodes with degree below `max_neighbors_per_node`.
    nodes_with_open_slots: BTreeSet<N>,
    random: R,
}

impl<N: NodeKey> OverlayTopology<N, UniformRandom> {
    /// Create an empty topology with uniform randomness.
    ///
    /// Fails if `max_neighbors_per_node` is zero.
    pub fn new(max_neighbors_per_node: usize) -> Result<Self> {
        Self::with_randomness(max_neighbors_per_node, UniformRandom::new())
    }

    /// Create an empty topology from a validated config.
    pub fn from_config(config: &TopologyConfig) -> Result<Self> {
        Self::new(config.validate()?)
    }
}

impl<N: NodeKey, R: Randomness> OverlayTopology<N, R> {
    /// Create an empty topology with a custom randomness strategy.
    pub fn with_randomness(max_neighbors_per_node: usize, random: R) -> Result<Self> {
        if max_neighbors_per_node == 0 {
            return Err(Error::InvalidMaxNeighbors(0));
        }

        Ok(Self {
            max_neighbors_per_node,
            nodes: BTreeMap::new(),
            nodes_with_open_slots: BTreeSet::new(),
            random,
        })
    }

    /// The configured degree limit.
    pub fn max_neighbors_per_node(&self) -> usize {
        self.max_neighbors_per_node
    }

    pub fn has_node(&self, node_id: &N) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Neighbors of `node_id`, empty if the node is unknown.
    pub fn neighbors(&self, node_id: &N) -> BTreeSet<N> {
        self.nodes.get(node_id).cloned().unwrap_or_default()
    }

    /// Number of neighbors of `node_id`, zero if the node is unknown.
    pub fn degree(&self, node_id: &N) -> usize {
        self.nodes.get(node_id).map_or(0, BTreeSet::len)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over known nodes in order.
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.nodes.keys()
    }

    /// Copy of the topology with sorted neighbor lists, for logging and tests.
    pub fn state(&self) -> TopologyState<N> {
        self.nodes
            .iter()
            .map(|(id, neighbors)| (id.clone(), neighbors.iter().cloned().collect()))
            .collect()
    }

    /// Replace the neighbor set of `node_id` with `reported_neighbors`.
    ///
    /// Unknown ids and `node_id` itself are dropped from the report. Reverse
    /// edges are added and removed so the graph stays symmetric. Registers
    /// `node_id` if it is not known yet.
    pub fn update<I>(&mut self, node_id: N, reported_neighbors: I)
    where
        I: IntoIterator<Item = N>,
    {
        let new_neighbors: BTreeSet<N> = reported_neighbors
            .into_iter()
            .filter(|neighbor| *neighbor != node_id && self.nodes.contains_key(neighbor))
            .collect();
        let previous = self.nodes.remove(&node_id).unwrap_or_default();

        for removed in previous.difference(&new_neighbors) {
            if let Some(neighbors) = self.nodes.get_mut(removed) {
                neighbors.remove(&node_id);
            }
            self.refresh_open_slot(removed);
        }

        for added in &new_neighbors {
            if let Some(neighbors) = self.nodes.get_mut(added) {
                neighbors.insert(node_id.clone());
            }
            self.refresh_open_slot(added);
        }

        self.nodes.insert(node_id.clone(), new_neighbors);
        self.refresh_open_slot(&node_id);
    }

    /// Remove `node_id` and all edges to it.
    ///
    /// Returns the former neighbors so the caller can repair them. Unknown
    /// nodes are a no-op returning an empty list.
    pub fn leave(&mut self, node_id: &N) -> Vec<N> {
        let Some(former_neighbors) = self.nodes.remove(node_id) else {
            return Vec::new();
        };
        self.nodes_with_open_slots.remove(node_id);

        for neighbor in &former_neighbors {
            if let Some(neighbors) = self.nodes.get_mut(neighbor) {
                neighbors.remove(node_id);
            }
            self.refresh_open_slot(neighbor);
        }

        former_neighbors.into_iter().collect()
    }

    /// Repair the neighborhood of `node_id` and describe the result.
    ///
    /// Returns the complete neighbor list of every node whose neighbors
    /// changed. With `force_generate`, `node_id` is included even if its
    /// neighbors did not change. Unknown nodes yield no instructions.
    ///
    /// # Panics
    ///
    /// Panics if a changed node ends up as its own neighbor, which means the
    /// graph is corrupted.
    pub fn form_instructions(&mut self, node_id: &N, force_generate: bool) -> Instructions<N> {
        if !self.has_node(node_id) {
            return Instructions::new();
        }

        let max = self.max_neighbors_per_node;
        let mut changed: BTreeSet<N> = BTreeSet::new();

        if self.degree(node_id) > max {
            let mut kept = self.neighbor_list(node_id);
            self.random.shuffle(&mut kept);
            kept.truncate(max);
            trace!(node = ?node_id, kept = ?kept, "shedding excess neighbors");
            self.update(node_id.clone(), kept);
            changed.insert(node_id.clone());
        }

        let missing = self.missing_neighbors(node_id);
        if missing > 0 {
            let mut candidates = self.open_slot_candidates(node_id);
            self.random.shuffle(&mut candidates);
            candidates.truncate(missing);

            if !candidates.is_empty() {
                trace!(node = ?node_id, added = ?candidates, "connecting to nodes with open slots");
                let mut desired = self.neighbor_list(node_id);
                desired.extend(candidates.iter().cloned());
                self.update(node_id.clone(), desired);
                changed.insert(node_id.clone());
                changed.extend(candidates);
            }
        }

        let mut missing = self.missing_neighbors(node_id);
        if missing > 1 {
            let mut full_nodes = self.full_node_candidates(node_id);
            self.random.shuffle(&mut full_nodes);
            let mut queue = VecDeque::from(full_nodes);

            while missing > 1 {
                let Some(n1) = queue.pop_front() else {
                    break;
                };

                let n2_candidates: Vec<N> = self
                    .nodes
                    .get(&n1)
                    .map(|neighbors| {
                        neighbors
                            .iter()
                            .filter(|n| *n != node_id && !self.is_neighbor(node_id, n))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                let Some(n2) = self.random.pick(&n2_candidates).cloned() else {
                    continue;
                };
                queue.retain(|candidate| *candidate != n2);

                trace!(node = ?node_id, n1 = ?n1, n2 = ?n2, "rewiring edge");
                let n1_kept: Vec<N> = self
                    .neighbor_list(&n1)
                    .into_iter()
                    .filter(|n| *n != n2)
                    .collect();
                self.update(n1.clone(), n1_kept);

                let mut desired = self.neighbor_list(node_id);
                desired.push(n1.clone());
                desired.push(n2.clone());
                self.update(node_id.clone(), desired);

                changed.insert(node_id.clone());
                changed.insert(n1);
                changed.insert(n2);
                missing = self.missing_neighbors(node_id);
            }
        }

        if force_generate {
            changed.insert(node_id.clone());
        }

        for id in &changed {
            assert!(
                !self.is_neighbor(id, id),
                "overlay invariant violated: {id:?} is its own neighbor"
            );
        }

        let instructions: Instructions<N> = changed
            .into_iter()
            .map(|id| {
                let neighbors = self.neighbor_list(&id);
                (id, neighbors)
            })
            .collect();

        if !instructions.is_empty() {
            debug!(
                node = ?node_id,
                changed = instructions.len(),
                degree = self.degree(node_id),
                "formed overlay instructions"
            );
        }

        instructions
    }

    /// Check every graph invariant, returning all violations found.
    pub fn invariant_violations(&self) -> Vec<InvariantViolation<N>> {
        let mut violations = Vec::new();

        for (id, neighbors) in &self.nodes {
            for neighbor in neighbors {
                if neighbor == id {
                    violations.push(InvariantViolation::SelfLoop { node: id.clone() });
                    continue;
                }
                match self.nodes.get(neighbor) {
                    None => violations.push(InvariantViolation::Dangling {
                        node: id.clone(),
                        neighbor: neighbor.clone(),
                    }),
                    Some(reverse) if !reverse.contains(id) => {
                        violations.push(InvariantViolation::Asymmetric {
                            node: id.clone(),
                            neighbor: neighbor.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }

            let open = neighbors.len() < self.max_neighbors_per_node;
            if open != self.nodes_with_open_slots.contains(id) {
                violations.push(InvariantViolation::StaleOpenSlot { node: id.clone() });
            }
        }

        violations.extend(
            self.nodes_with_open_slots
                .iter()
                .filter(|id| !self.nodes.contains_key(*id))
                .map(|id| InvariantViolation::StaleOpenSlot { node: id.clone() }),
        );

        violations
    }

    fn is_neighbor(&self, node_id: &N, other: &N) -> bool {
        self.nodes
            .get(node_id)
            .is_some_and(|neighbors| neighbors.contains(other))
    }

    fn neighbor_list(&self, node_id: &N) -> Vec<N> {
        self.nodes
            .get(node_id)
            .map(|neighbors| neighbors.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn missing_neighbors(&self, node_id: &N) -> usize {
        self.max_neighbors_per_node.saturating_sub(self.degree(node_id))
    }

    /// Nodes with open slots that `node_id` could connect to directly.
    fn open_slot_candidates(&self, node_id: &N) -> Vec<N> {
        self.nodes_with_open_slots
            .iter()
            .filter(|n| *n != node_id && !self.is_neighbor(node_id, n))
            .cloned()
            .collect()
    }

    /// Full nodes not adjacent to `node_id`: sources of edges to cut.
    fn full_node_candidates(&self, node_id: &N) -> Vec<N> {
        self.nodes
            .iter()
            .filter(|(n, neighbors)| {
                *n != node_id
                    && neighbors.len() == self.max_neighbors_per_node
                    && !self.is_neighbor(node_id, n)
            })
            .map(|(n, _)| n.clone())
            .collect()
    }

    fn refresh_open_slot(&mut self, node_id: &N) {
        let open = self
            .nodes
            .get(node_id)
            .is_some_and(|neighbors| neighbors.len() < self.max_neighbors_per_node);

        if open {
            self.nodes_with_open_slots.insert(node_id.clone());
        } else {
            self.nodes_with_open_slots.remove(node_id);
        }
    }
}
