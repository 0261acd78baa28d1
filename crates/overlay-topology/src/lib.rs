//! Overlay Topology
//!
//! Coordinator-side neighbor selection for the gossip overlay of a stream
//! partition. The coordinator feeds in the neighbor sets nodes report about
//! themselves and asks for repairs; the topology answers with the complete
//! neighbor list each affected node should switch to.
//!
//! # Invariants
//!
//! After every public operation the graph is:
//! - **Symmetric**: `b` is a neighbor of `a` exactly when `a` is a neighbor of `b`
//! - **Irreflexive**: no node is its own neighbor
//! - **Closed**: every listed neighbor is itself a known node
//!
//! Right after a repair of node `x`, `x` has at most `max_neighbors_per_node`
//! neighbors.
//!
//! # Randomness
//!
//! All random choices go through a [`Randomness`] strategy owned by each
//! topology. [`UniformRandom`] is the production default; [`Deterministic`]
//! makes repairs reproducible in tests.
//!
//! # Example
//!
//! ```
//! use overlay_topology::{Deterministic, OverlayTopology};
//!
//! let mut topology = OverlayTopology::with_randomness(2, Deterministic).unwrap();
//! for id in ["a", "b", "c"] {
//!     topology.update(id, []);
//! }
//!
//! let instructions = topology.form_instructions(&"a", false);
//! assert_eq!(instructions[&"a"], vec!["b", "c"]);
//! assert_eq!(instructions[&"b"], vec!["a"]);
//! ```

mod config;
mod error;
mod node;
mod random;
mod topology;

pub use config::{TopologyConfig, DEFAULT_MAX_NEIGHBORS_PER_NODE};
pub use error::{Error, Result};
pub use node::{NodeId, NodeKey};
pub use random::{Deterministic, Randomness, UniformRandom};
pub use topology::{Instructions, InvariantViolation, OverlayTopology, TopologyState};
