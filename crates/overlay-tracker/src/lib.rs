//! Overlay Tracker - neighbor coordination for stream partitions
//!
//! The tracker sits between the protocol layer and the overlay topologies.
//! It keeps one [`OverlayTopology`](overlay_topology::OverlayTopology) per
//! stream part and turns what nodes report into what nodes should do.
//!
//! # Flow
//!
//! 1. A node sends a [`StatusReport`] with its current neighbors and the
//!    counter of the last instruction it applied.
//! 2. [`Tracker::process_status`] drops stale reports, updates the stream
//!    part's overlay, repairs the reporting node and returns [`Instruction`]s.
//! 3. The protocol layer delivers each instruction. Nodes adopt the new
//!    neighbor list and echo its counter in their next report.
//!
//! On disconnect, [`Tracker::node_disconnected`] removes the node from every
//! stream part and re-sends instructions to its former neighbors. Overlays
//! that become empty are dropped.
//!
//! Reports may also carry neighbor round-trip times, a location and extra
//! fields; the tracker keeps the latest of each per node until it disconnects.
//!
//! # Example
//!
//! ```
//! use overlay_tracker::{StatusReport, StreamPartId, Tracker, TrackerConfig};
//!
//! let mut tracker = Tracker::new(&TrackerConfig::new(4)).unwrap();
//! let part = StreamPartId::new("stream", 0);
//!
//! tracker.process_status(StatusReport::subscribed("a", &part, Vec::new(), 0)).unwrap();
//! let instructions = tracker
//!     .process_status(StatusReport::subscribed("b", &part, Vec::new(), 0))
//!     .unwrap();
//! assert_eq!(instructions.len(), 2);
//! ```

pub mod config;
pub mod error;
pub mod instruction;
pub mod metadata;
pub mod status;
pub mod tracker;

pub use config::TrackerConfig;
pub use error::{Error, Result};
pub use instruction::{Instruction, InstructionCounter, InstructionCounterValue};
pub use metadata::{ExtraMetadata, Location, NodeMetadata, Rtts};
pub use status::{StatusCounter, StatusReport, StreamPartId, StreamPartStatus};
pub use tracker::{RandomnessFactory, Tracker};

pub use overlay_topology::NodeId;
