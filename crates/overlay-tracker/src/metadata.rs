//! Per-node metadata carried by status reports.
//!
//! Reports may carry round-trip times to overlay neighbors, a geographic
//! location and free-form extra fields. The tracker keeps the latest of each
//! per node until the node disconnects.

use std::collections::BTreeMap;

use overlay_topology::NodeId;
use serde::{Deserialize, Serialize};

use crate::status::StatusReport;

/// Round-trip times in milliseconds from a node to its overlay neighbors.
pub type Rtts = BTreeMap<NodeId, u64>;

/// Free-form extra fields of a node.
pub type ExtraMetadata = serde_json::Map<String, serde_json::Value>;

/// Where a node says it is. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub country: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Location {
    pub fn new(country: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            country: Some(country.into()),
            city: Some(city.into()),
            latitude: None,
            longitude: None,
        }
    }
}

/// Latest metadata of every connected node.
#[derive(Debug, Default)]
pub struct NodeMetadata {
    rtts: BTreeMap<NodeId, Rtts>,
    locations: BTreeMap<NodeId, Location>,
    extra: BTreeMap<NodeId, ExtraMetadata>,
}

impl NodeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the metadata of an accepted report.
    ///
    /// RTTs and location are only replaced when the report carries them;
    /// extra fields are always replaced.
    pub fn record(&mut self, report: &StatusReport) {
        let node_id = &report.node_id;
        if let Some(rtts) = &report.rtts {
            self.rtts.insert(node_id.clone(), rtts.clone());
        }
        if let Some(location) = &report.location {
            self.locations.insert(node_id.clone(), location.clone());
        }
        self.extra.insert(node_id.clone(), report.extra.clone());
    }

    /// Forget everything about `node_id`.
    pub fn remove(&mut self, node_id: &NodeId) {
        self.rtts.remove(node_id);
        self.locations.remove(node_id);
        self.extra.remove(node_id);
    }

    pub fn rtts(&self) -> &BTreeMap<NodeId, Rtts> {
        &self.rtts
    }

    pub fn locations(&self) -> &BTreeMap<NodeId, Location> {
        &self.locations
    }

    pub fn location(&self, node_id: &NodeId) -> Option<&Location> {
        self.locations.get(node_id)
    }

    pub fn extra(&self) -> &BTreeMap<NodeId, ExtraMetadata> {
        &self.extra
    }
}
