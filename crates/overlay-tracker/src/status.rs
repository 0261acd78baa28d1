//! Status reports sent by nodes, and stream part identifiers.

use std::fmt;
use std::str::FromStr;

use overlay_topology::NodeId;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::metadata::{ExtraMetadata, Location, Rtts};

/// Separator between stream id and partition in a [`StreamPartId`] string.
const PARTITION_SEPARATOR: char = '#';

/// One partition of a stream; each has its own overlay.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPartId {
    pub stream_id: String,
    pub partition: u32,
}

impl StreamPartId {
    pub fn new(stream_id: impl Into<String>, partition: u32) -> Self {
        Self {
            stream_id: stream_id.into(),
            partition,
        }
    }
}

impl fmt::Display for StreamPartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.stream_id, PARTITION_SEPARATOR, self.partition)
    }
}

impl FromStr for StreamPartId {
    type Err = Error;

    /// Parse `"{stream_id}#{partition}"`. The stream id may itself contain `#`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (stream_id, partition) = s
            .rsplit_once(PARTITION_SEPARATOR)
            .ok_or_else(|| Error::InvalidStreamPart(s.to_owned()))?;
        if stream_id.is_empty() {
            return Err(Error::InvalidStreamPart(s.to_owned()));
        }
        let partition = partition
            .parse()
            .map_err(|_| Error::InvalidStreamPart(s.to_owned()))?;
        Ok(Self::new(stream_id, partition))
    }
}

/// Counter carried by a status report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusCounter {
    /// Number of the last instruction the node applied for this stream part.
    Value(u64),
    /// The node left the stream part.
    Unsubscribe,
}

/// A node's view of one stream part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPartStatus {
    pub stream_id: String,
    pub partition: u32,
    /// Neighbors the node currently has in this stream part.
    pub neighbors: Vec<NodeId>,
    pub counter: StatusCounter,
}

impl StreamPartStatus {
    pub fn stream_part_id(&self) -> StreamPartId {
        StreamPartId::new(self.stream_id.clone(), self.partition)
    }
}

/// Periodic status message relayed by the protocol layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub node_id: NodeId,
    pub stream_part: StreamPartStatus,
    /// Round-trip times to overlay neighbors, if the node measured any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtts: Option<Rtts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: ExtraMetadata,
}

impl StatusReport {
    /// Report of a subscribed node.
    pub fn subscribed(
        node_id: impl Into<NodeId>,
        stream_part: &StreamPartId,
        neighbors: Vec<NodeId>,
        counter: u64,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            stream_part: StreamPartStatus {
                stream_id: stream_part.stream_id.clone(),
                partition: stream_part.partition,
                neighbors,
                counter: StatusCounter::Value(counter),
            },
            rtts: None,
            location: None,
            extra: ExtraMetadata::new(),
        }
    }

    /// Report of a node leaving the stream part.
    pub fn unsubscribed(node_id: impl Into<NodeId>, stream_part: &StreamPartId) -> Self {
        Self {
            node_id: node_id.into(),
            stream_part: StreamPartStatus {
                stream_id: stream_part.stream_id.clone(),
                partition: stream_part.partition,
                neighbors: Vec::new(),
                counter: StatusCounter::Unsubscribe,
            },
            rtts: None,
            location: None,
            extra: ExtraMetadata::new(),
        }
    }

    pub fn with_rtts(mut self, rtts: Rtts) -> Self {
        self.rtts = Some(rtts);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_extra(mut self, extra: ExtraMetadata) -> Self {
        self.extra = extra;
        self
    }
}
