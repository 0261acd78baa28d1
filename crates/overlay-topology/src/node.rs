//! Node identifiers.

use std::fmt;
use std::hash::Hash;

/// Bound for anything usable as a node identifier in an overlay.
///
/// Identifiers are opaque: the topology only compares, orders, hashes and
/// clones them.
pub trait NodeKey: Clone + Ord + Hash + fmt::Debug {}

impl<T> NodeKey for T where T: Clone + Ord + Hash + fmt::Debug {}

/// String identifier of a network participant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct NodeId(pub String);

impl NodeId {
    /// Create from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_raw_id() {
        assert_eq!(NodeId::from("node-1").to_string(), "node-1");
    }

    #[test]
    fn ordering_follows_string_ordering() {
        let mut ids = vec![NodeId::from("node-3"), NodeId::from("node-1"), NodeId::from("node-2")];
        ids.sort();
        assert_eq!(ids, vec![NodeId::from("node-1"), NodeId::from("node-2"), NodeId::from("node-3")]);
    }
}
