//! Topology configuration.

use crate::error::{Error, Result};

/// Neighbor limit used when nothing else is configured.
pub const DEFAULT_MAX_NEIGHBORS_PER_NODE: i64 = 4;

/// Per-partition overlay settings.
///
/// The limit is kept signed so that a negative value coming from an outer
/// configuration layer is reported as such instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TopologyConfig {
    /// Target and maximum degree of every node in the overlay.
    pub max_neighbors_per_node: i64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            max_neighbors_per_node: DEFAULT_MAX_NEIGHBORS_PER_NODE,
        }
    }
}

impl TopologyConfig {
    /// Create a config with the given neighbor limit.
    pub const fn new(max_neighbors_per_node: i64) -> Self {
        Self {
            max_neighbors_per_node,
        }
    }

    /// Check the limit and return it as a degree.
    pub fn validate(&self) -> Result<usize> {
        usize::try_from(self.max_neighbors_per_node)
            .ok()
            .filter(|max| *max > 0)
            .ok_or(Error::InvalidMaxNeighbors(self.max_neighbors_per_node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limit_is_valid() {
        assert_eq!(TopologyConfig::default().validate(), Ok(4));
    }

    #[test]
    fn rejects_zero_and_negative() {
        assert_eq!(
            TopologyConfig::new(0).validate(),
            Err(Error::InvalidMaxNeighbors(0))
        );
        assert_eq!(
            TopologyConfig::new(-1).validate(),
            Err(Error::InvalidMaxNeighbors(-1))
        );
    }

    #[test]
    fn accepts_one() {
        assert_eq!(TopologyConfig::new(1).validate(), Ok(1));
    }
}
