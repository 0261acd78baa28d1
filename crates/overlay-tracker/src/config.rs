//! Tracker configuration.

use overlay_topology::{TopologyConfig, DEFAULT_MAX_NEIGHBORS_PER_NODE};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the neighbor limit.
pub const MAX_NEIGHBORS_ENV: &str = "OVERLAY_MAX_NEIGHBORS";

/// Configuration shared by every overlay the tracker creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Target and maximum degree in every stream part's overlay.
    pub max_neighbors_per_node: i64,
}

/// Raw JSON shape, kept loose so non-integers get a clear error.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawTrackerConfig {
    max_neighbors_per_node: Option<serde_json::Number>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_neighbors_per_node: DEFAULT_MAX_NEIGHBORS_PER_NODE,
        }
    }
}

impl TrackerConfig {
    /// Create a config with the given neighbor limit.
    pub const fn new(max_neighbors_per_node: i64) -> Self {
        Self {
            max_neighbors_per_node,
        }
    }

    /// Parse and validate a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawTrackerConfig = serde_json::from_str(json)?;
        let config = match raw.max_neighbors_per_node {
            None => Self::default(),
            Some(number) => {
                let max = number.as_i64().ok_or_else(|| {
                    Error::Config(format!("maxNeighborsPerNode is not an integer: {number}"))
                })?;
                Self::new(max)
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Read the config from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let config = match std::env::var(MAX_NEIGHBORS_ENV) {
            Ok(value) => {
                let max = value.trim().parse::<i64>().map_err(|_| {
                    Error::Config(format!("{MAX_NEIGHBORS_ENV} is not an integer: {value}"))
                })?;
                Self::new(max)
            }
            Err(_) => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Topology settings for a single overlay.
    pub const fn topology(&self) -> TopologyConfig {
        TopologyConfig::new(self.max_neighbors_per_node)
    }

    /// Check the neighbor limit and return it as a degree.
    pub fn validate(&self) -> Result<usize> {
        Ok(self.topology().validate()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_json() {
        let config = TrackerConfig::from_json(r#"{ "maxNeighborsPerNode": 3 }"#).unwrap();
        assert_eq!(config, TrackerConfig::new(3));
    }

    #[test]
    fn missing_limit_uses_default() {
        let config = TrackerConfig::from_json("{}").unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.validate().unwrap(), 4);
    }

    #[test]
    fn negative_limit_is_rejected() {
        let err = TrackerConfig::from_json(r#"{ "maxNeighborsPerNode": -1 }"#).unwrap_err();
        assert!(matches!(
            err,
            Error::Topology(overlay_topology::Error::InvalidMaxNeighbors(-1))
        ));
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = TrackerConfig::from_json(r#"{ "maxNeighborsPerNode": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            Error::Topology(overlay_topology::Error::InvalidMaxNeighbors(0))
        ));
    }

    #[test]
    fn fractional_limit_is_rejected() {
        let err = TrackerConfig::from_json(r#"{ "maxNeighborsPerNode": 2.5 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "unexpected error: {err}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = TrackerConfig::from_json(r#"{ "maxNeighbours": 3 }"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_string(&TrackerConfig::new(8)).unwrap();
        assert_eq!(json, r#"{"maxNeighborsPerNode":8}"#);
    }
}
