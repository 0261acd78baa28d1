//! Simulation configuration.

use std::str::FromStr;

use anyhow::{bail, Context, Result};
use overlay_tracker::TrackerConfig;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Seed for deterministic runs; shard `i` uses `seed + i`
    pub seed: u64,
    /// Number of stream parts to simulate
    pub stream_parts: usize,
    /// Number of worker tasks the stream parts are sharded across
    pub workers: usize,
    /// Nodes subscribing to every stream part
    pub nodes: usize,
    /// Churn rounds after the initial joins
    pub rounds: usize,
    /// Probability that a subscribed node leaves in a round (0.0 - 1.0)
    pub leave_rate: f64,
    /// Upper bound on instructions delivered per triggering event
    pub max_deliveries: usize,
    /// Where to write the JSON report, if anywhere
    pub report_path: Option<String>,
    pub tracker: TrackerConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            stream_parts: 16,
            workers: 4,
            nodes: 64,
            rounds: 10,
            leave_rate: 0.05,
            max_deliveries: 100_000,
            report_path: None,
            tracker: TrackerConfig::default(),
        }
    }
}

impl SimConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            seed: env_or("SIM_SEED", defaults.seed)?,
            stream_parts: env_or("SIM_PARTITIONS", defaults.stream_parts)?,
            workers: env_or("SIM_WORKERS", defaults.workers)?,
            nodes: env_or("SIM_NODES", defaults.nodes)?,
            rounds: env_or("SIM_ROUNDS", defaults.rounds)?,
            leave_rate: env_or("SIM_LEAVE_RATE", defaults.leave_rate)?,
            max_deliveries: env_or("SIM_MAX_DELIVERIES", defaults.max_deliveries)?,
            report_path: std::env::var("SIM_REPORT_PATH").ok(),
            tracker: TrackerConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the simulation cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("SIM_WORKERS must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.leave_rate) {
            bail!("SIM_LEAVE_RATE must be within 0.0..=1.0, got {}", self.leave_rate);
        }
        if self.max_deliveries == 0 {
            bail!("SIM_MAX_DELIVERIES must be at least 1");
        }
        self.tracker.validate()?;
        Ok(())
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid {name}: {value}")),
        Err(_) => Ok(default),
    }
}
