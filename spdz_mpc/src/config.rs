//! Tunable parameters of the evaluation engine.

use std::{fs::File, io::BufReader, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Parameters of one evaluation run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of native protocols evaluated together in one batch.
    pub batch_size: usize,
    /// Rounds after which an unfinished batch is treated as a communication failure.
    pub max_rounds_per_batch: usize,
    /// Maximum nesting of sequential and parallel producers.
    pub max_nesting_depth: usize,
    /// Gates evaluated since the last MAC check after which a new check is forced.
    pub mac_check_threshold: u64,
    /// Bound on waiting for a peer's message. Channels built for an engine
    /// from this configuration use it.
    pub receive: ReceivePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 4096,
            max_rounds_per_batch: 32,
            max_nesting_depth: 1024,
            mac_check_threshold: 100_000,
            receive: ReceivePolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from JSON file. Missing fields take default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path)?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from JSON string.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        if self.max_rounds_per_batch == 0 {
            return Err(Error::Config("max_rounds_per_batch must be positive".into()));
        }
        if self.receive.max_attempts == 0 {
            return Err(Error::Config("receive.max_attempts must be positive".into()));
        }
        Ok(())
    }
}

/// How long a receive polls for data before giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceivePolicy {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReceivePolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            max_attempts: 10,
        }
    }
}

impl ReceivePolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Total time a receive may wait.
    pub fn timeout(&self) -> Duration {
        self.poll_interval() * self.max_attempts
    }
}
