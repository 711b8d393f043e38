//! Queue configuration structures.

use serde::{Deserialize, Serialize};

/// Default multiplier applied to `max_concurrency` to size the background
/// pool. Background work is lighter and more numerous than build actions,
/// so it gets a larger, separate pool.
pub const DEFAULT_BACKGROUND_MULTIPLIER: usize = 4;

/// Event queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Worker count for the normal lane.
    pub max_concurrency: usize,
    /// Background pool size as a multiple of `max_concurrency`.
    #[serde(default = "default_background_multiplier")]
    pub background_multiplier: usize,
}

fn default_background_multiplier() -> usize {
    DEFAULT_BACKGROUND_MULTIPLIER
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueConfig {
    /// Create a configuration sized from the number of available CPUs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_concurrency: num_cpus::get(),
            background_multiplier: DEFAULT_BACKGROUND_MULTIPLIER,
        }
    }

    /// Set the normal-lane worker count.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the background pool multiplier.
    #[must_use]
    pub fn with_background_multiplier(mut self, multiplier: usize) -> Self {
        self.background_multiplier = multiplier;
        self
    }

    /// Background-lane worker count derived from this configuration.
    #[must_use]
    pub const fn background_concurrency(&self) -> usize {
        self.max_concurrency * self.background_multiplier
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be greater than 0".into());
        }
        if self.background_multiplier == 0 {
            return Err("background_multiplier must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse a configuration from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns a message describing the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
