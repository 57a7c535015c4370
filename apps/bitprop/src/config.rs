//! # Run Configuration
//!
//! TOML settings for a propagation run. Every key is optional; CLI flags
//! override whatever the file sets.
//!
//! ```toml
//! iterations = 20
//! tolerance = 1e-9
//! mode = "full"              # or "information"
//! schedule = "functions-first"  # or "variables-first"
//! ```

use bitprop_core::{NodeRef, PropagationError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum accepted configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Default number of sweeps.
pub const DEFAULT_ITERATIONS: usize = 10;

/// Which update family a run applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateMode {
    /// Full distributions; each variable uses its own log/linear mode.
    #[default]
    Full,
    /// Index 0 only: single-event probabilities.
    Information,
}

/// Order of node updates inside one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Schedule {
    #[default]
    FunctionsFirst,
    VariablesFirst,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Maximum number of sweeps.
    pub iterations: usize,
    /// Stop early once the largest change of any observed value falls
    /// below this. Zero disables early stopping.
    pub tolerance: f64,
    pub mode: UpdateMode,
    pub schedule: Schedule,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            tolerance: 0.0,
            mode: UpdateMode::default(),
            schedule: Schedule::default(),
        }
    }
}

impl RunConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, PropagationError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| PropagationError::DeserializationError(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, PropagationError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| PropagationError::IoError(format!("Cannot read config metadata: {}", e)))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(PropagationError::IoError(format!(
                "Config size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| PropagationError::IoError(format!("Read config: {}", e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), PropagationError> {
        if self.iterations == 0 {
            return Err(config_error("iterations must be at least 1"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(config_error("tolerance must be finite and non-negative"));
        }
        Ok(())
    }
}

fn config_error(reason: &str) -> PropagationError {
    PropagationError::Configuration {
        node: NodeRef::Graph,
        reason: reason.to_string(),
    }
}
