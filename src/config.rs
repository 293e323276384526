//! Engine configuration: defaults plus an optional TOML overlay.

use std::path::Path;

use serde::Deserialize;

use crate::error::{EngineError, FrankResult};

/// Configuration for a frank engine session.
///
/// All fields have workable defaults; a TOML file can override any subset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Inactivity timeout in seconds, measured from the last heartbeat.
    pub timeout_secs: u64,
    /// Pause between scheduler passes when the frontier is momentarily idle.
    pub idle_pause_ms: u64,
    /// Maximum decomposition depth from the root node.
    pub max_depth: usize,
    /// Number of sibling value-children created by the temporal decomposition.
    pub temporal_branching_factor: usize,
    /// Decomposition strategies consulted (in shuffled order) when no
    /// uninstantiated nested sub-query forces normalization.
    pub base_decompositions: Vec<String>,
    /// Significant digits used when formatting the answer error bar.
    pub errorbar_sigdig: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            idle_pause_ms: 3000,
            max_depth: 10,
            temporal_branching_factor: 10,
            base_decompositions: vec![
                "temporal".into(),
                "comparison".into(),
                "geospatial".into(),
            ],
            errorbar_sigdig: 2,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, overlaying the defaults.
    pub fn from_toml_file(path: &Path) -> FrankResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::ConfigFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: EngineConfig =
            toml::from_str(&text).map_err(|e| EngineError::ConfigFile {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check field ranges.
    pub fn validate(&self) -> FrankResult<()> {
        if self.max_depth == 0 {
            return Err(EngineError::InvalidConfig {
                message: "max_depth must be > 0".into(),
            }
            .into());
        }
        if self.temporal_branching_factor < 2 {
            return Err(EngineError::InvalidConfig {
                message: "temporal_branching_factor must be >= 2".into(),
            }
            .into());
        }
        Ok(())
    }
}
