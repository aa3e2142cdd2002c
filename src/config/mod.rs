//! Configuration loading and validation.

use crate::error::LoadError;
use serde::Deserialize;
use std::path::Path;

/// Maximum number of `.out` files considered in one catalog scan (bound input size).
pub const MAX_CASE_FILES: usize = 10_000;

/// Default maximum size in bytes for a single input file.
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 64 * 1024 * 1024;

/// Default safety margin added around blast volumes when sizing the scene.
pub const DEFAULT_BLAST_MARGIN: f64 = 5.0;

/// Default recursion cap for kill-node resolution.
pub const DEFAULT_MAX_KILL_DEPTH: usize = 256;

/// Upper bound on the flattened component list of one kill node.
pub const MAX_KILL_COMPONENTS: usize = 1 << 20;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadConfig {
    /// Added to each blast volume's height plus radius when computing the volume radius.
    #[serde(default = "default_blast_margin")]
    pub blast_margin: f64,
    /// Inputs larger than this are rejected before parsing.
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: u64,
    /// Kill references nested deeper than this are treated as non-terminating.
    #[serde(default = "default_max_kill_depth")]
    pub max_kill_depth: usize,
    /// Fail the load when the case has no `.mtx` file.
    #[serde(default)]
    pub require_matrix: bool,
}

fn default_blast_margin() -> f64 {
    DEFAULT_BLAST_MARGIN
}

fn default_max_input_bytes() -> u64 {
    DEFAULT_MAX_INPUT_BYTES
}

fn default_max_kill_depth() -> usize {
    DEFAULT_MAX_KILL_DEPTH
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            blast_margin: DEFAULT_BLAST_MARGIN,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            max_kill_depth: DEFAULT_MAX_KILL_DEPTH,
            require_matrix: false,
        }
    }
}

impl LoadConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, LoadError> {
        let cfg: LoadConfig = toml::from_str(s).map_err(|e| LoadError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, LoadError> {
        let s = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<(), LoadError> {
        if !self.blast_margin.is_finite() || self.blast_margin < 0.0 {
            return Err(LoadError::Config(format!(
                "blast_margin must be a non-negative number, got {}",
                self.blast_margin
            )));
        }
        if self.max_kill_depth == 0 {
            return Err(LoadError::Config("max_kill_depth must be at least 1".to_string()));
        }
        if self.max_input_bytes == 0 {
            return Err(LoadError::Config("max_input_bytes must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let cfg = LoadConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.blast_margin, DEFAULT_BLAST_MARGIN);
        assert_eq!(cfg.max_kill_depth, DEFAULT_MAX_KILL_DEPTH);
        assert!(!cfg.require_matrix);
    }

    #[test]
    fn overrides_and_validation() {
        let cfg = LoadConfig::from_toml_str("blast_margin = 2.5\nrequire_matrix = true").unwrap();
        assert_eq!(cfg.blast_margin, 2.5);
        assert!(cfg.require_matrix);
        assert!(LoadConfig::from_toml_str("blast_margin = -1.0").is_err());
        assert!(LoadConfig::from_toml_str("max_kill_depth = 0").is_err());
        assert!(LoadConfig::from_toml_str("unknown_key = 1").is_err());
    }
}
