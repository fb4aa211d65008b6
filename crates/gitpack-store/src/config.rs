use std::path::Path;

use gitpack_pack::{DEFAULT_INFLATE_GROWTH, DEFAULT_LOOKAHEAD};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Tuning knobs for the store registry and object resolution.
///
/// Every field has a default, so a TOML file only needs the keys it
/// overrides:
///
/// ```toml
/// registry_capacity = 8
/// max_delta_depth = 256
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Repository stores kept in the registry's LRU cache.
    pub registry_capacity: usize,
    /// Bytes read at an entry offset to decode its header.
    pub lookahead: usize,
    /// Bytes added to the inflate window after each short attempt.
    pub inflate_growth: usize,
    /// Deepest delta chain followed before the pack is treated as corrupt.
    pub max_delta_depth: usize,
    /// Resolve tree and blob entries instead of rejecting them.
    pub decode_trees_and_blobs: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            registry_capacity: 4,
            lookahead: DEFAULT_LOOKAHEAD,
            inflate_growth: DEFAULT_INFLATE_GROWTH,
            max_delta_depth: 1024,
            decode_trees_and_blobs: false,
        }
    }
}

impl StoreConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Reject values the resolver cannot work with.
    pub fn validate(&self) -> StoreResult<()> {
        if self.registry_capacity == 0 {
            return Err(StoreError::Config("registry_capacity must be at least 1".into()));
        }
        if self.lookahead < DEFAULT_LOOKAHEAD {
            return Err(StoreError::Config(format!(
                "lookahead must be at least {DEFAULT_LOOKAHEAD} bytes"
            )));
        }
        if self.inflate_growth == 0 {
            return Err(StoreError::Config("inflate_growth must be at least 1".into()));
        }
        Ok(())
    }
}
