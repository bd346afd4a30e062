//! Tuning knobs for index lookups.
//!
//! Configuration is plain TOML:
//!
//! ```toml
//! # Levels with at least this many ranges use binary search.
//! linear_lookup_max = 64
//! ```
//!
//! Every index captures the process-wide configuration when it is built. Install
//! a custom one with [`IndexingConfig::install`] before building any containers.

use crate::error::{SparseError, SparseResult};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Range count at which lookups switch from a linear scan to binary search.
pub const DEFAULT_LINEAR_LOOKUP_MAX: usize = 64;

static GLOBAL: OnceCell<IndexingConfig> = OnceCell::new();

/// Index lookup configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Levels holding fewer ranges than this are scanned linearly; larger
    /// levels are binary searched. `0` forces binary search everywhere and
    /// `usize::MAX` forces linear scans.
    #[serde(default = "default_linear_lookup_max")]
    pub linear_lookup_max: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            linear_lookup_max: default_linear_lookup_max(),
        }
    }
}

fn default_linear_lookup_max() -> usize {
    DEFAULT_LINEAR_LOOKUP_MAX
}

impl IndexingConfig {
    /// Always scan linearly.
    pub fn linear_only() -> Self {
        Self {
            linear_lookup_max: usize::MAX,
        }
    }

    /// Always binary search.
    pub fn binary_only() -> Self {
        Self {
            linear_lookup_max: 0,
        }
    }

    pub fn from_toml_str(contents: &str) -> SparseResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> SparseResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no indexing config found, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
            .map_err(|e| SparseError::Config(format!("{}: {e}", path.display())))
    }

    /// Install the process-wide configuration.
    ///
    /// Fails (returning the rejected config) once a configuration is in place,
    /// including the default one fixed by the first call to [`IndexingConfig::global`].
    pub fn install(config: IndexingConfig) -> Result<(), IndexingConfig> {
        GLOBAL.set(config)?;
        debug!(config = ?GLOBAL.get(), "installed indexing config");
        Ok(())
    }

    pub fn global() -> &'static IndexingConfig {
        GLOBAL.get_or_init(IndexingConfig::default)
    }
}
