//! Configuration file support for the router.
//!
//! Loads optional `.cmdtree/config.toml` from a root directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use tracing::warn;

pub const DEFAULT_DEBUG_PERMISSION: &str = "cmdtree.debug";

fn default_debug_permission() -> String {
    DEFAULT_DEBUG_PERMISSION.to_string()
}

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Log a full diagnostic report for every failed dispatch
    pub debug: bool,
    /// Subjects holding this permission see internal error details
    #[serde(default = "default_debug_permission")]
    pub debug_permission: String,
    /// Alias -> owner reservations applied at registration time.
    /// Example: `spawn = "worlds"`
    pub aliases: BTreeMap<String, String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            debug: false,
            debug_permission: default_debug_permission(),
            aliases: BTreeMap::new(),
        }
    }
}

impl RouterConfig {
    /// Load config from `.cmdtree/config.toml` in the given root directory.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join(".cmdtree").join("config.toml");
        Self::load_from_path(&config_path)
    }

    /// Load config from a specific path.
    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read config, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = self.debug || debug;
        self
    }

    pub fn has_alias_overrides(&self) -> bool {
        !self.aliases.is_empty()
    }
}
