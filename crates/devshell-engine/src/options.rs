//! Session configuration
//!
//! Options can be built in code (starting from [`BridgeOptions::default`]) or
//! read from a TOML file:
//!
//! ```toml
//! universal_root = "java.lang.Object"
//! marker_root = "com.google.gwt.core.client.JavaScriptObject"
//! bootstrap_types = ["com.google.gwt.dev.shell.JavaScriptHost"]
//! dump_dir = "target/rewritten"
//! rewrite = true
//! ```

use crate::error::{BridgeError, BridgeResult};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default universal root type
pub const DEFAULT_UNIVERSAL_ROOT: &str = "java.lang.Object";

/// Default root of the host-bridging marker hierarchy
pub const DEFAULT_MARKER_ROOT: &str = "com.google.gwt.core.client.JavaScriptObject";

/// Configuration for a [`HostedSession`](crate::HostedSession)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Binary name of the type every class ultimately extends
    pub universal_root: String,

    /// Binary name of the marker hierarchy root. Without it (or when the
    /// type metadata does not know it) no marker rewriting takes place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker_root: Option<String>,

    /// Binary names of types whose images come from the resource locator
    /// rather than the registry
    pub bootstrap_types: Vec<String>,

    /// Directory receiving every image the rewriter changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_dir: Option<PathBuf>,

    /// Whether the marker rewriter runs at all
    pub rewrite: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            universal_root: DEFAULT_UNIVERSAL_ROOT.to_string(),
            marker_root: Some(DEFAULT_MARKER_ROOT.to_string()),
            bootstrap_types: Vec::new(),
            dump_dir: None,
            rewrite: true,
        }
    }
}

impl BridgeOptions {
    /// Parse options from a TOML file
    pub fn from_file(path: &Path) -> BridgeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse options from a TOML string
    pub fn from_toml_str(content: &str) -> BridgeResult<Self> {
        let options: BridgeOptions =
            toml::from_str(content).map_err(|e| BridgeError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Render the options as TOML
    pub fn to_toml_string(&self) -> BridgeResult<String> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Validate the options
    pub fn validate(&self) -> BridgeResult<()> {
        if !is_valid_binary_name(&self.universal_root) {
            return Err(BridgeError::Config(format!(
                "Invalid universal root: '{}'",
                self.universal_root
            )));
        }

        if let Some(marker_root) = &self.marker_root {
            if !is_valid_binary_name(marker_root) {
                return Err(BridgeError::Config(format!(
                    "Invalid marker root: '{}'",
                    marker_root
                )));
            }
            if *marker_root == self.universal_root {
                return Err(BridgeError::Config(
                    "Marker root cannot be the universal root".to_string(),
                ));
            }
        }

        let mut seen = FxHashSet::default();
        for name in &self.bootstrap_types {
            if !is_valid_binary_name(name) {
                return Err(BridgeError::Config(format!(
                    "Invalid bootstrap type: '{}'",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(BridgeError::Config(format!(
                    "Duplicate bootstrap type: '{}'",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Whether the name is configured as a bootstrap type
    pub fn is_bootstrap(&self, binary_name: &str) -> bool {
        self.bootstrap_types.iter().any(|t| t == binary_name)
    }
}

/// Check that a name is a dotted binary name (`a.b.Outer$Inner`)
fn is_valid_binary_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            !segment.is_empty()
                && !segment.starts_with(|c: char| c.is_ascii_digit())
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}
