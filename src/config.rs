//! Compilation settings.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

const DEFAULT_BUILD_CONFIG_JSON: &str = include_str!("../assets/build-config.json");

/// Settings for one compilation pass. Passed explicitly to
/// [`crate::compiler::build_graph`]; nothing here is process-wide.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    /// Identifiers generated variables must never take (WGSL keywords,
    /// entry-point locals, builtin functions).
    pub reserved_names: Vec<String>,
    pub reserved_defines: Vec<String>,
    /// Emit a `// <block name>` line before each block's code.
    pub emit_comments: bool,
    /// Log every block build at info level.
    pub verbose: bool,
    /// Accept graphs without a vertex output.
    pub allow_empty_vertex_program: bool,
}

impl BuildConfig {
    /// The configuration bundled with the crate.
    pub fn embedded() -> Result<Self> {
        serde_json::from_str(DEFAULT_BUILD_CONFIG_JSON)
            .map_err(|e| anyhow!("failed to parse assets/build-config.json: {e}"))
    }
}

/// Reads a configuration file. Missing keys keep their default values.
pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<BuildConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read build config at {}", path.display()))?;
    serde_json::from_str(&text).context("failed to parse build config json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_config_reserves_entry_point_names() {
        let config = BuildConfig::embedded().unwrap();
        for name in ["output", "vout", "fin", "uniforms", "frag_color"] {
            assert!(config.reserved_names.iter().any(|n| n == name), "{name}");
        }
        assert!(!config.emit_comments);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: BuildConfig = serde_json::from_str(r#"{"emitComments": true}"#).unwrap();
        assert!(config.emit_comments);
        assert!(config.reserved_names.is_empty());
        assert!(!config.allow_empty_vertex_program);
    }
}
