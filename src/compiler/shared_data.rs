//! Cross-stage compilation state shared by the vertex and fragment builds.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};

use crate::{config::BuildConfig, graph::BlockId};

use super::{types::Stage, utils::sanitize_wgsl_ident};

/// Compilation pass lifecycle. There is no partial-success state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildPhase {
    Idle,
    Building(Stage),
    Finalizing,
    Ready,
    Failed,
}

/// A required input that was left unconnected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingInput {
    pub block: BlockId,
    pub block_name: String,
    pub class_name: String,
    pub input: String,
}

/// Diagnostics collected during the build and reported together.
#[derive(Clone, Debug, Default)]
pub struct BuildChecks {
    pub emit_vertex: bool,
    pub emit_fragment: bool,
    pub not_connected_non_optional_inputs: Vec<MissingInput>,
    pub custom_errors: Vec<String>,
}

impl BuildChecks {
    pub fn record_missing_input(&mut self, missing: MissingInput) {
        if !self.not_connected_non_optional_inputs.contains(&missing) {
            self.not_connected_non_optional_inputs.push(missing);
        }
    }

    pub fn record_error(&mut self, message: String) {
        if !self.custom_errors.contains(&message) {
            self.custom_errors.push(message);
        }
    }
}

/// Unique-name registry: `name`, `name1`, `name2`, ...
#[derive(Clone, Debug, Default)]
struct NameRegistry {
    counters: HashMap<String, u32>,
    used: HashSet<String>,
}

impl NameRegistry {
    fn seeded(reserved: &[String]) -> Self {
        let mut registry = Self::default();
        for name in reserved {
            registry.counters.insert(name.clone(), 0);
            registry.used.insert(name.clone());
        }
        registry
    }

    fn free_name(&mut self, prefix: &str) -> String {
        if !self.counters.contains_key(prefix) && !self.used.contains(prefix) {
            self.counters.insert(prefix.to_string(), 0);
            self.used.insert(prefix.to_string());
            return prefix.to_string();
        }
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{prefix}{counter}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// One per compilation pass; threaded through every block build alongside
/// the stage's `BuildState`.
#[derive(Clone, Debug)]
pub struct SharedData {
    pub build_id: u64,
    pub phase: BuildPhase,
    pub emit_comments: bool,
    pub verbose: bool,
    pub allow_empty_vertex_program: bool,
    variable_names: NameRegistry,
    define_names: NameRegistry,
    /// Uniform-backed input blocks whose values are bound at render time.
    pub input_blocks: Vec<BlockId>,
    pub animated_inputs: Vec<BlockId>,
    pub texture_blocks: Vec<BlockId>,
    /// Blocks that need runtime bindings (system values, textures).
    pub bindable_blocks: Vec<BlockId>,
    /// Blocks that own overridable defines and must refresh them before use.
    pub blocks_with_defines: Vec<BlockId>,
    pub checks: BuildChecks,
}

impl SharedData {
    pub fn new(build_id: u64, config: &BuildConfig) -> Self {
        Self {
            build_id,
            phase: BuildPhase::Idle,
            emit_comments: config.emit_comments,
            verbose: config.verbose,
            allow_empty_vertex_program: config.allow_empty_vertex_program,
            variable_names: NameRegistry::seeded(&config.reserved_names),
            define_names: NameRegistry::seeded(&config.reserved_defines),
            input_blocks: Vec::new(),
            animated_inputs: Vec::new(),
            texture_blocks: Vec::new(),
            bindable_blocks: Vec::new(),
            blocks_with_defines: Vec::new(),
            checks: BuildChecks::default(),
        }
    }

    /// Returns an identifier derived from `prefix` that no other variable of
    /// this pass uses.
    pub fn free_variable_name(&mut self, prefix: &str) -> String {
        self.variable_names.free_name(&sanitize_wgsl_ident(prefix))
    }

    pub fn free_define_name(&mut self, prefix: &str) -> String {
        self.define_names.free_name(&sanitize_wgsl_ident(prefix))
    }

    pub(crate) fn register(list: &mut Vec<BlockId>, id: BlockId) {
        if !list.contains(&id) {
            list.push(id);
        }
    }

    /// Fails with every collected diagnostic in one message.
    pub fn emit_errors(&self) -> Result<()> {
        let mut message = String::new();
        if !self.checks.emit_vertex && !self.allow_empty_vertex_program {
            message.push_str(
                "graph does not have a vertex output. Add at least one block that generates a position value.\n",
            );
        }
        if !self.checks.emit_fragment {
            message.push_str(
                "graph does not have a fragment output. Add at least one block that generates a fragment color.\n",
            );
        }
        for missing in &self.checks.not_connected_non_optional_inputs {
            message.push_str(&format!(
                "input {} from block {}[{}] is not connected and is not optional.\n",
                missing.input, missing.block_name, missing.class_name
            ));
        }
        for error in &self.checks.custom_errors {
            message.push_str(error);
            message.push('\n');
        }
        if !message.is_empty() {
            bail!("Build of node graph failed:\n{message}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn shared_with_reserved(reserved: &[&str]) -> SharedData {
        let config = BuildConfig {
            reserved_names: reserved.iter().map(|s| s.to_string()).collect(),
            ..BuildConfig::default()
        };
        SharedData::new(1, &config)
    }

    #[test]
    fn free_names_count_up_per_prefix() {
        let mut shared = shared_with_reserved(&[]);
        assert_eq!(shared.free_variable_name("color"), "color");
        assert_eq!(shared.free_variable_name("color"), "color1");
        assert_eq!(shared.free_variable_name("color"), "color2");
        assert_eq!(shared.free_variable_name("alpha"), "alpha");
    }

    #[test]
    fn reserved_names_are_never_handed_out() {
        let mut shared = shared_with_reserved(&["position", "output"]);
        assert_eq!(shared.free_variable_name("position"), "position1");
        assert_eq!(shared.free_variable_name("output"), "output1");
    }

    #[test]
    fn suffixed_prefixes_do_not_collide() {
        let mut shared = shared_with_reserved(&[]);
        assert_eq!(shared.free_variable_name("a"), "a");
        assert_eq!(shared.free_variable_name("a1"), "a1");
        assert_eq!(shared.free_variable_name("a"), "a2");
    }

    #[test]
    fn defines_use_an_independent_registry() {
        let mut shared = shared_with_reserved(&[]);
        assert_eq!(shared.free_variable_name("GAMMA"), "GAMMA");
        assert_eq!(shared.free_define_name("GAMMA"), "GAMMA");
        assert_eq!(shared.free_define_name("GAMMA"), "GAMMA1");
    }

    #[test]
    fn errors_are_reported_together() {
        let mut shared = shared_with_reserved(&[]);
        shared.checks.emit_vertex = true;
        shared.checks.record_missing_input(MissingInput {
            block: BlockId(3),
            block_name: "add".to_string(),
            class_name: "MathBlock".to_string(),
            input: "right".to_string(),
        });
        let err = format!("{}", shared.emit_errors().unwrap_err());
        assert!(err.starts_with("Build of node graph failed:"));
        assert!(err.contains("fragment output"));
        assert!(err.contains("input right from block add[MathBlock] is not connected"));
        assert!(!err.contains("vertex output"));
    }

    proptest! {
        #[test]
        fn generated_names_are_unique(prefixes in prop::collection::vec("[a-z]{1,3}[0-9]?", 1..40)) {
            let mut shared = shared_with_reserved(&["ab", "x"]);
            let mut seen = HashSet::new();
            for prefix in prefixes {
                let name = shared.free_variable_name(&prefix);
                prop_assert!(name != "ab" && name != "x");
                prop_assert!(seen.insert(name));
            }
        }
    }
}
