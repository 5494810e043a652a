//! Per-stage compilation context: accumulated declarations and code body.

use std::collections::HashMap;

use super::{
    shared_data::SharedData,
    types::{Stage, ValueType},
};

/// A named, typed module-level declaration (attribute, uniform, varying).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub ty: ValueType,
}

/// A vertex attribute and the entry-point local it is copied into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDeclaration {
    pub name: String,
    pub ty: ValueType,
    pub local: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConstantDeclaration {
    pub name: String,
    pub ty: ValueType,
    pub literal: String,
}

/// A `texture_2d<f32>` and the sampler paired with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplerDeclaration {
    pub texture: String,
    pub sampler: String,
}

/// A pipeline-overridable boolean constant (the WGSL stand-in for a
/// preprocessor define).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefineDeclaration {
    pub name: String,
    pub default: bool,
}

#[derive(Clone, Debug)]
pub struct BuildState {
    pub stage: Stage,
    pub attributes: Vec<AttributeDeclaration>,
    pub uniforms: Vec<Declaration>,
    pub constants: Vec<ConstantDeclaration>,
    /// Varyings are declared on the vertex state; the fragment stage reads them.
    pub varyings: Vec<Declaration>,
    pub samplers: Vec<SamplerDeclaration>,
    pub defines: Vec<DefineDeclaration>,
    /// Helper functions keyed by name, in emission order.
    pub functions: Vec<(String, String)>,
    /// Generated statements of the entry point body.
    pub compilation: String,
    varying_by_source: HashMap<String, String>,
}

impl BuildState {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            attributes: Vec::new(),
            uniforms: Vec::new(),
            constants: Vec::new(),
            varyings: Vec::new(),
            samplers: Vec::new(),
            defines: Vec::new(),
            functions: Vec::new(),
            compilation: String::new(),
            varying_by_source: HashMap::new(),
        }
    }

    /// Appends one statement to the entry point body.
    pub fn emit_statement(&mut self, statement: &str) {
        self.compilation.push_str("    ");
        self.compilation.push_str(statement);
        self.compilation.push('\n');
    }

    /// Declares `let <name>: <type> = <expr>;`.
    pub fn emit_let(&mut self, name: &str, ty: ValueType, expr: &str) {
        self.emit_statement(&format!("let {name}: {} = {expr};", ty.wgsl()));
    }

    pub fn emit_comment(&mut self, text: &str) {
        self.emit_statement(&format!("// {text}"));
    }

    /// Declares a vertex attribute and returns the local holding its value.
    /// Every block reading the same attribute shares one local.
    pub fn emit_attribute(&mut self, name: &str, ty: ValueType, shared: &mut SharedData) -> String {
        if let Some(existing) = self.attributes.iter().find(|a| a.name == name) {
            return existing.local.clone();
        }
        let local = shared.free_variable_name(name);
        self.attributes.push(AttributeDeclaration {
            name: name.to_string(),
            ty,
            local: local.clone(),
        });
        local
    }

    pub fn emit_uniform(&mut self, name: &str, ty: ValueType) -> bool {
        if self.uniforms.iter().any(|u| u.name == name) {
            return false;
        }
        self.uniforms.push(Declaration {
            name: name.to_string(),
            ty,
        });
        true
    }

    pub fn emit_constant(&mut self, name: &str, ty: ValueType, literal: String) -> bool {
        if self.constants.iter().any(|c| c.name == name) {
            return false;
        }
        self.constants.push(ConstantDeclaration {
            name: name.to_string(),
            ty,
            literal,
        });
        true
    }

    /// Declares a texture binding; both names must come from the shared
    /// variable registry.
    pub fn emit_sampler(&mut self, texture: &str, sampler: &str) -> bool {
        if self.samplers.iter().any(|s| s.texture == texture) {
            return false;
        }
        self.samplers.push(SamplerDeclaration {
            texture: texture.to_string(),
            sampler: sampler.to_string(),
        });
        true
    }

    pub fn emit_define(&mut self, name: &str, default: bool) -> bool {
        if self.defines.iter().any(|d| d.name == name) {
            return false;
        }
        self.defines.push(DefineDeclaration {
            name: name.to_string(),
            default,
        });
        true
    }

    /// Adds a helper function once per stage.
    pub fn emit_function(&mut self, name: &str, code: &str) -> bool {
        if self.functions.iter().any(|(n, _)| n == name) {
            return false;
        }
        self.functions.push((name.to_string(), code.to_string()));
        true
    }

    /// Declares the varying carrying `source` across stages.
    ///
    /// Idempotent per source variable: returns the varying name and whether
    /// it was declared by this call (the caller then emits the assignment).
    pub fn emit_varying(
        &mut self,
        source: &str,
        ty: ValueType,
        shared: &mut SharedData,
    ) -> (String, bool) {
        if let Some(existing) = self.varying_by_source.get(source) {
            return (existing.clone(), false);
        }
        let name = shared.free_variable_name(&format!("v_{source}"));
        self.varying_by_source
            .insert(source.to_string(), name.clone());
        self.varyings.push(Declaration {
            name: name.clone(),
            ty,
        });
        (name, true)
    }

    /// Starts the fragment stage from the vertex stage's shared declarations.
    ///
    /// Uniforms live in one buffer and constants are program-wide, so the
    /// fragment lists begin as copies and only ever grow.
    pub fn inherit_shared_declarations(&mut self, vertex: &BuildState) {
        for u in &vertex.uniforms {
            self.emit_uniform(&u.name, u.ty);
        }
        for c in &vertex.constants {
            self.emit_constant(&c.name, c.ty, c.literal.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;

    #[test]
    fn varyings_are_declared_once_per_source() {
        let mut shared = SharedData::new(1, &BuildConfig::default());
        let mut vertex = BuildState::new(Stage::Vertex);

        let (first, declared) = vertex.emit_varying("output1", ValueType::Vector3, &mut shared);
        assert!(declared);
        assert_eq!(first, "v_output1");

        let (second, declared_again) = vertex.emit_varying("output1", ValueType::Vector3, &mut shared);
        assert!(!declared_again);
        assert_eq!(second, first);
        assert_eq!(vertex.varyings.len(), 1);
    }

    #[test]
    fn fragment_inherits_uniforms_and_constants() {
        let mut vertex = BuildState::new(Stage::Vertex);
        vertex.emit_uniform("u_tint", ValueType::Color3);
        vertex.emit_constant("scale", ValueType::Float, "2.0".to_string());

        let mut fragment = BuildState::new(Stage::Fragment);
        fragment.emit_uniform("time", ValueType::Float);
        fragment.inherit_shared_declarations(&vertex);
        assert_eq!(fragment.uniforms.len(), 2);
        assert_eq!(fragment.constants.len(), 1);
    }

    #[test]
    fn attributes_share_one_local() {
        let mut shared = SharedData::new(1, &BuildConfig::default());
        let mut vertex = BuildState::new(Stage::Vertex);
        let first = vertex.emit_attribute("uv", ValueType::Vector2, &mut shared);
        let second = vertex.emit_attribute("uv", ValueType::Vector2, &mut shared);
        assert_eq!(first, "uv");
        assert_eq!(first, second);
        assert_eq!(vertex.attributes.len(), 1);
    }

    #[test]
    fn helper_functions_are_deduplicated_by_name() {
        let mut state = BuildState::new(Stage::Fragment);
        assert!(state.emit_function("f", "fn f() {}"));
        assert!(!state.emit_function("f", "fn f() {}"));
        assert_eq!(state.functions.len(), 1);
    }
}
