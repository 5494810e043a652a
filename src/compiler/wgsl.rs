//! Assembly of the two WGSL modules from the per-stage build states.
//!
//! Both modules share one layout: the `Uniforms` buffer at group 0, one
//! texture/sampler pair per texture block at group 1, and the
//! `VertexOutput` struct carrying the varyings.

use super::{
    build_state::{BuildState, Declaration, SamplerDeclaration},
    types::ValueType,
};

pub const UNIFORM_GROUP: u32 = 0;
pub const TEXTURE_GROUP: u32 = 1;

/// Samplers of both stages in first-declaration order; the position in this
/// list decides the binding pair of each texture.
pub fn sampler_table(vertex: &BuildState, fragment: &BuildState) -> Vec<SamplerDeclaration> {
    let mut table: Vec<SamplerDeclaration> = Vec::new();
    for decl in vertex.samplers.iter().chain(&fragment.samplers) {
        if !table.iter().any(|t| t.texture == decl.texture) {
            table.push(decl.clone());
        }
    }
    table
}

fn push_uniforms(out: &mut String, uniforms: &[Declaration]) {
    if uniforms.is_empty() {
        return;
    }
    out.push_str("struct Uniforms {\n");
    for u in uniforms {
        out.push_str(&format!("    {}: {},\n", u.name, u.ty.wgsl()));
    }
    out.push_str("};\n\n");
    out.push_str(&format!(
        "@group({UNIFORM_GROUP}) @binding(0) var<uniform> uniforms: Uniforms;\n\n"
    ));
}

fn push_stage_globals(out: &mut String, state: &BuildState, samplers: &[SamplerDeclaration]) {
    for c in &state.constants {
        out.push_str(&format!("const {}: {} = {};\n", c.name, c.ty.wgsl(), c.literal));
    }
    if !state.constants.is_empty() {
        out.push('\n');
    }

    let mut any_sampler = false;
    for (i, decl) in samplers.iter().enumerate() {
        if !state.samplers.iter().any(|s| s.texture == decl.texture) {
            continue;
        }
        let binding = 2 * i;
        out.push_str(&format!(
            "@group({TEXTURE_GROUP}) @binding({binding}) var {}: texture_2d<f32>;\n",
            decl.texture
        ));
        out.push_str(&format!(
            "@group({TEXTURE_GROUP}) @binding({}) var {}: sampler;\n",
            binding + 1,
            decl.sampler
        ));
        any_sampler = true;
    }
    if any_sampler {
        out.push('\n');
    }

    for d in &state.defines {
        out.push_str(&format!("override {}: bool = {};\n", d.name, d.default));
    }
    if !state.defines.is_empty() {
        out.push('\n');
    }
}

fn push_vertex_output(out: &mut String, varyings: &[Declaration]) {
    out.push_str("struct VertexOutput {\n");
    out.push_str("    @builtin(position) position: vec4f,\n");
    for (location, v) in varyings.iter().enumerate() {
        let interpolation = if v.ty == ValueType::Int {
            " @interpolate(flat)"
        } else {
            ""
        };
        out.push_str(&format!(
            "    @location({location}){interpolation} {}: {},\n",
            v.name,
            v.ty.wgsl()
        ));
    }
    out.push_str("};\n\n");
}

fn push_functions(out: &mut String, state: &BuildState) {
    for (_, code) in &state.functions {
        out.push_str(code.trim_end());
        out.push_str("\n\n");
    }
}

/// Vertex module: `vs_main(vin: VertexInput) -> VertexOutput`.
///
/// The uniform struct comes from the fragment state, whose list is a
/// superset of the vertex one, so both modules agree on the buffer layout.
pub fn vertex_module(vertex: &BuildState, fragment: &BuildState) -> String {
    let samplers = sampler_table(vertex, fragment);
    let mut out = String::new();
    push_uniforms(&mut out, &fragment.uniforms);
    push_stage_globals(&mut out, vertex, &samplers);

    if !vertex.attributes.is_empty() {
        out.push_str("struct VertexInput {\n");
        for (location, a) in vertex.attributes.iter().enumerate() {
            out.push_str(&format!("    @location({location}) {}: {},\n", a.name, a.ty.wgsl()));
        }
        out.push_str("};\n\n");
    }
    push_vertex_output(&mut out, &vertex.varyings);
    push_functions(&mut out, vertex);

    out.push_str("@vertex\n");
    if vertex.attributes.is_empty() {
        out.push_str("fn vs_main() -> VertexOutput {\n");
    } else {
        out.push_str("fn vs_main(vin: VertexInput) -> VertexOutput {\n");
    }
    out.push_str("    var vout: VertexOutput;\n");
    for a in &vertex.attributes {
        out.push_str(&format!("    let {}: {} = vin.{};\n", a.local, a.ty.wgsl(), a.name));
    }
    out.push_str(&vertex.compilation);
    out.push_str("    return vout;\n}\n");
    out
}

/// Fragment module: `fs_main(fin: VertexOutput) -> @location(0) vec4f`.
pub fn fragment_module(vertex: &BuildState, fragment: &BuildState) -> String {
    let samplers = sampler_table(vertex, fragment);
    let mut out = String::new();
    push_uniforms(&mut out, &fragment.uniforms);
    push_stage_globals(&mut out, fragment, &samplers);
    push_vertex_output(&mut out, &vertex.varyings);
    push_functions(&mut out, fragment);

    out.push_str("@fragment\n");
    out.push_str("fn fs_main(fin: VertexOutput) -> @location(0) vec4f {\n");
    out.push_str("    var frag_color: vec4f = vec4f(0.0);\n");
    for v in &vertex.varyings {
        out.push_str(&format!("    let {}: {} = fin.{};\n", v.name, v.ty.wgsl(), v.name));
    }
    out.push_str(&fragment.compilation);
    out.push_str("    return frag_color;\n}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::{shared_data::SharedData, types::Stage},
        config::BuildConfig,
    };

    #[test]
    fn modules_share_the_uniform_layout_and_varyings() {
        let mut shared = SharedData::new(1, &BuildConfig::default());
        let mut vertex = BuildState::new(Stage::Vertex);
        vertex.emit_uniform("world", ValueType::Matrix);
        let (varying, _) = vertex.emit_varying("uv", ValueType::Vector2, &mut shared);
        vertex.emit_statement(&format!("vout.{varying} = uv;"));

        let mut fragment = BuildState::new(Stage::Fragment);
        fragment.inherit_shared_declarations(&vertex);
        fragment.emit_uniform("time", ValueType::Float);
        fragment.emit_sampler("albedo_texture", "albedo_texture_sampler");

        let vs = vertex_module(&vertex, &fragment);
        let fs = fragment_module(&vertex, &fragment);
        for module in [&vs, &fs] {
            assert!(module.contains("    world: mat4x4f,\n    time: f32,\n"));
            assert!(module.contains("@location(0) v_uv: vec2f,"));
        }
        assert!(vs.contains("fn vs_main() -> VertexOutput {"));
        assert!(!vs.contains("texture_2d"));
        assert!(fs.contains("@group(1) @binding(0) var albedo_texture: texture_2d<f32>;"));
        assert!(fs.contains("@group(1) @binding(1) var albedo_texture_sampler: sampler;"));
        assert!(fs.contains("let v_uv: vec2f = fin.v_uv;"));
    }

    #[test]
    fn integer_varyings_are_flat() {
        let mut shared = SharedData::new(1, &BuildConfig::default());
        let mut vertex = BuildState::new(Stage::Vertex);
        vertex.emit_varying("id", ValueType::Int, &mut shared);
        let fragment = BuildState::new(Stage::Fragment);
        let fs = fragment_module(&vertex, &fragment);
        assert!(fs.contains("@location(0) @interpolate(flat) v_id: i32,"));
    }
}
