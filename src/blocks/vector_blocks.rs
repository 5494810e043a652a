//! Vector plumbing: matrix transform, merge/split of components, reroute.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{BlockIo, EmitContext};
use crate::{
    compiler::{
        types::ValueType,
        utils::{convert, fmt_f32},
    },
    graph::{Block, ConnectionPoint},
};

fn default_complement_w() -> f32 {
    1.0
}

/// Multiplies a vector by a 4x4 matrix. Narrower vectors are widened with
/// zeros and `complement_w` as the fourth component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformBlock {
    #[serde(default = "default_complement_w")]
    pub complement_w: f32,
}

impl Default for TransformBlock {
    fn default() -> Self {
        Self {
            complement_w: default_complement_w(),
        }
    }
}

pub(crate) fn register_transform(block: &mut Block) {
    let mut vector = ConnectionPoint::input("vector", ValueType::AutoDetect, false);
    vector.excluded_types = vec![ValueType::Float, ValueType::Int, ValueType::Matrix];
    vector.default_type = ValueType::Vector4;
    block.register_input_point(vector);
    block.register_input("transform", ValueType::Matrix, false);
    block.register_output("output", ValueType::Vector4);
    block.register_output("xyz", ValueType::Vector3);
}

pub fn build_transform(
    transform: &TransformBlock,
    io: &mut BlockIo,
    ctx: &mut EmitContext<'_>,
) -> Result<()> {
    let slot = io.input("vector")?;
    let w = fmt_f32(transform.complement_w);
    let widened = match (&slot.variable, slot.ty.components()) {
        (None, _) => format!("vec4f(0.0, 0.0, 0.0, {w})"),
        (Some(v), 2) => format!("vec4f({v}, 0.0, {w})"),
        (Some(v), 3) => format!("vec4f({v}, {w})"),
        (Some(v), _) => convert(v, slot.ty, ValueType::Vector4),
    };
    let matrix = io.operand("transform", ValueType::Matrix, &ValueType::Matrix.zero_literal())?;
    let product = format!("{matrix} * {widened}");

    let output = io.output("output")?;
    if output.has_endpoints {
        let var = output.variable.clone();
        ctx.emit_output(io, "output", &product)?;
        ctx.emit_output(io, "xyz", &format!("{var}.xyz"))?;
    } else {
        ctx.emit_output(io, "xyz", &format!("({product}).xyz"))?;
    }
    Ok(())
}

pub(crate) fn register_vector_merger(block: &mut Block) {
    for name in ["x", "y", "z", "w"] {
        block.register_input(name, ValueType::Float, true);
    }
    block.register_output("xyzw", ValueType::Vector4);
    block.register_output("xyz", ValueType::Vector3);
    block.register_output("xy", ValueType::Vector2);
}

pub fn build_vector_merger(io: &mut BlockIo, ctx: &mut EmitContext<'_>) -> Result<()> {
    let mut components = Vec::with_capacity(4);
    for name in ["x", "y", "z", "w"] {
        components.push(io.operand(name, ValueType::Float, "0.0")?);
    }
    ctx.emit_output(io, "xyzw", &format!("vec4f({})", components.join(", ")))?;
    ctx.emit_output(io, "xyz", &format!("vec3f({})", components[..3].join(", ")))?;
    ctx.emit_output(io, "xy", &format!("vec2f({})", components[..2].join(", ")))?;
    Ok(())
}

pub(crate) fn register_vector_splitter(block: &mut Block) {
    block.register_input("xyzw", ValueType::Vector4, true);
    block.register_input("xyz", ValueType::Vector3, true);
    block.register_input("xy", ValueType::Vector2, true);
    block.register_output("xyz", ValueType::Vector3);
    block.register_output("xy", ValueType::Vector2);
    for name in ["x", "y", "z", "w"] {
        block.register_output(name, ValueType::Float);
    }
}

/// Emits nothing: each output reads a swizzle of the widest connected input.
pub fn build_vector_splitter(io: &mut BlockIo, ctx: &mut EmitContext<'_>) -> Result<()> {
    let source = ["xyzw", "xyz", "xy"]
        .into_iter()
        .filter_map(|name| io.input(name).ok())
        .find_map(|slot| slot.variable.clone().map(|v| (v, slot.ty)));
    let Some((var, ty)) = source else {
        ctx.record_error("one of the xyzw, xyz or xy inputs must be connected");
        for output in &mut io.outputs {
            output.variable = output.ty.zero_literal();
        }
        return Ok(());
    };

    let components = ty.components();
    for output in &mut io.outputs {
        output.variable = match output.name.as_str() {
            "xyz" => convert(&var, ty, ValueType::Vector3),
            "xy" => convert(&var, ty, ValueType::Vector2),
            "x" => format!("{var}.x"),
            "y" => format!("{var}.y"),
            "z" if components >= 3 => format!("{var}.z"),
            "w" if components >= 4 => format!("{var}.w"),
            _ => "0.0".to_string(),
        };
    }
    Ok(())
}

pub(crate) fn register_reroute(block: &mut Block) {
    let input = block.register_input("input", ValueType::AutoDetect, false);
    let mut output = ConnectionPoint::output("output", ValueType::BasedOnInput);
    output.type_sources = vec![input];
    block.register_output_point(output);
}

/// Forwards the input's variable under the output socket.
pub fn build_reroute(io: &mut BlockIo) -> Result<()> {
    let source = io.input("input")?.variable.clone();
    let output = io.output_mut("output")?;
    output.variable = source.unwrap_or_else(|| output.ty.zero_literal());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blocks::{InputSlot, OutputSlot},
        compiler::{build_state::BuildState, shared_data::SharedData, types::Stage},
        config::BuildConfig,
        graph::BlockId,
    };

    fn slot(name: &str, var: Option<&str>, ty: ValueType) -> InputSlot {
        InputSlot {
            name: name.to_string(),
            variable: var.map(str::to_string),
            ty,
        }
    }

    fn out(name: &str, ty: ValueType, used: bool) -> OutputSlot {
        OutputSlot {
            name: name.to_string(),
            variable: format!("{name}_out"),
            ty,
            has_endpoints: used,
        }
    }

    fn run(
        f: impl FnOnce(&mut BlockIo, &mut EmitContext<'_>) -> Result<()>,
        io: &mut BlockIo,
    ) -> (String, SharedData) {
        let mut state = BuildState::new(Stage::Vertex);
        let mut shared = SharedData::new(1, &BuildConfig::default());
        let mut ctx = EmitContext {
            block: BlockId(0),
            block_name: "v",
            class_name: "TestBlock",
            stage: Stage::Vertex,
            state: &mut state,
            vertex_state: None,
            shared: &mut shared,
        };
        f(io, &mut ctx).unwrap();
        (state.compilation, shared)
    }

    #[test]
    fn transform_widens_positions_with_complement_w() {
        let mut io = BlockIo {
            inputs: vec![
                slot("vector", Some("pos"), ValueType::Vector3),
                slot("transform", Some("uniforms.world"), ValueType::Matrix),
            ],
            outputs: vec![out("output", ValueType::Vector4, true), out("xyz", ValueType::Vector3, false)],
        };
        let transform = TransformBlock::default();
        let (code, _) = run(|io, ctx| build_transform(&transform, io, ctx), &mut io);
        assert_eq!(
            code.trim(),
            "let output_out: vec4f = uniforms.world * vec4f(pos, 1.0);"
        );
    }

    #[test]
    fn merger_only_declares_used_outputs() {
        let mut io = BlockIo {
            inputs: vec![
                slot("x", Some("a"), ValueType::Float),
                slot("y", None, ValueType::Float),
                slot("z", None, ValueType::Float),
                slot("w", None, ValueType::Float),
            ],
            outputs: vec![
                out("xyzw", ValueType::Vector4, false),
                out("xyz", ValueType::Vector3, true),
                out("xy", ValueType::Vector2, false),
            ],
        };
        let (code, _) = run(build_vector_merger, &mut io);
        assert_eq!(code.trim(), "let xyz_out: vec3f = vec3f(a, 0.0, 0.0);");
    }

    #[test]
    fn splitter_renames_outputs_without_emitting() {
        let mut io = BlockIo {
            inputs: vec![
                slot("xyzw", None, ValueType::Vector4),
                slot("xyz", Some("n"), ValueType::Vector3),
                slot("xy", None, ValueType::Vector2),
            ],
            outputs: ["xyz", "xy", "x", "y", "z", "w"]
                .iter()
                .map(|n| out(n, ValueType::Float, true))
                .collect(),
        };
        let (code, _) = run(build_vector_splitter, &mut io);
        assert!(code.is_empty());
        let vars: Vec<&str> = io.outputs.iter().map(|o| o.variable.as_str()).collect();
        assert_eq!(vars, ["n", "n.xy", "n.x", "n.y", "n.z", "0.0"]);
    }

    #[test]
    fn splitter_without_input_records_an_error() {
        let mut io = BlockIo {
            inputs: vec![slot("xyzw", None, ValueType::Vector4)],
            outputs: vec![out("x", ValueType::Float, true)],
        };
        let (_, shared) = run(build_vector_splitter, &mut io);
        assert_eq!(shared.checks.custom_errors.len(), 1);
        assert_eq!(io.outputs[0].variable, "0.0");
    }

    #[test]
    fn reroute_forwards_the_input_variable() {
        let mut io = BlockIo {
            inputs: vec![slot("input", Some("uv"), ValueType::Vector2)],
            outputs: vec![out("output", ValueType::Vector2, true)],
        };
        build_reroute(&mut io).unwrap();
        assert_eq!(io.outputs[0].variable, "uv");
    }
}
