//! Final mergers: clip-space position and fragment color.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{BlockIo, EmitContext};
use crate::{
    compiler::{
        shared_data::{MissingInput, SharedData},
        types::ValueType,
        utils::convert,
    },
    graph::{Block, ConnectionPoint},
};

const GAMMA_FUNCTION: &str = "to_gamma_space";

const GAMMA_FUNCTION_CODE: &str = "fn to_gamma_space(color: vec3f) -> vec3f {
    return pow(color, vec3f(1.0 / 2.2));
}";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentOutputBlock {
    #[serde(default)]
    pub convert_to_gamma_space: bool,
}

pub(crate) fn register_vertex_output(block: &mut Block) {
    let mut vector = ConnectionPoint::input("vector", ValueType::Vector4, false);
    vector.accepted_types = vec![ValueType::Vector3];
    block.register_input_point(vector);
}

pub fn build_vertex_output(io: &mut BlockIo, ctx: &mut EmitContext<'_>) -> Result<()> {
    let position = io.operand("vector", ValueType::Vector4, "vec4f(0.0, 0.0, 0.0, 1.0)")?;
    ctx.state.emit_statement(&format!("vout.position = {position};"));
    Ok(())
}

pub(crate) fn register_fragment_output(block: &mut Block) {
    let mut rgba = ConnectionPoint::input("rgba", ValueType::Color4, true);
    rgba.accepted_types = vec![ValueType::Float];
    block.register_input_point(rgba);
    let mut rgb = ConnectionPoint::input("rgb", ValueType::Color3, true);
    rgb.accepted_types = vec![ValueType::Float];
    block.register_input_point(rgb);
    block.register_input("a", ValueType::Float, true);
}

/// Writes `frag_color` from `rgba`, or from `rgb` with `a` (default `1.0`).
pub fn build_fragment_output(
    output: &FragmentOutputBlock,
    io: &mut BlockIo,
    ctx: &mut EmitContext<'_>,
) -> Result<()> {
    let alpha = io.operand("a", ValueType::Float, "1.0")?;
    let color = if io.is_connected("rgba") {
        let rgba = io.operand("rgba", ValueType::Color4, "")?;
        if io.is_connected("a") {
            format!("vec4f(({rgba}).rgb, {alpha})")
        } else {
            rgba
        }
    } else if io.is_connected("rgb") {
        let rgb = io.input("rgb")?;
        let rgb = match &rgb.variable {
            Some(var) => convert(var, rgb.ty, ValueType::Color3),
            None => ValueType::Color3.zero_literal(),
        };
        format!("vec4f({rgb}, {alpha})")
    } else {
        ctx.shared.checks.record_missing_input(MissingInput {
            block: ctx.block,
            block_name: ctx.block_name.to_string(),
            class_name: ctx.class_name.to_string(),
            input: "rgba".to_string(),
        });
        return Ok(());
    };
    ctx.state.emit_statement(&format!("frag_color = {color};"));

    if output.convert_to_gamma_space {
        let define = ctx.shared.free_define_name("CONVERT_TO_GAMMA");
        ctx.state.emit_define(&define, true);
        ctx.state.emit_function(GAMMA_FUNCTION, GAMMA_FUNCTION_CODE);
        ctx.state.emit_statement(&format!(
            "if ({define}) {{ frag_color = vec4f({GAMMA_FUNCTION}(frag_color.rgb), frag_color.a); }}"
        ));
        SharedData::register(&mut ctx.shared.blocks_with_defines, ctx.block);
    }
    Ok(())
}
