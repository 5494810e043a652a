//! 2D texture sampling.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{BlockIo, EmitContext};
use crate::{
    compiler::{shared_data::SharedData, types::ValueType},
    graph::Block,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureBlock {
    /// Binding name of the texture; the block name is used when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sampler_name: String,
}

pub(crate) fn register_texture(block: &mut Block) {
    block.register_input("uv", ValueType::Vector2, false);
    block.register_output("rgba", ValueType::Color4);
    block.register_output("rgb", ValueType::Color3);
    for channel in ["r", "g", "b", "a"] {
        block.register_output(channel, ValueType::Float);
    }
}

/// Declares `<name>: texture_2d<f32>` with a sampler and samples it once.
pub fn build_texture(texture: &TextureBlock, io: &mut BlockIo, ctx: &mut EmitContext<'_>) -> Result<()> {
    let base = if texture.sampler_name.is_empty() {
        ctx.block_name
    } else {
        texture.sampler_name.as_str()
    };
    let name = ctx.shared.free_variable_name(&format!("{base}_texture"));
    let sampler = ctx.shared.free_variable_name(&format!("{name}_sampler"));
    ctx.state.emit_sampler(&name, &sampler);
    SharedData::register(&mut ctx.shared.texture_blocks, ctx.block);
    SharedData::register(&mut ctx.shared.bindable_blocks, ctx.block);

    if !io.any_output_used() {
        return Ok(());
    }
    let uv = io.operand("uv", ValueType::Vector2, &ValueType::Vector2.zero_literal())?;
    let sample = ctx.shared.free_variable_name(&format!("{}_sample", ctx.block_name));
    ctx.state.emit_let(
        &sample,
        ValueType::Vector4,
        &format!("textureSample({name}, {sampler}, {uv})"),
    );
    for (output, swizzle) in [
        ("rgba", ""),
        ("rgb", ".rgb"),
        ("r", ".r"),
        ("g", ".g"),
        ("b", ".b"),
        ("a", ".a"),
    ] {
        ctx.emit_output(io, output, &format!("{sample}{swizzle}"))?;
    }
    Ok(())
}
