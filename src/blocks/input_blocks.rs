//! Input blocks: constants, uniforms, vertex attributes and system values.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{BlockIo, EmitContext};
use crate::{
    compiler::{
        shared_data::SharedData,
        types::{Stage, ValueType},
        utils::{literal, sanitize_wgsl_ident},
    },
    graph::Block,
};

/// Engine-provided values bound by the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemValue {
    World,
    View,
    Projection,
    ViewProjection,
    WorldView,
    WorldViewProjection,
    CameraPosition,
    Time,
    DeltaTime,
}

impl SystemValue {
    pub fn value_type(self) -> ValueType {
        match self {
            SystemValue::CameraPosition => ValueType::Vector3,
            SystemValue::Time | SystemValue::DeltaTime => ValueType::Float,
            _ => ValueType::Matrix,
        }
    }

    /// Field name in the `Uniforms` struct.
    pub fn uniform_name(self) -> &'static str {
        match self {
            SystemValue::World => "world",
            SystemValue::View => "view",
            SystemValue::Projection => "projection",
            SystemValue::ViewProjection => "viewProjection",
            SystemValue::WorldView => "worldView",
            SystemValue::WorldViewProjection => "worldViewProjection",
            SystemValue::CameraPosition => "cameraPosition",
            SystemValue::Time => "time",
            SystemValue::DeltaTime => "deltaTime",
        }
    }
}

/// How the runtime animates an input between frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnimationType {
    Time,
}

/// Where an input block's value comes from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum InputSource {
    /// Inlined as a module-scope `const`.
    Constant { value: Vec<f32> },
    /// A field of the uniform buffer; `value` is the initial binding.
    Uniform { value: Vec<f32> },
    /// A per-vertex attribute, only readable in the vertex stage.
    Attribute { attribute: String },
    SystemValue {
        #[serde(rename = "systemValue")]
        system_value: SystemValue,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputBlock {
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(flatten)]
    pub source: InputSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation_type: Option<AnimationType>,
}

impl Default for InputBlock {
    fn default() -> Self {
        Self::constant_float(0.0)
    }
}

impl InputBlock {
    pub fn constant_float(v: f32) -> Self {
        Self::constant(ValueType::Float, vec![v])
    }

    pub fn constant(ty: ValueType, value: Vec<f32>) -> Self {
        Self {
            ty,
            source: InputSource::Constant { value },
            animation_type: None,
        }
    }

    pub fn uniform(ty: ValueType, value: Vec<f32>) -> Self {
        Self {
            ty,
            source: InputSource::Uniform { value },
            animation_type: None,
        }
    }

    pub fn attribute(name: &str, ty: ValueType) -> Self {
        Self {
            ty,
            source: InputSource::Attribute {
                attribute: name.to_string(),
            },
            animation_type: None,
        }
    }

    pub fn system_value(value: SystemValue) -> Self {
        Self {
            ty: value.value_type(),
            source: InputSource::SystemValue {
                system_value: value,
            },
            animation_type: None,
        }
    }

    pub fn animated(mut self, animation: AnimationType) -> Self {
        self.animation_type = Some(animation);
        self
    }

    /// Concrete output type; system values always use their own type.
    pub fn value_type(&self) -> ValueType {
        match &self.source {
            InputSource::SystemValue { system_value } => system_value.value_type(),
            _ if self.ty.is_wildcard() => ValueType::Float,
            _ => self.ty,
        }
    }

    pub fn is_uniform(&self) -> bool {
        matches!(self.source, InputSource::Uniform { .. })
    }
}

pub(crate) fn register_input(input: &InputBlock, block: &mut Block) {
    block.register_output("output", input.value_type());
}

/// Declares the backing storage and points the output at it. Input blocks
/// emit no statements; consumers read the constant, uniform field or
/// attribute local directly.
pub fn build_input(input: &InputBlock, io: &mut BlockIo, ctx: &mut EmitContext<'_>) -> Result<()> {
    let ty = input.value_type();
    let variable = match &input.source {
        InputSource::Constant { value } => {
            let name = ctx.shared.free_variable_name(ctx.block_name);
            ctx.state.emit_constant(&name, ty, literal(ty, value));
            name
        }
        InputSource::Uniform { .. } => {
            let name = ctx
                .shared
                .free_variable_name(&format!("u_{}", ctx.block_name));
            ctx.state.emit_uniform(&name, ty);
            SharedData::register(&mut ctx.shared.input_blocks, ctx.block);
            if input.animation_type.is_some() {
                SharedData::register(&mut ctx.shared.animated_inputs, ctx.block);
            }
            format!("uniforms.{name}")
        }
        InputSource::Attribute { attribute } => {
            let name = sanitize_wgsl_ident(attribute);
            // Attributes requested by the fragment stage are declared on the
            // vertex side; the builder then carries them over in a varying.
            match (ctx.stage, ctx.vertex_state.as_deref_mut()) {
                (Stage::Vertex, _) => ctx.state.emit_attribute(&name, ty, ctx.shared),
                (Stage::Fragment, Some(vertex)) => vertex.emit_attribute(&name, ty, ctx.shared),
                (Stage::Fragment, None) => {
                    ctx.record_error("attributes can only be read in the vertex stage");
                    ty.zero_literal()
                }
            }
        }
        InputSource::SystemValue { system_value } => {
            let name = system_value.uniform_name();
            ctx.state.emit_uniform(name, ty);
            SharedData::register(&mut ctx.shared.bindable_blocks, ctx.block);
            format!("uniforms.{name}")
        }
    };
    if let Some(output) = io.outputs.first_mut() {
        output.variable = variable;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn input_fields_serialize_flat() {
        let input = InputBlock::system_value(SystemValue::WorldViewProjection);
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(
            value,
            json!({"type": "matrix", "mode": "systemValue", "systemValue": "worldViewProjection"})
        );

        let uniform = InputBlock::uniform(ValueType::Float, vec![0.5]).animated(AnimationType::Time);
        let value = serde_json::to_value(&uniform).unwrap();
        assert_eq!(value["mode"], "uniform");
        assert_eq!(value["animationType"], "time");
        let back: InputBlock = serde_json::from_value(value).unwrap();
        assert_eq!(back, uniform);
    }

    #[test]
    fn wildcard_input_types_fall_back_to_float() {
        let input = InputBlock::constant(ValueType::AutoDetect, vec![1.0]);
        assert_eq!(input.value_type(), ValueType::Float);
        let sv = InputBlock {
            ty: ValueType::Float,
            ..InputBlock::system_value(SystemValue::CameraPosition)
        };
        assert_eq!(sv.value_type(), ValueType::Vector3);
    }
}
