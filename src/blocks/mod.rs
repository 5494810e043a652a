//! Built-in block kinds: socket registration, serialization fields and code emission.

pub mod input_blocks;
pub mod math_blocks;
pub mod output_blocks;
pub mod texture_blocks;
pub mod vector_blocks;

use anyhow::{Result, anyhow, bail};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    compiler::{
        build_state::BuildState,
        shared_data::SharedData,
        types::{Stage, Target, ValueType},
        utils::convert,
    },
    graph::{Block, BlockId},
};

pub use input_blocks::{AnimationType, InputBlock, InputSource, SystemValue};
pub use math_blocks::{MathBlock, MathOp, TrigonometryBlock, TrigonometryOp};
pub use output_blocks::FragmentOutputBlock;
pub use texture_blocks::TextureBlock;
pub use vector_blocks::TransformBlock;

/// Every block kind the compiler knows how to emit.
///
/// The variant decides the block's sockets, its default target and the code
/// it contributes; `class_name` is the tag used for serialization.
#[derive(Clone, Debug, PartialEq)]
pub enum BlockKind {
    Input(InputBlock),
    Math(MathBlock),
    Trigonometry(TrigonometryBlock),
    Lerp,
    Transform(TransformBlock),
    VectorMerger,
    VectorSplitter,
    Reroute,
    Texture(TextureBlock),
    VertexOutput,
    FragmentOutput(FragmentOutputBlock),
}

impl BlockKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            BlockKind::Input(_) => "InputBlock",
            BlockKind::Math(_) => "MathBlock",
            BlockKind::Trigonometry(_) => "TrigonometryBlock",
            BlockKind::Lerp => "LerpBlock",
            BlockKind::Transform(_) => "TransformBlock",
            BlockKind::VectorMerger => "VectorMergerBlock",
            BlockKind::VectorSplitter => "VectorSplitterBlock",
            BlockKind::Reroute => "RerouteBlock",
            BlockKind::Texture(_) => "TextureBlock",
            BlockKind::VertexOutput => "VertexOutputBlock",
            BlockKind::FragmentOutput(_) => "FragmentOutputBlock",
        }
    }

    pub fn default_target(&self) -> Target {
        match self {
            BlockKind::Input(_) | BlockKind::VertexOutput => Target::Vertex,
            BlockKind::Texture(_) | BlockKind::FragmentOutput(_) => Target::Fragment,
            _ => Target::Neutral,
        }
    }

    /// Produces a mandatory stage output (clip-space position or fragment color).
    pub fn is_final_merger(&self) -> bool {
        matches!(self, BlockKind::VertexOutput | BlockKind::FragmentOutput(_))
    }

    pub fn is_attribute_input(&self) -> bool {
        matches!(
            self,
            BlockKind::Input(InputBlock {
                source: InputSource::Attribute { .. },
                ..
            })
        )
    }

    pub(crate) fn register_points(&self, block: &mut Block) {
        match self {
            BlockKind::Input(b) => input_blocks::register_input(b, block),
            BlockKind::Math(_) => math_blocks::register_math(block),
            BlockKind::Trigonometry(_) => math_blocks::register_trigonometry(block),
            BlockKind::Lerp => math_blocks::register_lerp(block),
            BlockKind::Transform(_) => vector_blocks::register_transform(block),
            BlockKind::VectorMerger => vector_blocks::register_vector_merger(block),
            BlockKind::VectorSplitter => vector_blocks::register_vector_splitter(block),
            BlockKind::Reroute => vector_blocks::register_reroute(block),
            BlockKind::Texture(_) => texture_blocks::register_texture(block),
            BlockKind::VertexOutput => output_blocks::register_vertex_output(block),
            BlockKind::FragmentOutput(_) => output_blocks::register_fragment_output(block),
        }
    }

    /// Block-specific serialized fields.
    pub fn fields(&self) -> Result<Map<String, Value>> {
        match self {
            BlockKind::Input(b) => to_fields(b),
            BlockKind::Math(b) => to_fields(b),
            BlockKind::Trigonometry(b) => to_fields(b),
            BlockKind::Transform(b) => to_fields(b),
            BlockKind::Texture(b) => to_fields(b),
            BlockKind::FragmentOutput(b) => to_fields(b),
            BlockKind::Lerp
            | BlockKind::VectorMerger
            | BlockKind::VectorSplitter
            | BlockKind::Reroute
            | BlockKind::VertexOutput => Ok(Map::new()),
        }
    }

    /// Same kind, configured from serialized fields. Unknown keys are ignored.
    pub fn with_fields(&self, fields: &Map<String, Value>) -> Result<BlockKind> {
        Ok(match self {
            BlockKind::Input(_) => BlockKind::Input(from_fields(fields)?),
            BlockKind::Math(_) => BlockKind::Math(from_fields(fields)?),
            BlockKind::Trigonometry(_) => BlockKind::Trigonometry(from_fields(fields)?),
            BlockKind::Transform(_) => BlockKind::Transform(from_fields(fields)?),
            BlockKind::Texture(_) => BlockKind::Texture(from_fields(fields)?),
            BlockKind::FragmentOutput(_) => BlockKind::FragmentOutput(from_fields(fields)?),
            other => other.clone(),
        })
    }

    /// Emits this block's code into the current stage.
    pub(crate) fn build_code(&self, io: &mut BlockIo, ctx: &mut EmitContext<'_>) -> Result<()> {
        match self {
            BlockKind::Input(b) => input_blocks::build_input(b, io, ctx),
            BlockKind::Math(b) => math_blocks::build_math(b, io, ctx),
            BlockKind::Trigonometry(b) => math_blocks::build_trigonometry(b, io, ctx),
            BlockKind::Lerp => math_blocks::build_lerp(io, ctx),
            BlockKind::Transform(b) => vector_blocks::build_transform(b, io, ctx),
            BlockKind::VectorMerger => vector_blocks::build_vector_merger(io, ctx),
            BlockKind::VectorSplitter => vector_blocks::build_vector_splitter(io, ctx),
            BlockKind::Reroute => vector_blocks::build_reroute(io),
            BlockKind::Texture(b) => texture_blocks::build_texture(b, io, ctx),
            BlockKind::VertexOutput => output_blocks::build_vertex_output(io, ctx),
            BlockKind::FragmentOutput(b) => output_blocks::build_fragment_output(b, io, ctx),
        }
    }
}

fn to_fields<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => bail!("block fields must serialize to an object, got {other}"),
    }
}

fn from_fields<T: DeserializeOwned>(fields: &Map<String, Value>) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(fields.clone()))?)
}

/// Resolved view of one input socket at emission time.
#[derive(Clone, Debug)]
pub struct InputSlot {
    pub name: String,
    /// Variable (or varying) to read; `None` when unconnected.
    pub variable: Option<String>,
    pub ty: ValueType,
}

/// Resolved view of one output socket at emission time.
#[derive(Clone, Debug)]
pub struct OutputSlot {
    pub name: String,
    /// Variable consumers will read. Emitters may rename it.
    pub variable: String,
    pub ty: ValueType,
    pub has_endpoints: bool,
}

/// Sockets of the block being emitted, with names and types resolved.
#[derive(Clone, Debug, Default)]
pub struct BlockIo {
    pub inputs: Vec<InputSlot>,
    pub outputs: Vec<OutputSlot>,
}

impl BlockIo {
    pub fn input(&self, name: &str) -> Result<&InputSlot> {
        self.inputs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| anyhow!("missing input slot {name}"))
    }

    pub fn output(&self, name: &str) -> Result<&OutputSlot> {
        self.outputs
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| anyhow!("missing output slot {name}"))
    }

    pub fn output_mut(&mut self, name: &str) -> Result<&mut OutputSlot> {
        self.outputs
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| anyhow!("missing output slot {name}"))
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.input(name).is_ok_and(|s| s.variable.is_some())
    }

    /// Reads input `name` converted to `to`, or `default` when unconnected.
    pub fn operand(&self, name: &str, to: ValueType, default: &str) -> Result<String> {
        let slot = self.input(name)?;
        Ok(match &slot.variable {
            Some(var) => convert(var, slot.ty, to),
            None => default.to_string(),
        })
    }

    pub fn any_output_used(&self) -> bool {
        self.outputs.iter().any(|o| o.has_endpoints)
    }
}

/// Where an emitter writes: the current stage's state plus the pass-wide data.
pub struct EmitContext<'a> {
    pub block: BlockId,
    pub block_name: &'a str,
    pub class_name: &'static str,
    pub stage: Stage,
    pub state: &'a mut BuildState,
    /// The vertex state while building the fragment stage.
    pub vertex_state: Option<&'a mut BuildState>,
    pub shared: &'a mut SharedData,
}

impl EmitContext<'_> {
    /// Records a diagnostic attributed to the current block.
    pub fn record_error(&mut self, message: &str) {
        let full = format!("block {}[{}]: {message}", self.block_name, self.class_name);
        self.shared.checks.record_error(full);
    }

    /// Emits `let <output var>: <type> = <expr>;` when the output is consumed.
    pub fn emit_output(&mut self, io: &BlockIo, output: &str, expr: &str) -> Result<()> {
        let slot = io.output(output)?;
        if slot.has_endpoints {
            self.state.emit_let(&slot.variable, slot.ty, expr);
        }
        Ok(())
    }
}
