//! Arithmetic blocks: binary math, unary functions and linear interpolation.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{BlockIo, EmitContext};
use crate::{
    compiler::{types::ValueType, utils::convert},
    graph::{Block, ConnectionPoint},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MathOp {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
    Min,
    Max,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MathBlock {
    pub op: MathOp,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrigonometryOp {
    #[default]
    Sin,
    Cos,
    Tan,
    Abs,
    Fract,
    Sqrt,
    Exp,
    Log,
    Floor,
    Ceil,
    Negate,
    OneMinus,
    Sign,
    Round,
}

impl TrigonometryOp {
    fn apply(self, x: &str) -> String {
        match self {
            TrigonometryOp::Negate => format!("-({x})"),
            TrigonometryOp::OneMinus => format!("1.0 - {x}"),
            op => format!("{}({x})", op.function()),
        }
    }

    fn function(self) -> &'static str {
        match self {
            TrigonometryOp::Sin => "sin",
            TrigonometryOp::Cos => "cos",
            TrigonometryOp::Tan => "tan",
            TrigonometryOp::Abs => "abs",
            TrigonometryOp::Fract => "fract",
            TrigonometryOp::Sqrt => "sqrt",
            TrigonometryOp::Exp => "exp",
            TrigonometryOp::Log => "log",
            TrigonometryOp::Floor => "floor",
            TrigonometryOp::Ceil => "ceil",
            TrigonometryOp::Sign => "sign",
            TrigonometryOp::Round => "round",
            TrigonometryOp::Negate | TrigonometryOp::OneMinus => "",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrigonometryBlock {
    pub op: TrigonometryOp,
}

fn wildcard_input(name: &str, optional: bool, excluded: &[ValueType]) -> ConnectionPoint {
    let mut point = ConnectionPoint::input(name, ValueType::AutoDetect, optional);
    point.excluded_types = excluded.to_vec();
    point
}

/// Registers `left`/`right` as linked wildcards and an `output` mirroring them.
fn register_linked_pair(block: &mut Block, excluded: &[ValueType]) -> (usize, usize) {
    let left = block.register_input_point(wildcard_input("left", false, excluded));
    let right = block.register_input_point(wildcard_input("right", false, excluded));
    block.inputs[left].linked_input = Some(right);
    block.inputs[right].linked_input = Some(left);
    (left, right)
}

fn register_based_on_input_output(block: &mut Block, sources: Vec<usize>) {
    let mut output = ConnectionPoint::output("output", ValueType::BasedOnInput);
    output.type_sources = sources;
    block.register_output_point(output);
}

pub(crate) fn register_math(block: &mut Block) {
    let (left, right) = register_linked_pair(block, &[ValueType::Matrix]);
    register_based_on_input_output(block, vec![left, right]);
}

pub(crate) fn register_trigonometry(block: &mut Block) {
    let input = block.register_input_point(wildcard_input(
        "input",
        false,
        &[ValueType::Matrix, ValueType::Int],
    ));
    register_based_on_input_output(block, vec![input]);
}

pub(crate) fn register_lerp(block: &mut Block) {
    let excluded = [ValueType::Matrix, ValueType::Int];
    let (left, right) = register_linked_pair(block, &excluded);
    block.register_input_point(wildcard_input("gradient", true, &excluded));
    register_based_on_input_output(block, vec![left, right]);
}

pub fn build_math(math: &MathBlock, io: &mut BlockIo, ctx: &mut EmitContext<'_>) -> Result<()> {
    let ty = io.output("output")?.ty;
    let zero = ty.zero_literal();
    let left = io.operand("left", ty, &zero)?;
    let right = io.operand("right", ty, &zero)?;
    let expr = match math.op {
        MathOp::Add => format!("{left} + {right}"),
        MathOp::Subtract => format!("{left} - {right}"),
        MathOp::Multiply => format!("{left} * {right}"),
        MathOp::Divide => format!("{left} / {right}"),
        MathOp::Min => format!("min({left}, {right})"),
        MathOp::Max => format!("max({left}, {right})"),
    };
    ctx.emit_output(io, "output", &expr)
}

pub fn build_trigonometry(
    trig: &TrigonometryBlock,
    io: &mut BlockIo,
    ctx: &mut EmitContext<'_>,
) -> Result<()> {
    let ty = io.output("output")?.ty;
    let input = io.operand("input", ty, &ty.zero_literal())?;
    ctx.emit_output(io, "output", &trig.op.apply(&input))
}

/// `mix(left, right, gradient)`. A scalar gradient is passed as is since
/// WGSL's `mix` accepts one for vector operands.
pub fn build_lerp(io: &mut BlockIo, ctx: &mut EmitContext<'_>) -> Result<()> {
    let ty = io.output("output")?.ty;
    let zero = ty.zero_literal();
    let left = io.operand("left", ty, &zero)?;
    let right = io.operand("right", ty, &zero)?;
    let slot = io.input("gradient")?;
    let gradient = match &slot.variable {
        None => "0.5".to_string(),
        Some(var) if slot.ty == ValueType::Float => var.clone(),
        Some(var) => convert(var, slot.ty, ty),
    };
    ctx.emit_output(io, "output", &format!("mix({left}, {right}, {gradient})"))
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

    fn io(inputs: &[(&str, Option<&str>, ValueType)], out_ty: ValueType) -> BlockIo {
        BlockIo {
            inputs: inputs
                .iter()
                .map(|(name, var, ty)| InputSlot {
                    name: name.to_string(),
                    variable: var.map(str::to_string),
                    ty: *ty,
                })
                .collect(),
            outputs: vec![OutputSlot {
                name: "output".to_string(),
                variable: "r".to_string(),
                ty: out_ty,
                has_endpoints: true,
            }],
        }
    }

    fn emit(f: impl FnOnce(&mut BlockIo, &mut EmitContext<'_>) -> Result<()>, mut io: BlockIo) -> String {
        let mut state = BuildState::new(Stage::Fragment);
        let mut shared = SharedData::new(1, &BuildConfig::default());
        let mut ctx = EmitContext {
            block: BlockId(0),
            block_name: "m",
            class_name: "MathBlock",
            stage: Stage::Fragment,
            state: &mut state,
            vertex_state: None,
            shared: &mut shared,
        };
        f(&mut io, &mut ctx).unwrap();
        state.compilation
    }

    #[test]
    fn scalar_operand_is_splatted_to_the_vector_type() {
        let io = io(
            &[
                ("left", Some("v"), ValueType::Vector3),
                ("right", Some("s"), ValueType::Float),
            ],
            ValueType::Vector3,
        );
        let math = MathBlock { op: MathOp::Multiply };
        let code = emit(|io, ctx| build_math(&math, io, ctx), io);
        assert_eq!(code.trim(), "let r: vec3f = v * vec3f(s);");
    }

    #[test]
    fn min_and_max_use_builtins() {
        let io = io(
            &[
                ("left", Some("a"), ValueType::Float),
                ("right", Some("b"), ValueType::Float),
            ],
            ValueType::Float,
        );
        let math = MathBlock { op: MathOp::Max };
        let code = emit(|io, ctx| build_math(&math, io, ctx), io);
        assert!(code.contains("= max(a, b);"));
    }

    #[test]
    fn unary_ops_wrap_their_operand() {
        assert_eq!(TrigonometryOp::Negate.apply("x"), "-(x)");
        assert_eq!(TrigonometryOp::OneMinus.apply("x"), "1.0 - x");
        assert_eq!(TrigonometryOp::Fract.apply("x"), "fract(x)");
    }

    #[test]
    fn lerp_gradient_defaults_to_half() {
        let io = io(
            &[
                ("left", Some("a"), ValueType::Color3),
                ("right", Some("b"), ValueType::Color3),
                ("gradient", None, ValueType::Float),
            ],
            ValueType::Color3,
        );
        let code = emit(build_lerp, io);
        assert!(code.contains("let r: vec3f = mix(a, b, 0.5);"));
    }

    #[test]
    fn op_names_serialize_in_camel_case() {
        let trig = TrigonometryBlock { op: TrigonometryOp::OneMinus };
        assert_eq!(serde_json::to_value(&trig).unwrap()["op"], "oneMinus");
    }
}
