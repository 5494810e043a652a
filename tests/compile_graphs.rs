use node_forge_shader_graph::{
    BlockId, BuildConfig, NodeGraph,
    blocks::{
        AnimationType, BlockKind, FragmentOutputBlock, InputBlock, MathBlock, MathOp,
        SystemValue, TextureBlock, TransformBlock, TrigonometryBlock, TrigonometryOp,
    },
    compiler::{
        self,
        types::{Target, ValueType},
        validation,
    },
};
use proptest::prelude::*;

fn wire(graph: &mut NodeGraph, from: BlockId, output: &str, to: BlockId, input: &str) {
    let o = graph.output_ref(from, output).unwrap();
    let i = graph.input_ref(to, input).unwrap();
    graph.connect(o, i).unwrap();
}

fn output_variable(graph: &NodeGraph, block: BlockId, output: &str) -> String {
    let r = graph.output_ref(block, output).unwrap();
    graph
        .output(r)
        .unwrap()
        .associated_variable()
        .unwrap()
        .to_string()
}

fn fragment_only_config() -> BuildConfig {
    BuildConfig {
        allow_empty_vertex_program: true,
        ..BuildConfig::embedded().unwrap()
    }
}

/// position -> transform(worldViewProjection) -> vertex output, returning
/// (graph, transform block).
fn positioned_graph() -> (NodeGraph, BlockId) {
    let mut graph = NodeGraph::new();
    let pos = graph.add_block(
        "position",
        BlockKind::Input(InputBlock::attribute("position", ValueType::Vector3)),
    );
    let wvp = graph.add_block(
        "wvp",
        BlockKind::Input(InputBlock::system_value(SystemValue::WorldViewProjection)),
    );
    let xf = graph.add_block("transform", BlockKind::Transform(TransformBlock::default()));
    let vout = graph.add_block("vertexOutput", BlockKind::VertexOutput);
    wire(&mut graph, pos, "output", xf, "vector");
    wire(&mut graph, wvp, "output", xf, "transform");
    wire(&mut graph, xf, "output", vout, "vector");
    (graph, xf)
}

#[test]
fn textured_mesh_compiles_to_valid_wgsl() {
    let (mut graph, xf) = positioned_graph();
    let uv = graph.add_block("uv", BlockKind::Input(InputBlock::attribute("uv", ValueType::Vector2)));
    let tex = graph.add_block("tex", BlockKind::Texture(TextureBlock::default()));
    let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
    wire(&mut graph, uv, "output", tex, "uv");
    wire(&mut graph, tex, "rgb", out, "rgb");

    let program = compiler::compile(&mut graph, &BuildConfig::embedded().unwrap()).unwrap();
    validation::validate_program(&program).unwrap();

    assert_eq!(program.attributes, ["position", "uv"]);
    assert_eq!(program.uniforms, ["worldViewProjection"]);
    assert_eq!(program.samplers, ["tex_texture"]);
    assert_eq!(program.varyings, ["v_uv"]);
    assert_eq!(program.texture_blocks, [tex]);
    assert!(program.bindable_blocks.contains(&tex));

    let position = output_variable(&graph, xf, "output");
    assert!(program.vertex.contains("fn vs_main(vin: VertexInput) -> VertexOutput {"));
    assert!(program.vertex.contains(&format!(
        "let {position}: vec4f = uniforms.worldViewProjection * vec4f(position, 1.0);"
    )));
    assert!(program.vertex.contains(&format!("vout.position = {position};")));
    // The uv attribute is only read by the fragment stage.
    assert!(program.vertex.contains("vout.v_uv = uv;"));
    assert!(program.fragment.contains("textureSample(tex_texture, tex_texture_sampler, v_uv)"));
}

#[test]
fn unused_outputs_are_not_emitted() {
    let (mut graph, _) = positioned_graph();
    let uv = graph.add_block("uv", BlockKind::Input(InputBlock::attribute("uv", ValueType::Vector2)));
    let tex = graph.add_block("tex", BlockKind::Texture(TextureBlock::default()));
    let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
    wire(&mut graph, uv, "output", tex, "uv");
    wire(&mut graph, tex, "rgb", out, "rgb");

    let program = compiler::compile(&mut graph, &BuildConfig::embedded().unwrap()).unwrap();
    assert!(!program.vertex.contains(".xyz"));
    assert!(program.fragment.contains("tex_sample.rgb;"));
    for channel in [".r;", ".g;", ".b;", ".a;"] {
        assert!(!program.fragment.contains(channel), "{channel}");
    }
    assert_eq!(program.fragment.matches("textureSample(").count(), 1);
}

#[test]
fn shared_dependencies_are_emitted_once() {
    let mut graph = NodeGraph::new();
    let a = graph.add_block("a", BlockKind::Input(InputBlock::constant_float(0.5)));
    let sin = graph.add_block(
        "sin",
        BlockKind::Trigonometry(TrigonometryBlock { op: TrigonometryOp::Sin }),
    );
    let cos = graph.add_block(
        "cos",
        BlockKind::Trigonometry(TrigonometryBlock { op: TrigonometryOp::Cos }),
    );
    let add = graph.add_block("add", BlockKind::Math(MathBlock { op: MathOp::Add }));
    let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
    wire(&mut graph, a, "output", sin, "input");
    wire(&mut graph, a, "output", cos, "input");
    wire(&mut graph, sin, "output", add, "left");
    wire(&mut graph, cos, "output", add, "right");
    wire(&mut graph, add, "output", out, "rgb");

    let program = compiler::compile(&mut graph, &fragment_only_config()).unwrap();
    assert_eq!(program.fragment.matches("const a: f32 = 0.5;").count(), 1);
    assert_eq!(program.fragment.matches("sin(a)").count(), 1);
    assert_eq!(program.fragment.matches("cos(a)").count(), 1);
}

#[test]
fn vertex_values_cross_through_one_varying() {
    let (mut graph, xf) = positioned_graph();
    let split = graph.add_block("split", BlockKind::VectorSplitter);
    let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
    wire(&mut graph, xf, "xyz", out, "rgb");
    wire(&mut graph, xf, "xyz", split, "xyz");
    wire(&mut graph, split, "x", out, "a");

    let program = compiler::compile(&mut graph, &BuildConfig::embedded().unwrap()).unwrap();
    let xyz = output_variable(&graph, xf, "xyz");
    let varying = format!("v_{xyz}");

    assert_eq!(program.varyings, [varying.clone()]);
    assert_eq!(
        program
            .vertex
            .matches(&format!("vout.{varying} = {xyz};"))
            .count(),
        1
    );
    assert!(program
        .fragment
        .contains(&format!("frag_color = vec4f({varying}, {varying}.x);")));
    validation::validate_program(&program).unwrap();
}

#[test]
fn dual_stage_blocks_are_emitted_in_both_stages() {
    let mut graph = NodeGraph::new();
    let pos = graph.add_block(
        "position",
        BlockKind::Input(InputBlock::attribute("position", ValueType::Vector3)),
    );
    let off = graph.add_block(
        "off",
        BlockKind::Input(InputBlock::uniform(ValueType::Vector3, vec![0.0, 1.0, 0.0])),
    );
    let add = graph.add_block("add", BlockKind::Math(MathBlock { op: MathOp::Add }));
    graph.block_mut(add).unwrap().set_target(Target::VertexAndFragment);
    let vout = graph.add_block("vertexOutput", BlockKind::VertexOutput);
    let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
    wire(&mut graph, pos, "output", add, "left");
    wire(&mut graph, off, "output", add, "right");
    wire(&mut graph, add, "output", vout, "vector");
    wire(&mut graph, add, "output", out, "rgb");

    let program = compiler::compile(&mut graph, &BuildConfig::embedded().unwrap()).unwrap();
    validation::validate_program(&program).unwrap();

    let sum = output_variable(&graph, add, "output");
    assert!(program
        .vertex
        .contains(&format!("let {sum}: vec3f = position + uniforms.u_off;")));
    // The fragment copy reads the attribute through a varying.
    assert_eq!(program.varyings, ["v_position"]);
    assert_eq!(program.vertex.matches("vout.v_position = position;").count(), 1);
    assert!(program
        .fragment
        .contains(&format!("let {sum}: vec3f = v_position + uniforms.u_off;")));
    assert!(program.fragment.contains(&format!("frag_color = vec4f({sum}, 1.0);")));
}

#[test]
fn vertex_pinned_blocks_cross_through_a_varying() {
    let (mut graph, _) = positioned_graph();
    let a = graph.add_block(
        "a",
        BlockKind::Input(InputBlock::uniform(ValueType::Color3, vec![1.0, 0.5, 0.0])),
    );
    let b = graph.add_block(
        "b",
        BlockKind::Input(InputBlock::uniform(ValueType::Color3, vec![0.5, 0.5, 0.5])),
    );
    let mul = graph.add_block("mul", BlockKind::Math(MathBlock { op: MathOp::Multiply }));
    graph.block_mut(mul).unwrap().set_target(Target::Vertex);
    let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
    wire(&mut graph, a, "output", mul, "left");
    wire(&mut graph, b, "output", mul, "right");
    wire(&mut graph, mul, "output", out, "rgb");

    let program = compiler::compile(&mut graph, &BuildConfig::embedded().unwrap()).unwrap();
    validation::validate_program(&program).unwrap();

    let product = output_variable(&graph, mul, "output");
    let varying = format!("v_{product}");
    assert!(program
        .vertex
        .contains(&format!("let {product}: vec3f = uniforms.u_a * uniforms.u_b;")));
    assert!(!program.fragment.contains("uniforms.u_a * uniforms.u_b"));
    assert_eq!(program.varyings, [varying.clone()]);
    assert_eq!(
        program
            .vertex
            .matches(&format!("vout.{varying} = {product};"))
            .count(),
        1
    );
    assert!(program
        .fragment
        .contains(&format!("frag_color = vec4f({varying}, 1.0);")));
}

#[test]
fn sampler_names_do_not_clash_with_block_names() {
    let (mut graph, _) = positioned_graph();
    let uv = graph.add_block("uv", BlockKind::Input(InputBlock::attribute("uv", ValueType::Vector2)));
    let tex = graph.add_block("albedo", BlockKind::Texture(TextureBlock::default()));
    let alpha = graph.add_block(
        "albedo_texture_sampler",
        BlockKind::Input(InputBlock::constant_float(0.5)),
    );
    let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
    wire(&mut graph, uv, "output", tex, "uv");
    wire(&mut graph, tex, "rgb", out, "rgb");
    wire(&mut graph, alpha, "output", out, "a");

    let program = compiler::compile(&mut graph, &BuildConfig::embedded().unwrap()).unwrap();
    validation::validate_program(&program).unwrap();
    assert!(program.fragment.contains("const albedo_texture_sampler: f32 = 0.5;"));
    assert!(program
        .fragment
        .contains("@group(1) @binding(1) var albedo_texture_sampler1: sampler;"));
    assert!(program
        .fragment
        .contains("textureSample(albedo_texture, albedo_texture_sampler1, v_uv)"));
}

#[test]
fn matrices_can_not_cross_stages() {
    let (mut graph, _) = positioned_graph();
    let wvp = graph.find_block("wvp").unwrap();
    let reroute = graph.add_block("matrix", BlockKind::Reroute);
    let color = graph.add_block(
        "color",
        BlockKind::Input(InputBlock::constant(ValueType::Vector4, vec![1.0, 1.0, 1.0, 1.0])),
    );
    let xf = graph.add_block("colorTransform", BlockKind::Transform(TransformBlock::default()));
    let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
    wire(&mut graph, wvp, "output", reroute, "input");
    wire(&mut graph, color, "output", xf, "vector");
    wire(&mut graph, reroute, "output", xf, "transform");
    wire(&mut graph, xf, "xyz", out, "rgb");

    // Route the vertex transform through the reroute too, so it is built in
    // the vertex stage.
    let vertex_xf = graph.find_block("transform").unwrap();
    let transform_input = graph.input_ref(vertex_xf, "transform").unwrap();
    graph.disconnect(transform_input).unwrap();
    wire(&mut graph, reroute, "output", vertex_xf, "transform");

    let err = compiler::compile(&mut graph, &BuildConfig::embedded().unwrap()).unwrap_err();
    let message = format!("{err}");
    assert!(
        message.contains("can not be passed from the vertex to the fragment stage"),
        "{message}"
    );
}

#[test]
fn diagnostics_are_reported_together() {
    let mut graph = NodeGraph::new();
    let a = graph.add_block("a", BlockKind::Input(InputBlock::constant_float(1.0)));
    let add = graph.add_block("add", BlockKind::Math(MathBlock { op: MathOp::Add }));
    let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
    wire(&mut graph, a, "output", add, "left");
    wire(&mut graph, add, "output", out, "rgb");

    let mut pass = compiler::build_graph(&mut graph, &BuildConfig::embedded().unwrap()).unwrap();
    let message = format!("{}", pass.finalize().unwrap_err());
    assert!(message.starts_with("Build of node graph failed:"));
    assert!(message.contains("does not have a vertex output"));
    assert!(message.contains("input right from block add[MathBlock] is not connected and is not optional."));
    assert!(!message.contains("fragment output"));
}

#[test]
fn uniform_inputs_are_reported_for_binding() {
    let (mut graph, _) = positioned_graph();
    let tint = graph.add_block(
        "tint",
        BlockKind::Input(
            InputBlock::uniform(ValueType::Color3, vec![1.0, 0.5, 0.25]).animated(AnimationType::Time),
        ),
    );
    let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
    wire(&mut graph, tint, "output", out, "rgb");

    let program = compiler::compile(&mut graph, &BuildConfig::embedded().unwrap()).unwrap();
    assert_eq!(program.uniforms, ["worldViewProjection", "u_tint"]);
    assert_eq!(program.input_blocks, [tint]);
    assert_eq!(program.animated_inputs, [tint]);
    assert!(program.fragment.contains("frag_color = vec4f(uniforms.u_tint, 1.0);"));
    assert!(program.vertex.contains("    u_tint: vec3f,\n"));
    validation::validate_program(&program).unwrap();
}

#[test]
fn gamma_conversion_adds_an_override() {
    let (mut graph, _) = positioned_graph();
    let out = graph.add_block(
        "out",
        BlockKind::FragmentOutput(FragmentOutputBlock {
            convert_to_gamma_space: true,
        }),
    );
    let color = graph.add_block(
        "color",
        BlockKind::Input(InputBlock::constant(ValueType::Color3, vec![0.2, 0.4, 0.6])),
    );
    wire(&mut graph, color, "output", out, "rgb");

    let program = compiler::compile(&mut graph, &BuildConfig::embedded().unwrap()).unwrap();
    assert_eq!(program.defines, ["CONVERT_TO_GAMMA"]);
    assert_eq!(program.blocks_with_defines, [out]);
    assert!(program.fragment.contains("override CONVERT_TO_GAMMA: bool = true;"));
    assert!(program.fragment.contains("fn to_gamma_space(color: vec3f) -> vec3f {"));
    assert!(!program.vertex.contains("CONVERT_TO_GAMMA"));
}

#[test]
fn block_comments_follow_the_config() {
    let (mut graph, _) = positioned_graph();
    let config = BuildConfig {
        emit_comments: true,
        ..BuildConfig::embedded().unwrap()
    };
    let color = graph.add_block("color", BlockKind::Input(InputBlock::constant_float(1.0)));
    let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
    wire(&mut graph, color, "output", out, "rgb");

    let program = compiler::compile(&mut graph, &config).unwrap();
    assert!(program.vertex.contains("    // transform\n"));
    assert!(program.fragment.contains("    // out\n"));
    assert!(!program.fragment.contains("// color"));
}

const TRIG_OPS: [TrigonometryOp; 14] = [
    TrigonometryOp::Sin,
    TrigonometryOp::Cos,
    TrigonometryOp::Tan,
    TrigonometryOp::Abs,
    TrigonometryOp::Fract,
    TrigonometryOp::Sqrt,
    TrigonometryOp::Exp,
    TrigonometryOp::Log,
    TrigonometryOp::Floor,
    TrigonometryOp::Ceil,
    TrigonometryOp::Negate,
    TrigonometryOp::OneMinus,
    TrigonometryOp::Sign,
    TrigonometryOp::Round,
];

proptest! {
    #[test]
    fn chains_emit_one_statement_per_block(ops in proptest::collection::vec(0usize..TRIG_OPS.len(), 1..8)) {
        let mut graph = NodeGraph::new();
        let mut previous = graph.add_block("a", BlockKind::Input(InputBlock::constant_float(0.25)));
        for (i, op) in ops.iter().enumerate() {
            let block = graph.add_block(
                format!("t{i}"),
                BlockKind::Trigonometry(TrigonometryBlock { op: TRIG_OPS[*op] }),
            );
            wire(&mut graph, previous, "output", block, "input");
            previous = block;
        }
        let out = graph.add_block("out", BlockKind::FragmentOutput(FragmentOutputBlock::default()));
        wire(&mut graph, previous, "output", out, "rgb");

        let config = fragment_only_config();
        let first = compiler::compile(&mut graph, &config).unwrap();
        let lets = first.fragment.lines().filter(|l| l.trim_start().starts_with("let ")).count();
        prop_assert_eq!(lets, ops.len());

        let second = compiler::compile(&mut graph, &config).unwrap();
        prop_assert_eq!(&first.fragment, &second.fragment);
        prop_assert!(second.build_id > first.build_id);
    }
}
