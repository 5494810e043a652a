//! Two-stage compilation of a [`NodeGraph`] into a pair of WGSL modules.
//!
//! A pass walks the graph from its output blocks, emits every reachable
//! block once (vertex stage first, then fragment), threads vertex values into
//! the fragment stage through varyings and finally assembles both modules.
//! Diagnostics are collected in [`SharedData`] and reported together by
//! [`BuildPass::finalize`].

pub mod build_state;
pub mod shared_data;
pub mod types;
pub mod utils;
pub mod validation;
pub mod wgsl;

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::{
    blocks::{BlockIo, EmitContext, InputSlot, OutputSlot},
    config::BuildConfig,
    graph::{BlockId, InputRef, NodeGraph, OutputRef},
};

use build_state::BuildState;
use shared_data::{BuildPhase, MissingInput, SharedData};
use types::{Stage, Target, ValueType};

/// Both build states and the shared data of one pass, before finalization.
#[derive(Clone, Debug)]
pub struct BuildPass {
    pub vertex: BuildState,
    pub fragment: BuildState,
    pub shared: SharedData,
}

/// Output of a successful pass: two WGSL modules plus the binding tables the
/// runtime needs to feed them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledProgram {
    pub build_id: u64,
    pub vertex: String,
    pub fragment: String,
    /// Fields of the `Uniforms` struct, in layout order.
    pub uniforms: Vec<String>,
    /// Vertex attributes, in `@location` order.
    pub attributes: Vec<String>,
    /// Texture names; texture `i` binds at `2i` and its sampler at `2i + 1`.
    pub samplers: Vec<String>,
    pub defines: Vec<String>,
    pub varyings: Vec<String>,
    pub input_blocks: Vec<BlockId>,
    pub animated_inputs: Vec<BlockId>,
    pub texture_blocks: Vec<BlockId>,
    pub bindable_blocks: Vec<BlockId>,
    pub blocks_with_defines: Vec<BlockId>,
}

impl BuildPass {
    pub fn build_id(&self) -> u64 {
        self.shared.build_id
    }

    /// Checks the collected diagnostics and assembles the program.
    ///
    /// Any diagnostic fails the whole pass; no module is produced.
    pub fn finalize(&mut self) -> Result<CompiledProgram> {
        self.shared.phase = BuildPhase::Finalizing;
        if let Err(err) = self.shared.emit_errors() {
            self.shared.phase = BuildPhase::Failed;
            warn!(build_id = self.shared.build_id, "node graph build failed");
            return Err(err);
        }

        let mut defines: Vec<String> = Vec::new();
        for d in self.vertex.defines.iter().chain(&self.fragment.defines) {
            if !defines.contains(&d.name) {
                defines.push(d.name.clone());
            }
        }
        let program = CompiledProgram {
            build_id: self.shared.build_id,
            vertex: wgsl::vertex_module(&self.vertex, &self.fragment),
            fragment: wgsl::fragment_module(&self.vertex, &self.fragment),
            uniforms: self.fragment.uniforms.iter().map(|u| u.name.clone()).collect(),
            attributes: self.vertex.attributes.iter().map(|a| a.name.clone()).collect(),
            samplers: wgsl::sampler_table(&self.vertex, &self.fragment)
                .into_iter()
                .map(|s| s.texture)
                .collect(),
            defines,
            varyings: self.vertex.varyings.iter().map(|v| v.name.clone()).collect(),
            input_blocks: self.shared.input_blocks.clone(),
            animated_inputs: self.shared.animated_inputs.clone(),
            texture_blocks: self.shared.texture_blocks.clone(),
            bindable_blocks: self.shared.bindable_blocks.clone(),
            blocks_with_defines: self.shared.blocks_with_defines.clone(),
        };
        self.shared.phase = BuildPhase::Ready;
        info!(
            build_id = program.build_id,
            vertex_bytes = program.vertex.len(),
            fragment_bytes = program.fragment.len(),
            uniforms = program.uniforms.len(),
            varyings = program.varyings.len(),
            "node graph compiled"
        );
        Ok(program)
    }
}

/// Builds both stages of `graph` and returns the pass for inspection.
///
/// Only structural errors (a dangling block reference) fail here; graph
/// problems are recorded and surface from [`BuildPass::finalize`].
pub fn build_graph(graph: &mut NodeGraph, config: &BuildConfig) -> Result<BuildPass> {
    let build_id = graph.next_build_id();
    let roots = graph.output_blocks();
    info!(
        build_id,
        graph = %graph.name,
        blocks = graph.len(),
        roots = roots.len(),
        "building node graph"
    );

    let mut builder = Builder {
        graph,
        vertex: BuildState::new(Stage::Vertex),
        fragment: BuildState::new(Stage::Fragment),
        shared: SharedData::new(build_id, config),
        vertex_blocks: Vec::new(),
        fragment_blocks: Vec::new(),
        dual_blocks: Vec::new(),
    };
    builder.initialize(&roots)?;

    builder.shared.phase = BuildPhase::Building(Stage::Vertex);
    for &root in &roots {
        if builder.graph.block(root)?.target.includes(Stage::Vertex) {
            builder.build_block(root, Stage::Vertex)?;
        }
    }
    // Vertex-only blocks first reached from the fragment side still belong to
    // the vertex stage; the fragment stage then reads them through varyings.
    for id in builder.vertex_blocks.clone() {
        if builder.graph.block(id)?.target == Target::Vertex {
            builder.build_block(id, Stage::Vertex)?;
        }
    }
    debug!(stage = Stage::Vertex.label(), "stage built");

    builder.shared.phase = BuildPhase::Building(Stage::Fragment);
    builder.fragment.inherit_shared_declarations(&builder.vertex);
    builder.reset_dual_blocks()?;
    for &root in &roots {
        if builder.graph.block(root)?.target.includes(Stage::Fragment) {
            builder.build_block(root, Stage::Fragment)?;
        }
    }
    debug!(stage = Stage::Fragment.label(), "stage built");

    Ok(BuildPass {
        vertex: builder.vertex,
        fragment: builder.fragment,
        shared: builder.shared,
    })
}

/// Builds and finalizes in one go.
pub fn compile(graph: &mut NodeGraph, config: &BuildConfig) -> Result<CompiledProgram> {
    build_graph(graph, config)?.finalize()
}

fn other_stage(stage: Stage) -> Stage {
    match stage {
        Stage::Vertex => Stage::Fragment,
        Stage::Fragment => Stage::Vertex,
    }
}

struct Builder<'g> {
    graph: &'g mut NodeGraph,
    vertex: BuildState,
    fragment: BuildState,
    shared: SharedData,
    /// Blocks forward recursion may build into each stage.
    vertex_blocks: Vec<BlockId>,
    fragment_blocks: Vec<BlockId>,
    /// `VertexAndFragment` blocks the fragment stage reaches; they are
    /// emitted once per stage.
    dual_blocks: Vec<BlockId>,
}

impl Builder<'_> {
    fn active(&self, stage: Stage) -> &[BlockId] {
        match stage {
            Stage::Vertex => &self.vertex_blocks,
            Stage::Fragment => &self.fragment_blocks,
        }
    }

    fn activate(&mut self, stage: Stage, id: BlockId) {
        let list = match stage {
            Stage::Vertex => &mut self.vertex_blocks,
            Stage::Fragment => &mut self.fragment_blocks,
        };
        SharedData::register(list, id);
    }

    /// Lets the fragment stage emit its own copy of every dual-stage block
    /// the vertex stage already built. Output variable names are kept.
    fn reset_dual_blocks(&mut self) -> Result<()> {
        for id in self.dual_blocks.clone() {
            let block = self.graph.block_mut(id)?;
            if block.build_target == Some(Stage::Vertex) {
                block.build_id = None;
                block.build_target = None;
            }
        }
        Ok(())
    }

    /// Resets the variables of every block reachable from the roots and
    /// collects the blocks each stage must also consider.
    fn initialize(&mut self, roots: &[BlockId]) -> Result<()> {
        for stage in [Stage::Vertex, Stage::Fragment] {
            let mut visited = HashSet::new();
            for &root in roots {
                if !self.graph.block(root)?.target.includes(stage) {
                    continue;
                }
                self.activate(stage, root);
                self.initialize_block(root, stage, &mut visited)?;
            }
        }
        Ok(())
    }

    fn initialize_block(
        &mut self,
        id: BlockId,
        stage: Stage,
        visited: &mut HashSet<BlockId>,
    ) -> Result<()> {
        if !visited.insert(id) {
            return Ok(());
        }
        let build_id = self.shared.build_id;
        let block = self.graph.block_mut(id)?;
        let dual = stage == Stage::Fragment && block.target == Target::VertexAndFragment;
        // Vertex blocks first reached from the fragment side are still
        // emitted into the vertex stage when one of their inputs gets built.
        let other = match (block.target, stage) {
            (Target::VertexAndFragment, _) => Some(other_stage(stage)),
            (Target::Vertex, Stage::Fragment) if block.preparation_id != Some(build_id) => {
                Some(Stage::Vertex)
            }
            _ => None,
        };
        block.preparation_id = Some(build_id);
        for point in block.inputs.iter_mut().chain(block.outputs.iter_mut()) {
            point.reset_build_state();
        }
        let sources: Vec<BlockId> = block
            .inputs
            .iter()
            .filter_map(|p| p.connected)
            .map(|source| source.block)
            .filter(|source| *source != id)
            .collect();

        if let Some(other) = other {
            self.activate(other, id);
        }
        if dual {
            SharedData::register(&mut self.dual_blocks, id);
        }
        for source in sources {
            self.initialize_block(source, stage, visited)?;
        }
        Ok(())
    }

    /// Emits `id` into `stage` after its dependencies, at most once per pass.
    fn build_block(&mut self, id: BlockId, stage: Stage) -> Result<()> {
        let build_id = self.shared.build_id;
        let block = self.graph.block(id)?;
        if block.build_id == Some(build_id) {
            return Ok(());
        }
        let is_input = block.is_input();
        let block_target = block.target;
        let block_name = block.name.clone();
        let class_name = block.class_name();

        if !is_input {
            let unnamed: Vec<(usize, String)> = block
                .outputs
                .iter()
                .enumerate()
                .filter(|(_, p)| p.associated_variable.is_none())
                .map(|(i, p)| (i, p.name.clone()))
                .collect();
            for (index, name) in unnamed {
                let var = self.shared.free_variable_name(&name);
                self.graph.block_mut(id)?.outputs[index].associated_variable = Some(var);
            }
        }

        let inputs: Vec<(usize, String, bool, Target, Option<BlockId>)> = self
            .graph
            .block(id)?
            .inputs
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.name.clone(), p.optional, p.target, p.connected.map(|c| c.block)))
            .collect();
        for (index, name, optional, input_target, source) in inputs {
            let Some(source) = source else {
                if !optional {
                    self.shared.checks.record_missing_input(MissingInput {
                        block: id,
                        block_name: block_name.clone(),
                        class_name: class_name.to_string(),
                        input: name,
                    });
                }
                continue;
            };
            if block_target != Target::Neutral
                && (!input_target.intersects(block_target) || !input_target.includes(stage))
            {
                continue;
            }
            if source != id {
                self.process_build(source, InputRef { block: id, index }, stage)?;
            }
        }

        // Forward recursion from an input may already have built this block.
        if self.graph.block(id)?.build_id == Some(build_id) {
            return Ok(());
        }

        if self.shared.verbose {
            info!(block = %block_name, class = class_name, stage = stage.label(), "building block");
        } else {
            debug!(block = %block_name, class = class_name, stage = stage.label(), "building block");
        }

        let mut io = self.block_io(id)?;
        let kind = self.graph.block(id)?.kind.clone();
        {
            let (state, vertex_state) = match stage {
                Stage::Vertex => (&mut self.vertex, None),
                Stage::Fragment => (&mut self.fragment, Some(&mut self.vertex)),
            };
            if !is_input && self.shared.emit_comments {
                state.emit_comment(&block_name);
            }
            let mut ctx = EmitContext {
                block: id,
                block_name: &block_name,
                class_name,
                stage,
                state,
                vertex_state,
                shared: &mut self.shared,
            };
            kind.build_code(&mut io, &mut ctx)?;
        }

        if kind.is_final_merger() {
            match stage {
                Stage::Vertex => self.shared.checks.emit_vertex = true,
                Stage::Fragment => self.shared.checks.emit_fragment = true,
            }
        }

        let block = self.graph.block_mut(id)?;
        for (point, slot) in block.outputs.iter_mut().zip(io.outputs) {
            if !slot.variable.is_empty() {
                point.associated_variable = Some(slot.variable);
            }
        }
        block.build_id = Some(build_id);
        block.build_target = Some(stage);

        let consumers: Vec<BlockId> = block
            .outputs
            .iter()
            .filter(|o| o.target.includes(stage))
            .flat_map(|o| o.endpoints.iter().map(|e| e.block))
            .filter(|consumer| *consumer != id)
            .collect();
        for consumer in consumers {
            if self.active(stage).contains(&consumer)
                && self.graph.block(consumer)?.target.includes(stage)
            {
                self.build_block(consumer, stage)?;
            }
        }
        Ok(())
    }

    /// Builds the source of `input` and, in the fragment stage, reroutes the
    /// input through a varying when the value lives in the vertex stage.
    ///
    /// Uniforms and constants are visible to both modules and are read
    /// directly; attributes and values computed by the vertex stage cross.
    fn process_build(&mut self, source: BlockId, input: InputRef, stage: Stage) -> Result<()> {
        self.build_block(source, stage)?;
        if stage != Stage::Fragment {
            return Ok(());
        }

        let producer = self.graph.block(source)?;
        let Some(built_in) = producer.build_target else {
            return Ok(());
        };
        let needs_varying =
            (!producer.is_input() && built_in != stage) || producer.kind.is_attribute_input();
        if !needs_varying {
            return Ok(());
        }
        let point = self.graph.input(input)?;

        let Some(from) = point.connected else {
            return Ok(());
        };
        let Some(variable) = self.graph.output(from)?.associated_variable.clone() else {
            return Ok(());
        };
        let ty = self.graph.effective_output_type(from);
        if ty == ValueType::Matrix {
            let message = format!(
                "block {}[{}]: matrix value {variable} can not be passed from the vertex to the fragment stage",
                producer.name,
                producer.class_name()
            );
            self.shared.checks.record_error(message);
            return Ok(());
        }

        let (varying, declared) = self.vertex.emit_varying(&variable, ty, &mut self.shared);
        if declared {
            debug!(%variable, %varying, "passing value to the fragment stage");
            self.vertex
                .emit_statement(&format!("vout.{varying} = {variable};"));
        }
        let point = self.graph.input_mut(input)?;
        point.associated_variable = Some(varying);
        point.enforce_associated_variable = true;
        Ok(())
    }

    /// Resolved names and types of the block's sockets.
    fn block_io(&self, id: BlockId) -> Result<BlockIo> {
        let block = self.graph.block(id)?;
        let inputs = block
            .inputs
            .iter()
            .enumerate()
            .map(|(index, point)| {
                let r = InputRef { block: id, index };
                let ty = match point.connected {
                    Some(source) => self.graph.effective_output_type(source),
                    None => self.graph.effective_input_type(r),
                };
                InputSlot {
                    name: point.name.clone(),
                    variable: self.graph.input_variable(r),
                    ty,
                }
            })
            .collect();
        let outputs = block
            .outputs
            .iter()
            .enumerate()
            .map(|(index, point)| OutputSlot {
                name: point.name.clone(),
                variable: point.associated_variable.clone().unwrap_or_default(),
                ty: self.graph.effective_output_type(OutputRef { block: id, index }),
                has_endpoints: point.has_endpoints(),
            })
            .collect();
        Ok(BlockIo { inputs, outputs })
    }
}
