//! Shader graph arena: block ownership, wiring and type resolution.

pub mod block;
pub mod connection_point;

use std::collections::{BTreeMap, HashSet};

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    blocks::BlockKind,
    compiler::types::{CompatibilityState, Direction, Stage, Target, ValueType},
};

pub use block::Block;
pub use connection_point::{ConnectionPoint, InputRef, OutputRef};

/// Bound on transitive type resolution; graphs are acyclic so this only
/// guards against corrupted input.
const MAX_TYPE_RESOLUTION_DEPTH: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Explicit socket selection for [`NodeGraph::connect_blocks`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectOptions<'a> {
    pub output: Option<&'a str>,
    pub input: Option<&'a str>,
}

/// Owns every block of one shader graph.
///
/// Connection points reference each other through [`OutputRef`]/[`InputRef`]
/// indices into this arena; removing a block unwires it first.
#[derive(Clone, Debug, Default)]
pub struct NodeGraph {
    pub name: String,
    blocks: BTreeMap<BlockId, Block>,
    output_blocks: Vec<BlockId>,
    next_id: u32,
    build_counter: u64,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Creates a block of `kind` and returns its id.
    pub fn add_block(&mut self, name: impl Into<String>, kind: BlockKind) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        self.blocks.insert(id, Block::new(id, name, kind));
        id
    }

    /// Inserts an already constructed (unwired) block, keeping its id.
    pub fn insert_block(&mut self, block: Block) -> Result<BlockId> {
        let id = block.id;
        if self.blocks.contains_key(&id) {
            bail!("duplicate block id {id}");
        }
        if block.inputs.iter().any(|p| p.is_connected())
            || block.outputs.iter().any(|p| p.is_connected())
        {
            bail!("block {} must be inserted unwired", block.name);
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.blocks.insert(id, block);
        Ok(id)
    }

    /// Unwires and drops a block.
    pub fn remove_block(&mut self, id: BlockId) -> Result<Block> {
        let block = self.block(id)?;
        let wired_inputs: Vec<InputRef> = (0..block.inputs.len())
            .map(|index| InputRef { block: id, index })
            .filter(|r| block.inputs[r.index].is_connected())
            .collect();
        let endpoints: Vec<InputRef> = block
            .outputs
            .iter()
            .flat_map(|o| o.endpoints.iter().copied())
            .collect();
        for r in wired_inputs.into_iter().chain(endpoints) {
            self.disconnect(r)?;
        }
        self.output_blocks.retain(|b| *b != id);
        self.blocks
            .remove(&id)
            .ok_or_else(|| anyhow!("block not found: {id}"))
    }

    pub fn block(&self, id: BlockId) -> Result<&Block> {
        self.blocks
            .get(&id)
            .ok_or_else(|| anyhow!("block not found: {id}"))
    }

    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        self.blocks
            .get_mut(&id)
            .ok_or_else(|| anyhow!("block not found: {id}"))
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.keys().copied().collect()
    }

    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.blocks.values().find(|b| b.name == name).map(|b| b.id)
    }

    /// Marks a block as a compilation root (a vertex or fragment output).
    pub fn add_output_block(&mut self, id: BlockId) -> Result<()> {
        let block = self.block(id)?;
        if !block.is_final_merger() {
            bail!(
                "block {}[{}] does not produce a stage output",
                block.name,
                block.class_name()
            );
        }
        if !self.output_blocks.contains(&id) {
            self.output_blocks.push(id);
        }
        Ok(())
    }

    /// Compilation roots: the registered output blocks, or every final
    /// merger in id order when none were registered.
    pub fn output_blocks(&self) -> Vec<BlockId> {
        if !self.output_blocks.is_empty() {
            return self.output_blocks.clone();
        }
        self.blocks
            .values()
            .filter(|b| b.is_final_merger())
            .map(|b| b.id)
            .collect()
    }

    pub(crate) fn registered_output_blocks(&self) -> &[BlockId] {
        &self.output_blocks
    }

    pub(crate) fn next_build_id(&mut self) -> u64 {
        self.build_counter += 1;
        self.build_counter
    }

    pub fn output(&self, r: OutputRef) -> Result<&ConnectionPoint> {
        let block = self.block(r.block)?;
        block
            .outputs
            .get(r.index)
            .ok_or_else(|| anyhow!("block {} has no output #{}", block.name, r.index))
    }

    pub fn input(&self, r: InputRef) -> Result<&ConnectionPoint> {
        let block = self.block(r.block)?;
        block
            .inputs
            .get(r.index)
            .ok_or_else(|| anyhow!("block {} has no input #{}", block.name, r.index))
    }

    pub(crate) fn output_mut(&mut self, r: OutputRef) -> Result<&mut ConnectionPoint> {
        let block = self.block_mut(r.block)?;
        let name = block.name.clone();
        block
            .outputs
            .get_mut(r.index)
            .ok_or_else(|| anyhow!("block {name} has no output #{}", r.index))
    }

    pub(crate) fn input_mut(&mut self, r: InputRef) -> Result<&mut ConnectionPoint> {
        let block = self.block_mut(r.block)?;
        let name = block.name.clone();
        block
            .inputs
            .get_mut(r.index)
            .ok_or_else(|| anyhow!("block {name} has no input #{}", r.index))
    }

    pub fn output_ref(&self, block: BlockId, name: &str) -> Result<OutputRef> {
        let b = self.block(block)?;
        let index = b
            .output_index(name)
            .ok_or_else(|| anyhow!("block {}[{}] has no output named {name}", b.name, b.class_name()))?;
        Ok(OutputRef { block, index })
    }

    pub fn input_ref(&self, block: BlockId, name: &str) -> Result<InputRef> {
        let b = self.block(block)?;
        let index = b
            .input_index(name)
            .ok_or_else(|| anyhow!("block {}[{}] has no input named {name}", b.name, b.class_name()))?;
        Ok(InputRef { block, index })
    }

    fn describe_output(&self, r: OutputRef) -> String {
        match (self.block(r.block), self.output(r)) {
            (Ok(b), Ok(p)) => format!("{}.{}", b.name, p.name),
            _ => format!("{}:out{}", r.block, r.index),
        }
    }

    fn describe_input(&self, r: InputRef) -> String {
        match (self.block(r.block), self.input(r)) {
            (Ok(b), Ok(p)) => format!("{}.{}", b.name, p.name),
            _ => format!("{}:in{}", r.block, r.index),
        }
    }

    // ---------------------------------------------------------------------
    // Type resolution
    // ---------------------------------------------------------------------

    /// Concrete type of an output, if it can be determined from the wiring.
    pub fn resolved_output_type(&self, r: OutputRef) -> Option<ValueType> {
        self.resolve_output(r, 0)
    }

    /// Concrete type of an input, if it can be determined from the wiring.
    pub fn resolved_input_type(&self, r: InputRef) -> Option<ValueType> {
        self.resolve_input(r, 0)
    }

    /// Type used for code generation; unresolved wildcards use the point's default.
    pub fn effective_output_type(&self, r: OutputRef) -> ValueType {
        self.resolve_output(r, 0).unwrap_or_else(|| {
            self.output(r)
                .map(|p| p.default_type)
                .unwrap_or(ValueType::Float)
        })
    }

    pub fn effective_input_type(&self, r: InputRef) -> ValueType {
        self.resolve_input(r, 0).unwrap_or_else(|| {
            self.input(r)
                .map(|p| p.default_type)
                .unwrap_or(ValueType::Float)
        })
    }

    fn resolve_output(&self, r: OutputRef, depth: usize) -> Option<ValueType> {
        if depth > MAX_TYPE_RESOLUTION_DEPTH {
            return None;
        }
        let point = self.output(r).ok()?;
        if !point.declared_type.is_wildcard() {
            return Some(point.declared_type);
        }
        let resolved: Vec<ValueType> = point
            .type_sources
            .iter()
            .filter_map(|&index| self.resolve_input(InputRef { block: r.block, index }, depth + 1))
            .collect();
        resolved
            .iter()
            .copied()
            .find(|t| *t != ValueType::Float)
            .or_else(|| resolved.first().copied())
    }

    fn resolve_input(&self, r: InputRef, depth: usize) -> Option<ValueType> {
        if depth > MAX_TYPE_RESOLUTION_DEPTH {
            return None;
        }
        let point = self.input(r).ok()?;
        if !point.declared_type.is_wildcard() {
            return Some(point.declared_type);
        }
        if let Some(source) = point.connected {
            if let Some(t) = self.resolve_output(source, depth + 1) {
                return Some(t);
            }
        }
        None
    }

    /// Type an input is constrained to before considering its own connection:
    /// its declared type, or the resolved type of a connected linked sibling.
    fn expected_input_type(&self, r: InputRef) -> Option<ValueType> {
        let point = self.input(r).ok()?;
        if !point.declared_type.is_wildcard() {
            return Some(point.declared_type);
        }
        let linked = point.linked_input?;
        let sibling = InputRef { block: r.block, index: linked };
        if self.input(sibling).ok()?.connected.is_some() {
            self.resolve_input(sibling, 0)
        } else {
            None
        }
    }

    // ---------------------------------------------------------------------
    // Wiring
    // ---------------------------------------------------------------------

    /// Whether `consumer` transitively feeds `producer` (so wiring
    /// producer -> consumer would close a cycle).
    pub fn is_ancestor_of(&self, ancestor: BlockId, descendant: BlockId) -> bool {
        let mut visited: HashSet<BlockId> = HashSet::new();
        let mut stack = vec![ancestor];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Ok(block) = self.block(id) else {
                continue;
            };
            for output in &block.outputs {
                for endpoint in &output.endpoints {
                    if endpoint.block == descendant {
                        return true;
                    }
                    stack.push(endpoint.block);
                }
            }
        }
        false
    }

    /// Whether any value produced by `id` ends up in a block the vertex
    /// stage builds.
    fn feeds_vertex_stage(&self, id: BlockId) -> bool {
        let mut visited: HashSet<BlockId> = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Ok(block) = self.block(current) else {
                continue;
            };
            for output in &block.outputs {
                for endpoint in &output.endpoints {
                    let Ok(consumer) = self.block(endpoint.block) else {
                        continue;
                    };
                    if consumer.target.includes(Stage::Vertex) {
                        return true;
                    }
                    if consumer.target == Target::Neutral {
                        stack.push(consumer.id);
                    }
                }
            }
        }
        false
    }

    /// Checks whether `from` may feed `to`, ignoring whether `to` is
    /// already connected.
    pub fn compatibility(&self, from: OutputRef, to: InputRef) -> Result<CompatibilityState> {
        let producer = self.block(from.block)?;
        let consumer = self.block(to.block)?;
        let out_point = self.output(from)?;
        let in_point = self.input(to)?;
        debug_assert_eq!(out_point.direction, Direction::Output);
        debug_assert_eq!(in_point.direction, Direction::Input);

        if producer.target == Target::Fragment
            && (consumer.target.includes(Stage::Vertex) || self.feeds_vertex_stage(consumer.id))
        {
            return Ok(CompatibilityState::TargetIncompatible);
        }

        if let Some(out_ty) = self.resolved_output_type(from) {
            if in_point
                .excluded_types
                .iter()
                .any(|t| t.is_equivalent(out_ty))
            {
                return Ok(CompatibilityState::TypeIncompatible);
            }
            if let Some(in_ty) = self.expected_input_type(to) {
                let broadcast = in_point.declared_type.is_wildcard()
                    && in_point.linked_input.is_some()
                    && ((out_ty == ValueType::Float && in_ty.is_float_vector())
                        || (in_ty == ValueType::Float && out_ty.is_float_vector()));
                if !out_ty.is_equivalent(in_ty) && !in_point.accepts(out_ty) && !broadcast {
                    return Ok(CompatibilityState::TypeIncompatible);
                }
            }
        }

        if from.block == to.block || self.is_ancestor_of(consumer.id, producer.id) {
            return Ok(CompatibilityState::HierarchyIssue);
        }
        Ok(CompatibilityState::Compatible)
    }

    pub fn can_connect(&self, from: OutputRef, to: InputRef) -> bool {
        matches!(self.compatibility(from, to), Ok(CompatibilityState::Compatible))
    }

    /// Wires `from` into `to`.
    ///
    /// Fails without touching the graph when `to` is already connected or
    /// the two points are not compatible.
    pub fn connect(&mut self, from: OutputRef, to: InputRef) -> Result<()> {
        if let Some(existing) = self.input(to)?.connected {
            bail!(
                "cannot connect {} to {}: input is already connected to {}",
                self.describe_output(from),
                self.describe_input(to),
                self.describe_output(existing)
            );
        }
        self.connect_unchecked_target(from, to)
    }

    /// Like [`connect`](Self::connect) but replaces an existing connection.
    pub fn reconnect(&mut self, from: OutputRef, to: InputRef) -> Result<()> {
        let state = self.compatibility(from, to)?;
        if state != CompatibilityState::Compatible {
            bail!(
                "cannot connect {} to {}: {}",
                self.describe_output(from),
                self.describe_input(to),
                state.describe()
            );
        }
        if self.input(to)?.connected.is_some() {
            self.disconnect(to)?;
        }
        self.connect_unchecked_target(from, to)
    }

    fn connect_unchecked_target(&mut self, from: OutputRef, to: InputRef) -> Result<()> {
        let state = self.compatibility(from, to)?;
        if state != CompatibilityState::Compatible {
            bail!(
                "cannot connect {} to {}: {}",
                self.describe_output(from),
                self.describe_input(to),
                state.describe()
            );
        }
        debug!(
            from = %self.describe_output(from),
            to = %self.describe_input(to),
            "connect"
        );
        self.output_mut(from)?.endpoints.push(to);
        self.input_mut(to)?.connected = Some(from);
        Ok(())
    }

    /// Removes the connection feeding `to`, if any.
    pub fn disconnect(&mut self, to: InputRef) -> Result<()> {
        let Some(from) = self.input(to)?.connected else {
            return Ok(());
        };
        self.output_mut(from)?.endpoints.retain(|e| *e != to);
        self.input_mut(to)?.connected = None;
        Ok(())
    }

    /// First output of `block` usable by `for_block`, in declaration order.
    pub fn first_available_output(&self, block: BlockId, for_block: Option<BlockId>) -> Option<OutputRef> {
        let b = self.block(block).ok()?;
        let for_target = for_block.and_then(|id| self.block(id).ok()).map(|fb| fb.target);
        b.outputs
            .iter()
            .position(|o| match for_target {
                None | Some(Target::Neutral) => true,
                Some(t) => t.intersects(o.target),
            })
            .map(|index| OutputRef { block, index })
    }

    /// First unconnected input of `block` that can take `for_output`, in
    /// declaration order.
    pub fn first_available_input(&self, block: BlockId, for_output: Option<OutputRef>) -> Option<InputRef> {
        let b = self.block(block).ok()?;
        let out_ty = for_output.and_then(|o| self.resolved_output_type(o));
        (0..b.inputs.len())
            .map(|index| InputRef { block, index })
            .find(|r| {
                let point = &b.inputs[r.index];
                if point.connected.is_some() {
                    return false;
                }
                let Some(out_ty) = out_ty else {
                    return true;
                };
                match self.expected_input_type(*r) {
                    None => !point.excluded_types.iter().any(|t| t.is_equivalent(out_ty)),
                    Some(in_ty) => in_ty.is_equivalent(out_ty) || point.accepts(out_ty),
                }
            })
    }

    /// The output declared right after `current` on the same block.
    pub fn sibling_output(&self, current: OutputRef) -> Option<OutputRef> {
        let b = self.block(current.block).ok()?;
        let next = current.index + 1;
        (next < b.outputs.len()).then_some(OutputRef {
            block: current.block,
            index: next,
        })
    }

    /// Wires two blocks, picking sockets by name or by first availability.
    ///
    /// Without explicit names the first available output is tried against
    /// the first compatible free input; on failure the next sibling output
    /// is tried. Fails when no pairing exists anywhere on the block.
    pub fn connect_blocks(
        &mut self,
        from: BlockId,
        to: BlockId,
        options: ConnectOptions<'_>,
    ) -> Result<(OutputRef, InputRef)> {
        let from_block = self.block(from)?;
        if from_block.outputs.is_empty() {
            bail!("block {} has no outputs to connect", from_block.name);
        }
        self.block(to)?;

        let mut output = match options.output {
            Some(name) => Some(self.output_ref(from, name)?),
            None => self.first_available_output(from, Some(to)),
        };
        while let Some(out) = output {
            let input = match options.input {
                Some(name) => Some(self.input_ref(to, name)?),
                None => self.first_available_input(to, Some(out)),
            };
            if let Some(inp) = input {
                if self.input(inp)?.connected.is_none() && self.can_connect(out, inp) {
                    self.connect(out, inp)?;
                    return Ok((out, inp));
                }
            }
            if options.output.is_some() {
                break;
            }
            output = self.sibling_output(out);
        }
        bail!(
            "unable to find a compatible match between {} and {}",
            self.block(from)?.name,
            self.block(to)?.name
        )
    }

    /// Variable an input reads during code generation: a varying override,
    /// or the connected output's variable.
    pub(crate) fn input_variable(&self, r: InputRef) -> Option<String> {
        let point = self.input(r).ok()?;
        if point.enforce_associated_variable {
            return point.associated_variable.clone();
        }
        let source = point.connected?;
        self.output(source).ok()?.associated_variable.clone()
    }
}
