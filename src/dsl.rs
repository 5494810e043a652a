//! Graph persistence: the block type registry and the `NodeGraph` JSON
//! document.
//!
//! ```json
//! { "customType": "NodeGraph", "name": "...", "blocks": [...], "outputNodes": [3, 7] }
//! ```
//!
//! Blocks serialize as `{customType, id, name, target, inputs, outputs, ..fields}`
//! where each input may carry `targetBlockId`/`targetConnectionName` naming
//! the output it is wired to.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    blocks::{
        BlockKind, FragmentOutputBlock, InputBlock, MathBlock, TextureBlock, TransformBlock,
        TrigonometryBlock,
    },
    graph::{Block, BlockId, InputRef, NodeGraph},
};

pub const GRAPH_CUSTOM_TYPE: &str = "NodeGraph";

pub type BlockConstructor = fn() -> BlockKind;

/// Maps serialized `customType` names to block constructors.
#[derive(Clone, Debug, Default)]
pub struct BlockRegistry {
    constructors: HashMap<String, BlockConstructor>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing every built-in block kind.
    pub fn with_builtin_blocks() -> Self {
        let mut registry = Self::new();
        let builtin: [BlockConstructor; 11] = [
            || BlockKind::Input(InputBlock::default()),
            || BlockKind::Math(MathBlock::default()),
            || BlockKind::Trigonometry(TrigonometryBlock::default()),
            || BlockKind::Lerp,
            || BlockKind::Transform(TransformBlock::default()),
            || BlockKind::VectorMerger,
            || BlockKind::VectorSplitter,
            || BlockKind::Reroute,
            || BlockKind::Texture(TextureBlock::default()),
            || BlockKind::VertexOutput,
            || BlockKind::FragmentOutput(FragmentOutputBlock::default()),
        ];
        for constructor in builtin {
            registry.register(constructor().class_name(), constructor);
        }
        registry
    }

    pub fn register(&mut self, custom_type: &str, constructor: BlockConstructor) {
        self.constructors.insert(custom_type.to_string(), constructor);
    }

    pub fn is_registered(&self, custom_type: &str) -> bool {
        self.constructors.contains_key(custom_type)
    }

    /// Default-configured block kind for `custom_type`.
    pub fn construct(&self, custom_type: &str) -> Option<BlockKind> {
        self.constructors.get(custom_type).map(|c| c())
    }
}

/// Rebuilds one block from its serialized form. Connections are not restored.
pub fn block_from_json(registry: &BlockRegistry, value: &Value) -> Result<Block> {
    let custom_type = value
        .get("customType")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("serialized block is missing customType"))?;
    let kind = registry
        .construct(custom_type)
        .ok_or_else(|| anyhow!("unknown block type: {custom_type}"))?;
    let mut block = Block::new(BlockId(0), "", kind);
    block.deserialize(value)?;
    Ok(block)
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphDocument {
    custom_type: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    blocks: Vec<Value>,
    #[serde(default)]
    output_nodes: Vec<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerializedInput {
    name: String,
    #[serde(default)]
    target_block_id: Option<u32>,
    #[serde(default)]
    target_connection_name: Option<String>,
}

impl NodeGraph {
    /// Serializes every block (in id order) and the output block list.
    pub fn serialize(&self) -> Result<Value> {
        let blocks = self
            .blocks()
            .map(|b| b.serialize(self))
            .collect::<Result<Vec<_>>>()?;
        let document = GraphDocument {
            custom_type: GRAPH_CUSTOM_TYPE.to_string(),
            name: self.name.clone(),
            blocks,
            output_nodes: self.registered_output_blocks().iter().map(|id| id.0).collect(),
        };
        Ok(serde_json::to_value(document)?)
    }

    /// Rebuilds a graph: blocks first, then every recorded connection.
    pub fn from_json(value: &Value, registry: &BlockRegistry) -> Result<NodeGraph> {
        let document: GraphDocument =
            serde_json::from_value(value.clone()).context("invalid node graph document")?;
        if document.custom_type != GRAPH_CUSTOM_TYPE {
            bail!(
                "expected customType {GRAPH_CUSTOM_TYPE}, got {:?}",
                document.custom_type
            );
        }

        let mut graph = NodeGraph::new();
        graph.name = document.name;
        for (i, serialized) in document.blocks.iter().enumerate() {
            let block = block_from_json(registry, serialized)
                .with_context(|| format!("failed to load block #{i}"))?;
            graph.insert_block(block)?;
        }

        for serialized in &document.blocks {
            let id = serialized
                .get("id")
                .and_then(Value::as_u64)
                .and_then(|id| u32::try_from(id).ok())
                .map(BlockId)
                .ok_or_else(|| anyhow!("serialized block has no valid id"))?;
            let inputs: Vec<SerializedInput> = match serialized.get("inputs") {
                Some(v) => serde_json::from_value(v.clone())
                    .with_context(|| format!("invalid inputs on block {id}"))?,
                None => Vec::new(),
            };
            for input in inputs {
                let (Some(target), Some(connection)) =
                    (input.target_block_id, input.target_connection_name.as_deref())
                else {
                    continue;
                };
                let Some(index) = graph.block(id)?.input_index(&input.name) else {
                    warn!(block = %id, input = %input.name, "ignoring connection on unknown input");
                    continue;
                };
                let from = graph
                    .output_ref(BlockId(target), connection)
                    .with_context(|| format!("block {id} input {} has a dangling source", input.name))?;
                let to = InputRef { block: id, index };
                graph
                    .connect(from, to)
                    .with_context(|| format!("failed to restore connection into block {id}"))?;
            }
        }

        for id in document.output_nodes {
            graph.add_output_block(BlockId(id))?;
        }
        debug!(graph = %graph.name, blocks = graph.len(), "node graph loaded");
        Ok(graph)
    }
}

pub fn graph_from_str(text: &str, registry: &BlockRegistry) -> Result<NodeGraph> {
    let value: Value = serde_json::from_str(text).context("failed to parse node graph json")?;
    NodeGraph::from_json(&value, registry)
}

pub fn load_graph_from_path(path: impl AsRef<Path>, registry: &BlockRegistry) -> Result<NodeGraph> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read node graph json at {}", path.display()))?;
    let mut graph = graph_from_str(&text, registry)
        .with_context(|| format!("failed to load node graph {}", path.display()))?;
    if graph.name.is_empty() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            graph.name = stem.to_string();
        }
    }
    Ok(graph)
}
