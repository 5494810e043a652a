//! A node of the shader graph: identity, target, ordered sockets, build cache.

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Map, Value, json};

use crate::{
    blocks::BlockKind,
    compiler::types::{Stage, Target, ValueType},
};

use super::{BlockId, NodeGraph, connection_point::ConnectionPoint};

#[derive(Clone, Debug)]
pub struct Block {
    pub(crate) id: BlockId,
    pub name: String,
    pub(crate) kind: BlockKind,
    pub(crate) target: Target,
    pub(crate) inputs: Vec<ConnectionPoint>,
    pub(crate) outputs: Vec<ConnectionPoint>,
    /// Build id of the last pass that emitted this block.
    pub(crate) build_id: Option<u64>,
    /// Stage this block was emitted into during that pass.
    pub(crate) build_target: Option<Stage>,
    /// Build id of the last pass whose initialization walk reached this block.
    pub(crate) preparation_id: Option<u64>,
}

impl Block {
    pub fn new(id: BlockId, name: impl Into<String>, kind: BlockKind) -> Self {
        let mut block = Self {
            id,
            name: name.into(),
            target: kind.default_target(),
            kind: kind.clone(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            build_id: None,
            build_target: None,
            preparation_id: None,
        };
        kind.register_points(&mut block);
        block
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Overrides the block's stage affinity. Attribute inputs stay pinned to
    /// the vertex stage.
    pub fn set_target(&mut self, target: Target) {
        self.target = if self.kind.is_attribute_input() {
            Target::Vertex
        } else {
            target
        };
    }

    pub fn is_input(&self) -> bool {
        matches!(self.kind, BlockKind::Input(_))
    }

    pub fn is_final_merger(&self) -> bool {
        self.kind.is_final_merger()
    }

    pub fn inputs(&self) -> &[ConnectionPoint] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ConnectionPoint] {
        &self.outputs
    }

    /// Appends an input socket. Declaration order drives default wiring.
    pub fn register_input(&mut self, name: &str, ty: ValueType, optional: bool) -> usize {
        self.register_input_point(ConnectionPoint::input(name, ty, optional))
    }

    pub fn register_input_point(&mut self, point: ConnectionPoint) -> usize {
        self.inputs.push(point);
        self.inputs.len() - 1
    }

    /// Appends an output socket.
    pub fn register_output(&mut self, name: &str, ty: ValueType) -> usize {
        self.register_output_point(ConnectionPoint::output(name, ty))
    }

    pub fn register_output_point(&mut self, point: ConnectionPoint) -> usize {
        self.outputs.push(point);
        self.outputs.len() - 1
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.name == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.name == name)
    }

    fn is_wired(&self) -> bool {
        self.inputs.iter().any(|p| p.is_connected()) || self.outputs.iter().any(|p| p.is_connected())
    }

    /// Serializes the block to `{customType, id, name, target, inputs, outputs, ..fields}`.
    ///
    /// The graph is needed to name the output each input is wired to.
    pub fn serialize(&self, graph: &NodeGraph) -> Result<Value> {
        let mut obj = Map::new();
        obj.insert("customType".to_string(), json!(self.class_name()));
        obj.insert("id".to_string(), json!(self.id.0));
        obj.insert("name".to_string(), json!(self.name));
        obj.insert("target".to_string(), serde_json::to_value(self.target)?);

        let mut inputs = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let mut entry = Map::new();
            entry.insert("name".to_string(), json!(input.name));
            if let Some(source) = input.connected {
                let source_point = graph.output(source)?;
                entry.insert("targetBlockId".to_string(), json!(source.block.0));
                entry.insert("targetConnectionName".to_string(), json!(source_point.name));
            }
            inputs.push(Value::Object(entry));
        }
        obj.insert("inputs".to_string(), Value::Array(inputs));

        let outputs: Vec<Value> = self
            .outputs
            .iter()
            .map(|o| json!({ "name": o.name }))
            .collect();
        obj.insert("outputs".to_string(), Value::Array(outputs));

        for (k, v) in self.kind.fields()? {
            obj.insert(k, v);
        }
        Ok(Value::Object(obj))
    }

    /// Restores id, name, target and block-specific fields from `value`.
    ///
    /// Sockets are re-registered from the restored configuration, so this
    /// only works on a block that is not wired yet. Connections are restored
    /// by the graph loader.
    pub fn deserialize(&mut self, value: &Value) -> Result<()> {
        if self.is_wired() {
            bail!("cannot deserialize into connected block {}", self.name);
        }
        let obj = value
            .as_object()
            .ok_or_else(|| anyhow!("serialized block must be a JSON object"))?;

        let custom_type = obj.get("customType").and_then(Value::as_str).unwrap_or("");
        if custom_type != self.class_name() {
            bail!(
                "serialized block has customType {custom_type:?}, expected {}",
                self.class_name()
            );
        }
        if let Some(id) = obj.get("id").and_then(Value::as_u64) {
            self.id = BlockId(u32::try_from(id).context("block id out of range")?);
        }
        if let Some(name) = obj.get("name").and_then(Value::as_str) {
            self.name = name.to_string();
        }

        self.kind = self
            .kind
            .with_fields(obj)
            .with_context(|| format!("invalid fields for {}", self.class_name()))?;
        self.inputs.clear();
        self.outputs.clear();
        let kind = self.kind.clone();
        kind.register_points(self);

        let target = match obj.get("target") {
            Some(t) => serde_json::from_value(t.clone()).context("invalid block target")?,
            None => self.kind.default_target(),
        };
        self.set_target(target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{MathBlock, MathOp};

    #[test]
    fn registration_order_is_preserved() {
        let mut block = Block::new(BlockId(0), "custom", BlockKind::Reroute);
        let extra = block.register_input("extra", ValueType::Float, true);
        assert_eq!(extra, 1);
        assert_eq!(block.input_index("input"), Some(0));
        assert_eq!(block.input_index("extra"), Some(1));
        assert_eq!(block.output_index("output"), Some(0));
    }

    #[test]
    fn deserialize_rejects_other_block_types() {
        let graph = NodeGraph::new();
        let math = Block::new(BlockId(3), "m", BlockKind::Math(MathBlock { op: MathOp::Add }));
        let json = math.serialize(&graph).unwrap();

        let mut reroute = Block::new(BlockId(0), "r", BlockKind::Reroute);
        let err = reroute.deserialize(&json).unwrap_err();
        assert!(format!("{err}").contains("MathBlock"));
    }
}
