//! Typed input/output sockets owned by a block.

use crate::compiler::types::{Direction, Target, ValueType};

use super::BlockId;

/// Reference to an output socket: owning block + index into its output list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputRef {
    pub block: BlockId,
    pub index: usize,
}

/// Reference to an input socket: owning block + index into its input list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputRef {
    pub block: BlockId,
    pub index: usize,
}

/// A typed socket on a block.
///
/// Inputs hold at most one `connected` output; outputs hold any number of
/// `endpoints`. Both relations are plain references into the owning
/// `NodeGraph`, which alone controls block lifetime.
#[derive(Clone, Debug)]
pub struct ConnectionPoint {
    pub name: String,
    pub direction: Direction,
    /// Declared type; may be a wildcard.
    pub declared_type: ValueType,
    pub optional: bool,
    pub target: Target,
    /// Types accepted on top of the declared one (inputs only).
    pub accepted_types: Vec<ValueType>,
    /// Types rejected even though the declared type is a wildcard (inputs only).
    pub excluded_types: Vec<ValueType>,
    /// Sibling input whose resolved type this input must agree with.
    pub linked_input: Option<usize>,
    /// Inputs whose resolved type a `BasedOnInput` output mirrors. The first
    /// non-scalar source wins, so `float * vec3` resolves to `vec3`.
    pub type_sources: Vec<usize>,
    /// Type used when a wildcard can not be resolved from any connection.
    pub default_type: ValueType,
    pub(crate) connected: Option<OutputRef>,
    pub(crate) endpoints: Vec<InputRef>,
    pub(crate) associated_variable: Option<String>,
    /// Set when the builder rewrote an input to read a varying instead of
    /// the connected output's variable.
    pub(crate) enforce_associated_variable: bool,
}

impl ConnectionPoint {
    pub fn input(name: &str, ty: ValueType, optional: bool) -> Self {
        Self::new(name, Direction::Input, ty, optional)
    }

    pub fn output(name: &str, ty: ValueType) -> Self {
        Self::new(name, Direction::Output, ty, false)
    }

    fn new(name: &str, direction: Direction, ty: ValueType, optional: bool) -> Self {
        Self {
            name: name.to_string(),
            direction,
            declared_type: ty,
            optional,
            target: Target::VertexAndFragment,
            accepted_types: Vec::new(),
            excluded_types: Vec::new(),
            linked_input: None,
            type_sources: Vec::new(),
            default_type: ValueType::Float,
            connected: None,
            endpoints: Vec::new(),
            associated_variable: None,
            enforce_associated_variable: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        match self.direction {
            Direction::Input => self.connected.is_some(),
            Direction::Output => !self.endpoints.is_empty(),
        }
    }

    pub fn has_endpoints(&self) -> bool {
        !self.endpoints.is_empty()
    }

    pub fn connected_point(&self) -> Option<OutputRef> {
        self.connected
    }

    pub fn endpoints(&self) -> &[InputRef] {
        &self.endpoints
    }

    pub fn associated_variable(&self) -> Option<&str> {
        self.associated_variable.as_deref()
    }

    /// Whether this (input) socket accepts a value of `ty` on top of its
    /// declared type.
    pub fn accepts(&self, ty: ValueType) -> bool {
        self.accepted_types.iter().any(|t| t.is_equivalent(ty))
    }

    pub(crate) fn reset_build_state(&mut self) {
        self.associated_variable = None;
        self.enforce_associated_variable = false;
    }
}
