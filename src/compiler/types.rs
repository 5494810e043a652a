//! Core type definitions shared by the graph and the compiler.

use serde::{Deserialize, Serialize};

/// Value type carried by a connection point.
///
/// `AutoDetect` and `BasedOnInput` are wildcards: their effective type is
/// resolved from whatever the point is wired to (see `NodeGraph::effective_output_type`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    Float,
    Int,
    Vector2,
    Vector3,
    Vector4,
    Color3,
    Color4,
    Matrix,
    AutoDetect,
    BasedOnInput,
}

impl ValueType {
    /// Returns the WGSL type name for this value type.
    ///
    /// Wildcards that were never resolved fall back to `f32`.
    pub fn wgsl(self) -> &'static str {
        match self {
            ValueType::Float => "f32",
            ValueType::Int => "i32",
            ValueType::Vector2 => "vec2f",
            ValueType::Vector3 | ValueType::Color3 => "vec3f",
            ValueType::Vector4 | ValueType::Color4 => "vec4f",
            ValueType::Matrix => "mat4x4f",
            ValueType::AutoDetect | ValueType::BasedOnInput => "f32",
        }
    }

    /// Float vectors (and colors) accept a scalar `f32` operand.
    pub fn is_float_vector(self) -> bool {
        matches!(
            self,
            ValueType::Vector2
                | ValueType::Vector3
                | ValueType::Vector4
                | ValueType::Color3
                | ValueType::Color4
        )
    }

    pub fn is_wildcard(self) -> bool {
        matches!(self, ValueType::AutoDetect | ValueType::BasedOnInput)
    }

    /// Number of scalar components (16 for matrices).
    pub fn components(self) -> usize {
        match self {
            ValueType::Float | ValueType::Int => 1,
            ValueType::Vector2 => 2,
            ValueType::Vector3 | ValueType::Color3 => 3,
            ValueType::Vector4 | ValueType::Color4 => 4,
            ValueType::Matrix => 16,
            ValueType::AutoDetect | ValueType::BasedOnInput => 1,
        }
    }

    /// Vector3/Color3 and Vector4/Color4 share a WGSL representation and are
    /// freely interchangeable.
    pub fn is_equivalent(self, other: ValueType) -> bool {
        self == other || (self.wgsl() == other.wgsl() && !self.is_wildcard() && !other.is_wildcard())
    }

    /// WGSL literal for the zero value of this type.
    pub fn zero_literal(self) -> String {
        match self {
            ValueType::Int => "0".to_string(),
            ValueType::Matrix => "mat4x4f()".to_string(),
            ValueType::Float | ValueType::AutoDetect | ValueType::BasedOnInput => "0.0".to_string(),
            other => format!("{}(0.0)", other.wgsl()),
        }
    }
}

/// Which shader program(s) a block or connection point belongs to.
///
/// Behaves like a small bit set: `Vertex = 1`, `Fragment = 2`,
/// `VertexAndFragment = 3`, `Neutral = 4`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Target {
    Vertex,
    Fragment,
    VertexAndFragment,
    Neutral,
}

impl Target {
    pub fn bits(self) -> u8 {
        match self {
            Target::Vertex => 1,
            Target::Fragment => 2,
            Target::VertexAndFragment => 3,
            Target::Neutral => 4,
        }
    }

    pub fn intersects(self, other: Target) -> bool {
        self.bits() & other.bits() != 0
    }

    pub fn includes(self, stage: Stage) -> bool {
        self.intersects(stage.target())
    }
}

/// A concrete shader stage being compiled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    pub fn target(self) -> Target {
        match self {
            Stage::Vertex => Target::Vertex,
            Stage::Fragment => Target::Fragment,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex",
            Stage::Fragment => "fragment",
        }
    }
}

/// Direction of a connection point relative to its owning block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// Result of checking whether an output may feed an input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompatibilityState {
    Compatible,
    TypeIncompatible,
    TargetIncompatible,
    HierarchyIssue,
}

impl CompatibilityState {
    pub fn describe(self) -> &'static str {
        match self {
            CompatibilityState::Compatible => "compatible",
            CompatibilityState::TypeIncompatible => "incompatible connection types",
            CompatibilityState::TargetIncompatible => {
                "a fragment-only block can not feed a block built in the vertex stage"
            }
            CompatibilityState::HierarchyIssue => "connection would create a cycle",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_and_vector_types_are_equivalent() {
        assert!(ValueType::Color3.is_equivalent(ValueType::Vector3));
        assert!(ValueType::Vector4.is_equivalent(ValueType::Color4));
        assert!(!ValueType::Vector3.is_equivalent(ValueType::Vector4));
        assert!(!ValueType::Float.is_equivalent(ValueType::AutoDetect));
    }

    #[test]
    fn targets_behave_like_bit_sets() {
        assert!(Target::VertexAndFragment.includes(Stage::Vertex));
        assert!(Target::VertexAndFragment.includes(Stage::Fragment));
        assert!(!Target::Neutral.includes(Stage::Fragment));
        assert!(!Target::Vertex.intersects(Target::Fragment));
    }

    #[test]
    fn zero_literals_match_wgsl_types() {
        assert_eq!(ValueType::Float.zero_literal(), "0.0");
        assert_eq!(ValueType::Int.zero_literal(), "0");
        assert_eq!(ValueType::Color3.zero_literal(), "vec3f(0.0)");
    }
}
