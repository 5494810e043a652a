//! Node-based shader graph compiler.
//!
//! A [`graph::NodeGraph`] of typed blocks is compiled into a vertex and a
//! fragment WGSL module by [`compiler::compile`]. Graphs persist as JSON via
//! [`dsl`].

pub mod blocks;
pub mod compiler;
pub mod config;
pub mod dsl;
pub mod graph;

pub use compiler::{BuildPass, CompiledProgram, build_graph, compile};
pub use config::BuildConfig;
pub use dsl::BlockRegistry;
pub use graph::{BlockId, NodeGraph};
