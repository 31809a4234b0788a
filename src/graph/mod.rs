//! Computation-graph IR for graphfuse
//!
//! This module provides the graph layer the fusion engine operates on:
//!
//! - [`Node`]: one operation: name, target, ordered argument references
//! - [`Graph`]: insertion-ordered node store; insertion order is the
//!   traversal order of the fuse pass and must be topological
//! - [`GraphModule`]: graph container with named submodules and attributes
//!
//! # Example
//!
//! ```ignore
//! use graphfuse::graph::{Graph, GraphModule, ModuleInfo};
//!
//! let mut g = Graph::new();
//! let x = g.input("x")?;
//! let conv = g.call_module("conv_0", "conv", [x])?;
//! g.output("out", [conv])?;
//!
//! let mut gm = GraphModule::new(g);
//! gm.add_module("conv", ModuleInfo::new("Conv2d"));
//! ```

#[allow(clippy::module_inception)]
mod graph;
mod module;
mod node;

// Re-export main types
pub use graph::Graph;
pub use module::{GraphModule, ModuleInfo, ModuleTable};
pub use node::{collect_node_refs, Arg, ArgList, Node, Op};
