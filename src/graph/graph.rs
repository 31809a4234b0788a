//! Insertion-ordered graph store
//!
//! The graph owns its nodes in an `IndexMap`, so iteration order is exactly
//! construction order. Callers append nodes in a valid topological order;
//! `validate` checks that contract.

use indexmap::IndexMap;

use crate::error::{FuseError, FuseResult};

use super::node::{collect_node_refs, Arg, Node, Op};

/// Directed computation graph with ordered node storage
///
/// Node insertion order doubles as the traversal order for the fuse pass,
/// so it must be a topological order of the dependency edges.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: IndexMap<String, Node>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node
    ///
    /// Fails if a node with the same name already exists.
    pub fn add(&mut self, node: Node) -> FuseResult<Arg> {
        if self.nodes.contains_key(&node.name) {
            return Err(FuseError::DuplicateNode(node.name));
        }
        let reference = Arg::Node(node.name.clone());
        self.nodes.insert(node.name.clone(), node);
        Ok(reference)
    }

    /// Get a node by name
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Check if a node exists
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over nodes in insertion (topological) order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate over nodes in reverse insertion order
    pub fn nodes_reversed(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().rev()
    }

    /// Iterate over node names in insertion order
    pub fn node_names(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    // ========================================================================
    // Builder conveniences
    // ========================================================================

    /// Append a graph input placeholder
    pub fn input(&mut self, name: &str) -> FuseResult<Arg> {
        self.add(Node::new(name, Op::Input, []))
    }

    /// Append a submodule call
    pub fn call_module(
        &mut self,
        name: &str,
        path: &str,
        args: impl IntoIterator<Item = Arg>,
    ) -> FuseResult<Arg> {
        self.add(Node::new(name, Op::CallModule(path.to_string()), args))
    }

    /// Append a function call
    pub fn call_function(
        &mut self,
        name: &str,
        function: &str,
        args: impl IntoIterator<Item = Arg>,
    ) -> FuseResult<Arg> {
        self.add(Node::new(name, Op::CallFunction(function.to_string()), args))
    }

    /// Append a graph output node
    pub fn output(&mut self, name: &str, args: impl IntoIterator<Item = Arg>) -> FuseResult<Arg> {
        self.add(Node::new(name, Op::Output, args))
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check that every argument reference points at an earlier node
    ///
    /// Catches both references to absent nodes and forward references that
    /// would break the topological-order contract.
    pub fn validate(&self) -> FuseResult<()> {
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();

        for node in self.nodes() {
            for arg in &node.args {
                let mut refs = Vec::new();
                collect_node_refs(arg, &mut refs);
                for name in refs {
                    if !seen.contains(name) {
                        return Err(FuseError::ValidationFailed(format!(
                            "node '{}' references '{}' before it is defined",
                            node.name, name
                        )));
                    }
                }
            }
            seen.insert(node.name.as_str());
        }

        Ok(())
    }
}
