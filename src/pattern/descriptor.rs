//! Pattern descriptors
//!
//! A pattern describes the shape of a small connected subgraph: a leaf
//! predicate on one node, a wildcard that matches anything, or a composite
//! `(head, arg1, ..., argN)` matched against a node and its positional
//! arguments. Patterns key the fusion registries, so they are cheap to
//! clone, hash, and compare.

/// Leaf predicate on a single node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpMatch {
    /// Node calls a free function with this name
    Function(String),
    /// Node calls a submodule whose kind (runtime type name) equals this
    Module(String),
}

/// Recursive subgraph pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Matches any argument without constraining it; marks an external
    /// input boundary rather than part of the fused group
    Wildcard,
    /// Leaf operation-kind predicate
    Op(OpMatch),
    /// Composite: head matched against the node itself, each element of the
    /// vector matched against the corresponding positional argument
    Seq(Box<Pattern>, Vec<Pattern>),
}

impl Pattern {
    /// Leaf matching a function call by name
    pub fn function(name: impl Into<String>) -> Self {
        Pattern::Op(OpMatch::Function(name.into()))
    }

    /// Leaf matching a module call by module kind
    pub fn module(kind: impl Into<String>) -> Self {
        Pattern::Op(OpMatch::Module(kind.into()))
    }

    /// Composite pattern from a head and argument sub-patterns
    pub fn seq(head: Pattern, args: impl IntoIterator<Item = Pattern>) -> Self {
        Pattern::Seq(Box::new(head), args.into_iter().collect())
    }

    /// Check if this is the wildcard leaf
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Pattern::Wildcard)
    }
}
