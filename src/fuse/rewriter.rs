//! Rewrite context
//!
//! [`GraphRewriter`] owns the output graph being built, the environment map
//! from original node names to their replacements, and any fused modules
//! registered by handlers. One rewriter exists per fuse pass and is never
//! shared across calls.

use rustc_hash::FxHashMap;

use crate::error::{FuseError, FuseResult};
use crate::graph::{Arg, ArgList, Graph, ModuleInfo, ModuleTable, Node};

/// Mutable context threaded through one rewrite pass
///
/// Handlers receive `&mut GraphRewriter` to create nodes in the output
/// graph and to resolve argument references through the environment.
#[derive(Debug)]
pub struct GraphRewriter<'a> {
    src: &'a Graph,
    modules: &'a ModuleTable,
    out: Graph,
    env: FxHashMap<String, Arg>,
    added_modules: ModuleTable,
}

impl<'a> GraphRewriter<'a> {
    /// Create a rewriter over a source graph and its module table
    pub fn new(src: &'a Graph, modules: &'a ModuleTable) -> Self {
        Self {
            src,
            modules,
            out: Graph::new(),
            env: FxHashMap::default(),
            added_modules: ModuleTable::default(),
        }
    }

    /// The input graph being rewritten (read-only)
    pub fn source(&self) -> &Graph {
        self.src
    }

    /// Look up a submodule, preferring handler-registered fused modules
    pub fn module(&self, path: &str) -> Option<&ModuleInfo> {
        self.added_modules.get(path).or_else(|| self.modules.get(path))
    }

    /// Register a fused module at a path in the output container
    pub fn add_module(&mut self, path: impl Into<String>, info: ModuleInfo) {
        self.added_modules.insert(path.into(), info);
    }

    // ========================================================================
    // Environment
    // ========================================================================

    /// Resolve one argument through the environment map
    ///
    /// Node references are replaced by their bound image; lists resolve
    /// recursively; scalars pass through. A reference with no binding is a
    /// [`FuseError::DanglingReference`], reported against `owner`.
    pub fn resolve(&self, owner: &str, arg: &Arg) -> FuseResult<Arg> {
        match arg {
            Arg::Node(name) => {
                self.env
                    .get(name)
                    .cloned()
                    .ok_or_else(|| FuseError::DanglingReference {
                        node: owner.to_string(),
                        arg: name.clone(),
                    })
            }
            Arg::List(items) => items
                .iter()
                .map(|item| self.resolve(owner, item))
                .collect::<FuseResult<Vec<_>>>()
                .map(Arg::List),
            other => Ok(other.clone()),
        }
    }

    /// Resolve every argument of a node
    pub fn resolve_args(&self, node: &Node) -> FuseResult<ArgList> {
        node.args
            .iter()
            .map(|arg| self.resolve(&node.name, arg))
            .collect()
    }

    /// Bind an original node name to its replacement value
    pub fn bind(&mut self, name: impl Into<String>, value: Arg) {
        self.env.insert(name.into(), value);
    }

    /// Current binding for an original node name
    pub fn binding(&self, name: &str) -> Option<&Arg> {
        self.env.get(name)
    }

    // ========================================================================
    // Output graph
    // ========================================================================

    /// Append a node to the output graph
    pub fn emit(&mut self, node: Node) -> FuseResult<Arg> {
        self.out.add(node)
    }

    /// Copy a node into the output graph verbatim, with every argument
    /// reference remapped through the environment
    ///
    /// Does not bind the result; the pass decides what each original name
    /// maps to.
    pub fn copy_node(&mut self, node: &Node) -> FuseResult<Arg> {
        let args = self.resolve_args(node)?;
        self.emit(Node::new(node.name.clone(), node.op.clone(), args))
    }

    /// Consume the rewriter, yielding the output graph and the modules
    /// handlers registered during the pass
    pub fn into_parts(self) -> (Graph, ModuleTable) {
        (self.out, self.added_modules)
    }
}
