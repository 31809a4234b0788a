//! Fusion handlers
//!
//! A [`FuseHandler`] computes the replacement for one matched subgraph. The
//! engine calls it exactly once per match, at the match anchor, and binds
//! its return value under the anchor's name. [`DefaultFuseHandler`] covers
//! the built-in patterns: it looks up a fuser method for the matched kind
//! sequence, installs the fused module at the root node's path, and emits a
//! copy of the root node.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{FuseError, FuseResult};
use crate::graph::{Arg, ModuleInfo, Node, Op};
use crate::pattern::MatchedNodeTree;

use super::registry::FuseConfig;
use super::rewriter::GraphRewriter;

/// Computes the replacement value for one matched subgraph
///
/// Implementations create whatever nodes they need through the rewriter and
/// return the value to bind under the anchor's name: exactly one
/// replacement per fused group, regardless of how many nodes were fused
/// away. Argument references must be resolved through
/// [`GraphRewriter::resolve`].
pub trait FuseHandler {
    /// Fuse one matched subgraph
    ///
    /// `root` is the node selected by the pattern's root-node getter;
    /// `matched` is the full matched-node tree; `config`, `fuser_methods`
    /// and `is_training` are passed through from the fuse call.
    fn fuse(
        &self,
        rw: &mut GraphRewriter<'_>,
        root: &Node,
        matched: &MatchedNodeTree,
        config: &FuseConfig,
        fuser_methods: Option<&FuserMethodTable>,
        is_training: bool,
    ) -> FuseResult<Arg>;
}

/// Factory producing a handler instance bound to the match anchor
///
/// Invoked once per successful match during index construction; an error
/// aborts the whole fuse pass.
pub type HandlerFactory = Rc<dyn Fn(&Node) -> FuseResult<Rc<dyn FuseHandler>>>;

/// Computes the fused module for one matched kind sequence
pub type FuserMethod = fn(kinds: &[&str], is_training: bool) -> ModuleInfo;

/// Ordered table: matched kind sequence (anchor first) → fuser method
#[derive(Default, Clone)]
pub struct FuserMethodTable {
    methods: IndexMap<Vec<String>, FuserMethod>,
}

impl FuserMethodTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fuser method for a kind sequence
    pub fn register(&mut self, kinds: impl IntoIterator<Item = &'static str>, method: FuserMethod) {
        self.methods
            .insert(kinds.into_iter().map(str::to_string).collect(), method);
    }

    /// Look up the method for a kind sequence
    pub fn get(&self, kinds: &[String]) -> Option<FuserMethod> {
        self.methods.get(kinds).copied()
    }

    /// Number of registered methods
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl std::fmt::Debug for FuserMethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FuserMethodTable")
            .field("kinds", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn fuse_conv_bn(_kinds: &[&str], is_training: bool) -> ModuleInfo {
    // At eval time the batch norm folds into the convolution entirely
    if is_training {
        ModuleInfo::new("ConvBn2d")
    } else {
        ModuleInfo::new("Conv2d")
    }
}

fn fuse_conv_bn_relu(_kinds: &[&str], is_training: bool) -> ModuleInfo {
    if is_training {
        ModuleInfo::new("ConvBnReLU2d")
    } else {
        ModuleInfo::new("ConvReLU2d")
    }
}

fn fuse_conv_relu(_kinds: &[&str], _is_training: bool) -> ModuleInfo {
    ModuleInfo::new("ConvReLU2d")
}

fn fuse_linear_relu(_kinds: &[&str], _is_training: bool) -> ModuleInfo {
    ModuleInfo::new("LinearReLU")
}

fn fuse_bn_relu(_kinds: &[&str], _is_training: bool) -> ModuleInfo {
    ModuleInfo::new("BNReLU2d")
}

/// Fuser methods for the built-in fusion patterns
///
/// Keys are the kind sequences the built-in patterns produce: module kinds
/// for module calls, the function name for function calls, anchor first.
pub fn default_fuser_methods() -> FuserMethodTable {
    let mut table = FuserMethodTable::new();
    table.register(["relu", "BatchNorm2d", "Conv2d"], fuse_conv_bn_relu);
    table.register(["BatchNorm2d", "Conv2d"], fuse_conv_bn);
    table.register(["relu", "Conv2d"], fuse_conv_relu);
    table.register(["relu", "Linear"], fuse_linear_relu);
    table.register(["relu", "BatchNorm2d"], fuse_bn_relu);
    table
}

/// Handler for the built-in fusion patterns
///
/// Maps the matched nodes to their kind sequence, looks up the fuser
/// method (in the backend-supplied table when given, else the built-in
/// defaults), registers the fused module at the root's path, and emits a
/// copy of the root node with arguments resolved through the environment.
pub struct DefaultFuseHandler {
    defaults: FuserMethodTable,
}

impl DefaultFuseHandler {
    /// Create a handler with the built-in fuser methods as fallback
    pub fn new() -> Self {
        Self {
            defaults: default_fuser_methods(),
        }
    }

    /// Factory registering this handler for a pattern
    pub fn factory() -> HandlerFactory {
        Rc::new(|_anchor| Ok(Rc::new(DefaultFuseHandler::new())))
    }

    fn kind_of(&self, rw: &GraphRewriter<'_>, name: &str) -> FuseResult<String> {
        let node = rw
            .source()
            .get(name)
            .ok_or_else(|| FuseError::NodeNotFound(name.to_string()))?;
        match &node.op {
            Op::CallModule(path) => rw
                .module(path)
                .map(|m| m.kind.clone())
                .ok_or_else(|| FuseError::ModuleNotFound(path.clone())),
            Op::CallFunction(function) => Ok(function.clone()),
            Op::Input | Op::Output => Err(FuseError::InvalidNode(format!(
                "matched node '{}' has no fusible kind",
                name
            ))),
        }
    }
}

impl Default for DefaultFuseHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl FuseHandler for DefaultFuseHandler {
    fn fuse(
        &self,
        rw: &mut GraphRewriter<'_>,
        root: &Node,
        matched: &MatchedNodeTree,
        _config: &FuseConfig,
        fuser_methods: Option<&FuserMethodTable>,
        is_training: bool,
    ) -> FuseResult<Arg> {
        let mut kinds = Vec::new();
        for name in matched.flatten_nodes() {
            kinds.push(self.kind_of(rw, name)?);
        }

        let table = fuser_methods.unwrap_or(&self.defaults);
        let method = table
            .get(&kinds)
            .ok_or_else(|| FuseError::NoFuserMethod(kinds.join(" -> ")))?;

        let kind_refs: Vec<&str> = kinds.iter().map(String::as_str).collect();
        let fused = method(&kind_refs, is_training);

        let path = root.op.module_path().ok_or_else(|| {
            FuseError::InvalidNode(format!(
                "fusion root '{}' is not a module call",
                root.name
            ))
        })?;
        rw.add_module(path, fused);

        rw.copy_node(root)
    }
}
