//! Fusion registries and pass configuration
//!
//! The pattern registry maps each pattern to a handler factory, in
//! registration order; earlier entries win ties during matching. The
//! root-getter registry overrides the default root-selection policy per
//! pattern. Both are built once, before matching, and are read-only during
//! a fuse pass.

use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::error::{FuseError, FuseResult};
use crate::pattern::{MatchedNodeTree, Pattern};

use super::handler::{DefaultFuseHandler, FuserMethodTable, HandlerFactory};

/// Ordered mapping: pattern → fusion handler factory
#[derive(Clone, Default)]
pub struct FusionRegistry {
    patterns: IndexMap<Pattern, HandlerFactory>,
}

impl FusionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern with its handler factory
    ///
    /// Re-registering a pattern replaces its factory but keeps its original
    /// priority position.
    pub fn register(&mut self, pattern: Pattern, factory: HandlerFactory) {
        self.patterns.insert(pattern, factory);
    }

    /// Registry combining `self` with `overrides`
    ///
    /// Override entries take precedence on key collision; new override
    /// patterns rank after the base set.
    pub fn merged(&self, overrides: &FusionRegistry) -> FusionRegistry {
        let mut combined = self.clone();
        for (pattern, factory) in overrides.iter() {
            combined.patterns.insert(pattern.clone(), Rc::clone(factory));
        }
        combined
    }

    /// Iterate over `(pattern, factory)` in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&Pattern, &HandlerFactory)> {
        self.patterns.iter()
    }

    /// Look up the factory for a pattern
    pub fn get(&self, pattern: &Pattern) -> Option<&HandlerFactory> {
        self.patterns.get(pattern)
    }

    /// Check if a pattern is registered
    pub fn contains(&self, pattern: &Pattern) -> bool {
        self.patterns.contains_key(pattern)
    }

    /// Number of registered patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl std::fmt::Debug for FusionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionRegistry")
            .field("patterns", &self.patterns.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The built-in fusion pattern set, in priority order
///
/// Longer chains come first so they win over their own prefixes.
pub fn default_fusion_patterns() -> FusionRegistry {
    let conv = Pattern::module("Conv2d");
    let bn = Pattern::module("BatchNorm2d");
    let relu = Pattern::function("relu");

    let mut registry = FusionRegistry::new();
    registry.register(
        Pattern::seq(relu.clone(), [Pattern::seq(bn.clone(), [conv.clone()])]),
        DefaultFuseHandler::factory(),
    );
    registry.register(
        Pattern::seq(bn.clone(), [conv.clone()]),
        DefaultFuseHandler::factory(),
    );
    registry.register(
        Pattern::seq(relu.clone(), [conv]),
        DefaultFuseHandler::factory(),
    );
    registry.register(
        Pattern::seq(relu.clone(), [Pattern::module("Linear")]),
        DefaultFuseHandler::factory(),
    );
    registry.register(Pattern::seq(relu, [bn]), DefaultFuseHandler::factory());
    registry
}

// ============================================================================
// Root-node selection
// ============================================================================

/// Selects the node handed to the handler as its fusion base
pub type RootNodeGetter = Rc<dyn Fn(&MatchedNodeTree) -> FuseResult<String>>;

/// Default root policy: descend into the last element of each group until a
/// node leaf is reached, i.e. the deepest-last matched node
///
/// A tree with no node leaf on that path signals a bug in pattern
/// registration and is a fatal error.
pub fn default_root_node(tree: &MatchedNodeTree) -> FuseResult<&str> {
    let mut current = tree;
    loop {
        match current {
            MatchedNodeTree::Node(name) => return Ok(name),
            MatchedNodeTree::Group(items) => {
                current = items.last().ok_or_else(|| {
                    FuseError::MalformedMatch("empty group in matched-node tree".to_string())
                })?;
            }
            MatchedNodeTree::Value(_) => {
                return Err(FuseError::MalformedMatch(
                    "no node leaf on the last-element path".to_string(),
                ))
            }
        }
    }
}

/// Per-pattern overrides of the default root policy
#[derive(Clone, Default)]
pub struct RootGetterRegistry {
    getters: IndexMap<Pattern, RootNodeGetter>,
}

impl RootGetterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root getter for a pattern
    pub fn register(&mut self, pattern: Pattern, getter: RootNodeGetter) {
        self.getters.insert(pattern, getter);
    }

    /// Look up the getter for a pattern
    pub fn get(&self, pattern: &Pattern) -> Option<&RootNodeGetter> {
        self.getters.get(pattern)
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.getters.is_empty()
    }
}

impl std::fmt::Debug for RootGetterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootGetterRegistry")
            .field("patterns", &self.getters.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Per-call fusion configuration
///
/// `options` is opaque pass-through for handlers; the core ignores keys it
/// does not recognize.
#[derive(Debug, Clone, Default)]
pub struct FuseConfig {
    /// Extra pattern → handler entries merged over the defaults
    pub additional_patterns: Option<FusionRegistry>,
    /// Attribute names copied from the input container onto the output
    pub preserved_attributes: Vec<String>,
    /// Handler-specific settings, passed through untouched
    pub options: FxHashMap<String, String>,
}

impl FuseConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Add extra fusion patterns (merged over the defaults, override wins)
    pub fn with_additional_patterns(mut self, patterns: FusionRegistry) -> Self {
        self.additional_patterns = Some(patterns);
        self
    }

    /// Declare container attributes to preserve on the output
    pub fn with_preserved_attributes(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.preserved_attributes = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Backend-supplied fusion configuration
///
/// When present, its pattern set replaces the default-plus-additional merge
/// entirely, and its fuser methods and root getters are used instead of the
/// built-ins.
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    /// Pattern → handler factory set
    pub patterns: FusionRegistry,
    /// Kind-sequence → fuser method table
    pub fuser_methods: FuserMethodTable,
    /// Per-pattern root-selection overrides
    pub root_getters: RootGetterRegistry,
}
