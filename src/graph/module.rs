//! Graph container and submodule table
//!
//! [`GraphModule`] pairs a [`Graph`] with the named submodules its
//! `CallModule` nodes refer to, plus free-form container attributes. The
//! fuse pass reads one and produces a fresh one.

use rustc_hash::FxHashMap;

use super::graph::Graph;
use super::node::Arg;

/// Runtime information about one named submodule
///
/// Only the module's kind (its runtime type name, e.g. `"Conv2d"`) is needed
/// to evaluate node-level pattern predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Type name of the submodule
    pub kind: String,
}

impl ModuleInfo {
    /// Create module info with the given kind
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

/// Lookup table: module path → module info
pub type ModuleTable = FxHashMap<String, ModuleInfo>;

/// Graph plus its submodules and container attributes
#[derive(Debug, Clone, Default)]
pub struct GraphModule {
    /// The computation graph
    pub graph: Graph,
    modules: ModuleTable,
    attributes: FxHashMap<String, Arg>,
}

impl GraphModule {
    /// Create a container around a graph, with no submodules
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            modules: ModuleTable::default(),
            attributes: FxHashMap::default(),
        }
    }

    /// Register a submodule under a path
    pub fn add_module(&mut self, path: impl Into<String>, info: ModuleInfo) {
        self.modules.insert(path.into(), info);
    }

    /// Look up a submodule by path
    pub fn get_module(&self, path: &str) -> Option<&ModuleInfo> {
        self.modules.get(path)
    }

    /// Snapshot of the module table
    ///
    /// Computed fresh per call; the fuse pass takes one snapshot and threads
    /// it through matching and rewriting as read-only context.
    pub fn named_modules(&self) -> ModuleTable {
        self.modules.clone()
    }

    /// Number of registered submodules
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Set a container attribute
    pub fn set_attribute(&mut self, name: impl Into<String>, value: Arg) {
        self.attributes.insert(name.into(), value);
    }

    /// Get a container attribute
    pub fn attribute(&self, name: &str) -> Option<&Arg> {
        self.attributes.get(name)
    }

    /// Check if a container attribute exists
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_lookup() {
        let mut gm = GraphModule::new(Graph::new());
        gm.add_module("conv", ModuleInfo::new("Conv2d"));

        assert_eq!(gm.get_module("conv").map(|m| m.kind.as_str()), Some("Conv2d"));
        assert!(gm.get_module("bn").is_none());
        assert_eq!(gm.module_count(), 1);
    }

    #[test]
    fn test_named_modules_is_a_snapshot() {
        let mut gm = GraphModule::new(Graph::new());
        gm.add_module("conv", ModuleInfo::new("Conv2d"));

        let snapshot = gm.named_modules();
        gm.add_module("bn", ModuleInfo::new("BatchNorm2d"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(gm.module_count(), 2);
    }

    #[test]
    fn test_attributes() {
        let mut gm = GraphModule::new(Graph::new());
        gm.set_attribute("version", Arg::Int(3));

        assert!(gm.has_attribute("version"));
        assert_eq!(gm.attribute("version"), Some(&Arg::Int(3)));
        assert!(gm.attribute("missing").is_none());
    }
}
