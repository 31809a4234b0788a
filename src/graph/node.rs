//! Graph node types
//!
//! Defines the node of the computation IR: an operation target plus an
//! ordered list of argument references. Nodes are immutable once inserted
//! into a [`Graph`](crate::graph::Graph); arguments refer to other nodes
//! by name and never own them.

use smallvec::SmallVec;

/// Operation performed by a node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Op {
    /// Graph input placeholder
    Input,
    /// Invocation of a named submodule; payload is the module-table path
    CallModule(String),
    /// Invocation of a free function by name
    CallFunction(String),
    /// Graph result node
    Output,
}

impl Op {
    /// Module-table path if this is a `CallModule`
    pub fn module_path(&self) -> Option<&str> {
        match self {
            Op::CallModule(path) => Some(path),
            _ => None,
        }
    }

    /// Function name if this is a `CallFunction`
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Op::CallFunction(name) => Some(name),
            _ => None,
        }
    }

    /// Check if this operation calls a submodule
    pub fn is_call_module(&self) -> bool {
        matches!(self, Op::CallModule(_))
    }
}

/// Argument reference carried by a node
///
/// `Node` refers to another graph node by name; the remaining variants are
/// opaque scalar values passed through unchanged. `List` nests, so argument
/// resolution recurses through it.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Reference to another node, by name
    Node(String),
    /// Integer scalar
    Int(i64),
    /// Float scalar
    Float(f64),
    /// String scalar
    Str(String),
    /// Nested argument list
    List(Vec<Arg>),
    /// Absent optional argument
    None,
}

impl Arg {
    /// Create a node reference argument
    pub fn node(name: impl Into<String>) -> Self {
        Arg::Node(name.into())
    }

    /// Referenced node name, if this is a node reference
    pub fn as_node(&self) -> Option<&str> {
        match self {
            Arg::Node(name) => Some(name),
            _ => None,
        }
    }

    /// Check if this argument references a node
    pub fn is_node(&self) -> bool {
        matches!(self, Arg::Node(_))
    }
}

/// Argument list type: most nodes carry 1-4 arguments
pub type ArgList = SmallVec<[Arg; 4]>;

/// One operation in the computation graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique, ordering-stable name
    pub name: String,
    /// Operation target
    pub op: Op,
    /// Ordered positional arguments
    pub args: ArgList,
}

impl Node {
    /// Create a new node
    pub fn new(name: impl Into<String>, op: Op, args: impl IntoIterator<Item = Arg>) -> Self {
        Self {
            name: name.into(),
            op,
            args: args.into_iter().collect(),
        }
    }

    /// Get argument at position
    pub fn arg(&self, index: usize) -> Option<&Arg> {
        self.args.get(index)
    }

    /// Number of positional arguments
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Iterate over the node names this node references directly
    ///
    /// Does not recurse into `Arg::List`; use
    /// [`collect_node_refs`] for the transitive set.
    pub fn node_args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(|a| a.as_node())
    }
}

/// Collect every node name referenced by an argument, recursing through lists
pub fn collect_node_refs<'a>(arg: &'a Arg, out: &mut Vec<&'a str>) {
    match arg {
        Arg::Node(name) => out.push(name),
        Arg::List(items) => {
            for item in items {
                collect_node_refs(item, out);
            }
        }
        _ => {}
    }
}
