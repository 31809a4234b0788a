//! Pattern matching predicate
//!
//! Tests whether a pattern matches the subgraph rooted at a node. Purely a
//! boolean check with no side effects; it may be called redundantly across
//! patterns; correctness over matching speed, graphs are modest in size.

use crate::graph::{Arg, Graph, ModuleTable, Node, Op};

use super::descriptor::{OpMatch, Pattern};

/// Test whether `pattern` matches the subgraph rooted at `node`
///
/// - `Wildcard` always matches and constrains nothing.
/// - An `Op` leaf matches on the node's operation target: function calls by
///   name, module calls by the kind of the module looked up in `modules`.
/// - A composite matches iff its head matches the node, the node has at
///   least as many positional arguments as the pattern, and every argument
///   sub-pattern matches the corresponding argument. Arity mismatch is a
///   non-match, not an error.
pub fn is_match(modules: &ModuleTable, graph: &Graph, node: &Node, pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Wildcard => true,
        Pattern::Op(leaf) => leaf_matches(modules, node, leaf),
        Pattern::Seq(head, arg_patterns) => {
            if !is_match(modules, graph, node, head) {
                return false;
            }
            if node.args.len() < arg_patterns.len() {
                return false;
            }
            arg_patterns
                .iter()
                .zip(node.args.iter())
                .all(|(sub, arg)| arg_matches(modules, graph, arg, sub))
        }
    }
}

/// Match a pattern against one argument position
///
/// Non-node arguments (scalars, lists) satisfy only the wildcard.
fn arg_matches(modules: &ModuleTable, graph: &Graph, arg: &Arg, pattern: &Pattern) -> bool {
    if pattern.is_wildcard() {
        return true;
    }
    match arg.as_node().and_then(|name| graph.get(name)) {
        Some(node) => is_match(modules, graph, node, pattern),
        None => false,
    }
}

fn leaf_matches(modules: &ModuleTable, node: &Node, leaf: &OpMatch) -> bool {
    match (leaf, &node.op) {
        (OpMatch::Function(name), Op::CallFunction(target)) => name == target,
        (OpMatch::Module(kind), Op::CallModule(path)) => {
            modules.get(path).is_some_and(|m| &m.kind == kind)
        }
        _ => false,
    }
}
