//! Match index construction
//!
//! Walks the graph once in reverse order and records, for every node, the
//! match it belongs to. Reverse order visits pattern roots before their
//! dependency chains; registration order decides priority between patterns;
//! the first claim on a node wins and is never revisited. Both order
//! sources are caller-supplied deterministic sequences, so the index is
//! identical for a given graph and registry.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{FuseError, FuseResult};
use crate::fuse::{FuseHandler, FusionRegistry};
use crate::graph::{Arg, Graph, ModuleTable};

use super::descriptor::Pattern;
use super::matcher::is_match;

/// Concrete nodes found by a match, shaped identically to the pattern
#[derive(Debug, Clone, PartialEq)]
pub enum MatchedNodeTree {
    /// A matched graph node, by name
    Node(String),
    /// A non-node argument captured at a wildcard position
    Value(Arg),
    /// Mirror of a composite pattern level: head first, then arguments
    Group(Vec<MatchedNodeTree>),
}

impl MatchedNodeTree {
    /// Node name if this is a node leaf
    pub fn as_node(&self) -> Option<&str> {
        match self {
            MatchedNodeTree::Node(name) => Some(name),
            _ => None,
        }
    }

    /// All matched node names in match order (head before arguments)
    pub fn flatten_nodes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_nodes(&mut out);
        out
    }

    fn collect_nodes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            MatchedNodeTree::Node(name) => out.push(name),
            MatchedNodeTree::Value(_) => {}
            MatchedNodeTree::Group(items) => {
                for item in items {
                    item.collect_nodes(out);
                }
            }
        }
    }
}

/// Per-node record of the match that claimed it
#[derive(Clone)]
pub struct MatchRecord {
    /// Node the match was rooted at during the reverse scan; the handler
    /// fires there and its result is bound under this name
    pub anchor: String,
    /// The pattern that matched
    pub pattern: Pattern,
    /// Matched-node tree for the whole match, shared by every record of it
    pub matched: Rc<MatchedNodeTree>,
    /// Fusion handler instance bound to the anchor
    pub handler: Rc<dyn FuseHandler>,
    /// The exact pattern leaf this node satisfied; `Wildcard` marks a
    /// boundary node that must survive the rewrite independently
    pub subpattern: Pattern,
}

impl fmt::Debug for MatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchRecord")
            .field("anchor", &self.anchor)
            .field("pattern", &self.pattern)
            .field("subpattern", &self.subpattern)
            .finish()
    }
}

/// Node name → record of the match that claimed it
pub type MatchIndex = IndexMap<String, MatchRecord>;

/// Build the match index for a graph against an ordered pattern registry
///
/// A node with no matching pattern is simply absent from the index and is
/// later copied verbatim. A handler factory error aborts the whole pass.
pub fn find_matches(
    graph: &Graph,
    modules: &ModuleTable,
    registry: &FusionRegistry,
) -> FuseResult<MatchIndex> {
    let mut index = MatchIndex::new();

    for node in graph.nodes_reversed() {
        if index.contains_key(&node.name) {
            continue;
        }
        for (pattern, factory) in registry.iter() {
            if !is_match(modules, graph, node, pattern) {
                continue;
            }
            let handler = factory(node)?;
            let mut claims = Vec::new();
            let tree = collect_match(graph, pattern, &Arg::Node(node.name.clone()), &mut claims)?;
            let matched = Rc::new(tree);

            for (name, subpattern) in claims {
                // the first claim on a node wins
                if index.contains_key(&name) {
                    continue;
                }
                index.insert(
                    name,
                    MatchRecord {
                        anchor: node.name.clone(),
                        pattern: pattern.clone(),
                        matched: Rc::clone(&matched),
                        handler: Rc::clone(&handler),
                        subpattern,
                    },
                );
            }
            break;
        }
    }

    Ok(index)
}

/// Walk a successful pattern/argument pair, building the matched-node tree
/// and collecting `(node, subpattern leaf)` claims in match order
fn collect_match(
    graph: &Graph,
    pattern: &Pattern,
    arg: &Arg,
    claims: &mut Vec<(String, Pattern)>,
) -> FuseResult<MatchedNodeTree> {
    match pattern {
        Pattern::Seq(head, arg_patterns) => {
            let name = arg.as_node().ok_or_else(|| {
                FuseError::Internal("composite pattern matched a non-node argument".to_string())
            })?;
            let node = graph
                .get(name)
                .ok_or_else(|| FuseError::NodeNotFound(name.to_string()))?;

            let mut items = Vec::with_capacity(arg_patterns.len() + 1);
            items.push(collect_match(graph, head, arg, claims)?);
            for (sub, node_arg) in arg_patterns.iter().zip(node.args.iter()) {
                items.push(collect_match(graph, sub, node_arg, claims)?);
            }
            Ok(MatchedNodeTree::Group(items))
        }
        Pattern::Op(_) => {
            let name = arg.as_node().ok_or_else(|| {
                FuseError::Internal("operation leaf matched a non-node argument".to_string())
            })?;
            claims.push((name.to_string(), pattern.clone()));
            Ok(MatchedNodeTree::Node(name.to_string()))
        }
        Pattern::Wildcard => match arg.as_node() {
            Some(name) => {
                claims.push((name.to_string(), Pattern::Wildcard));
                Ok(MatchedNodeTree::Node(name.to_string()))
            }
            None => Ok(MatchedNodeTree::Value(arg.clone())),
        },
    }
}
