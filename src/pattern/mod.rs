//! Pattern matching module for graph fusion
//!
//! This module provides the matching half of the fuse pass:
//!
//! - [`Pattern`]: recursive subgraph descriptor: leaf predicates,
//!   wildcards, and `(head, args...)` composites
//! - [`is_match`]: pure predicate testing a pattern against the subgraph
//!   rooted at a node
//! - [`find_matches`]: one reverse-order scan of the graph producing a
//!   [`MatchIndex`], with first-registered-pattern and first-claim priority
//!
//! # Example
//!
//! ```ignore
//! use graphfuse::pattern::{is_match, Pattern};
//!
//! // relu applied to a BatchNorm2d applied to a Conv2d
//! let pattern = Pattern::seq(
//!     Pattern::function("relu"),
//!     [Pattern::seq(
//!         Pattern::module("BatchNorm2d"),
//!         [Pattern::module("Conv2d")],
//!     )],
//! );
//!
//! let relu = graph.get("relu_0").unwrap();
//! if is_match(&modules, &graph, relu, &pattern) {
//!     // relu_0 roots a fusible chain
//! }
//! ```

mod descriptor;
mod index;
mod matcher;

// Re-export main types
pub use descriptor::{OpMatch, Pattern};
pub use index::{find_matches, MatchIndex, MatchRecord, MatchedNodeTree};
pub use matcher::is_match;
