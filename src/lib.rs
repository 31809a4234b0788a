//! # graphfuse
//!
//! Deterministic pattern matching and operator fusion for directed
//! computation graphs.
//!
//! Given a graph of operations, graphfuse finds every occurrence of a set
//! of registered multi-node patterns, resolves overlaps by registration
//! order and first-claim priority, and rewrites each matched subgraph into
//! a single replacement node, re-wiring all external references through
//! the original graph's names. The target application is operator fusion
//! in a tensor-computation IR (collapsing `conv -> batchnorm -> relu` into
//! one fused operator), but the mechanism is domain-agnostic.
//!
//! ## Features
//!
//! - **Pattern Matching**: recursive subgraph patterns with wildcards,
//!   matched against operation targets and module kinds
//! - **Deterministic Conflict Resolution**: one reverse-order pass,
//!   first-registered pattern wins, first claim per node wins
//! - **Rewrite Engine**: single forward sweep producing a fresh graph, with
//!   pluggable fusion handlers and per-pattern root selection
//!
//! ## Example
//!
//! ```ignore
//! use graphfuse::prelude::*;
//!
//! let fused = fuse(&model, /* is_training */ false)?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod fuse;
pub mod graph;
pub mod pattern;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use graphfuse::prelude::*`
pub mod prelude {
    pub use crate::error::{FuseError, FuseResult};
    pub use crate::fuse::{
        default_fusion_patterns, fuse, BackendConfig, DefaultFuseHandler, FuseConfig,
        FuseHandler, FuseStats, Fuser, FuserMethodTable, FusionRegistry, GraphRewriter,
        RootGetterRegistry,
    };
    pub use crate::graph::{Arg, Graph, GraphModule, ModuleInfo, ModuleTable, Node, Op};
    pub use crate::pattern::{is_match, MatchIndex, MatchRecord, MatchedNodeTree, Pattern};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{FuseError, FuseResult};
pub use fuse::{fuse, Fuser};

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
