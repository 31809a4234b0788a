//! Operator fusion pass
//!
//! This module runs the fuse pass end to end: build the match index over
//! the input graph, then rebuild the graph in one forward sweep,
//! substituting each matched subgraph with the single replacement its
//! handler produces.
//!
//! # Overview
//!
//! For every node of the input graph, in original order, exactly one of
//! three things happens:
//!
//! - **Fused**: the node is the anchor of its match. Its handler runs once
//!   and the result is bound under the node's name.
//! - **Copied**: the node matched nothing, or only served as a wildcard
//!   boundary of some match. It is copied verbatim with argument
//!   references remapped through the environment.
//! - **Dropped**: the node is interior to a match; its value is subsumed
//!   by the replacement emitted at the anchor.
//!
//! # Example
//!
//! ```ignore
//! use graphfuse::fuse::{Fuser, FuseConfig};
//!
//! let fuser = Fuser::new();
//! let fused = fuser.fuse(&model, false, &FuseConfig::default(), None)?;
//! ```

mod handler;
mod registry;
mod rewriter;

// Re-export main types
pub use handler::{
    default_fuser_methods, DefaultFuseHandler, FuseHandler, FuserMethod, FuserMethodTable,
    HandlerFactory,
};
pub use registry::{
    default_fusion_patterns, default_root_node, BackendConfig, FuseConfig, FusionRegistry,
    RootGetterRegistry, RootNodeGetter,
};
pub use rewriter::GraphRewriter;

use crate::error::{FuseError, FuseResult};
use crate::graph::GraphModule;
use crate::pattern::find_matches;

/// Statistics from one fuse pass
///
/// Every input node is accounted for exactly once across the three
/// counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FuseStats {
    /// Number of matches whose handler ran
    pub matches: usize,
    /// Nodes replaced by a handler result (one per match)
    pub nodes_fused: usize,
    /// Nodes copied verbatim (unmatched or wildcard boundary)
    pub nodes_copied: usize,
    /// Interior nodes dropped in favor of their match's replacement
    pub nodes_dropped: usize,
}

/// The fusion pass
///
/// Stateless; all inputs arrive per call and the input model is never
/// touched.
#[derive(Debug, Default, Clone)]
pub struct Fuser;

impl Fuser {
    /// Create a fuser
    pub fn new() -> Self {
        Self
    }

    /// Run the fuse pass, returning the rewritten container
    pub fn fuse(
        &self,
        model: &GraphModule,
        is_training: bool,
        config: &FuseConfig,
        backend: Option<&BackendConfig>,
    ) -> FuseResult<GraphModule> {
        self.fuse_with_stats(model, is_training, config, backend)
            .map(|(fused, _)| fused)
    }

    /// Run the fuse pass, also returning per-node accounting
    pub fn fuse_with_stats(
        &self,
        model: &GraphModule,
        is_training: bool,
        config: &FuseConfig,
        backend: Option<&BackendConfig>,
    ) -> FuseResult<(GraphModule, FuseStats)> {
        let modules = model.named_modules();

        // Backend configuration replaces the default-plus-additional merge
        // entirely when present.
        let merged;
        let (registry, fuser_methods, root_getters) = match backend {
            Some(b) => (&b.patterns, Some(&b.fuser_methods), Some(&b.root_getters)),
            None => {
                merged = match &config.additional_patterns {
                    Some(extra) => default_fusion_patterns().merged(extra),
                    None => default_fusion_patterns(),
                };
                (&merged, None, None)
            }
        };

        let index = find_matches(&model.graph, &modules, registry)?;

        let mut stats = FuseStats {
            matches: index
                .iter()
                .filter(|(name, record)| record.anchor == **name)
                .count(),
            ..FuseStats::default()
        };

        let mut rw = GraphRewriter::new(&model.graph, &modules);

        for node in model.graph.nodes() {
            match index.get(&node.name) {
                Some(record) if record.anchor == node.name => {
                    let root_name = match root_getters.and_then(|r| r.get(&record.pattern)) {
                        Some(getter) => getter(&record.matched)?,
                        None => default_root_node(&record.matched)?.to_string(),
                    };
                    let root = model
                        .graph
                        .get(&root_name)
                        .ok_or_else(|| FuseError::NodeNotFound(root_name.clone()))?;

                    let replacement = record.handler.fuse(
                        &mut rw,
                        root,
                        &record.matched,
                        config,
                        fuser_methods,
                        is_training,
                    )?;
                    rw.bind(node.name.clone(), replacement);
                    stats.nodes_fused += 1;
                }
                Some(record) if record.subpattern.is_wildcard() => {
                    // Wildcard boundary: the match only used this node as an
                    // unconstrained input, so it survives independently.
                    let copied = rw.copy_node(node)?;
                    rw.bind(node.name.clone(), copied);
                    stats.nodes_copied += 1;
                }
                None => {
                    let copied = rw.copy_node(node)?;
                    rw.bind(node.name.clone(), copied);
                    stats.nodes_copied += 1;
                }
                Some(_) => {
                    // Interior node: subsumed by the replacement emitted at
                    // its anchor.
                    stats.nodes_dropped += 1;
                }
            }
        }

        let (out_graph, added_modules) = rw.into_parts();
        let mut fused = GraphModule::new(out_graph);
        for (path, info) in modules {
            fused.add_module(path, info);
        }
        for (path, info) in added_modules {
            fused.add_module(path, info);
        }
        for name in &config.preserved_attributes {
            if let Some(value) = model.attribute(name) {
                fused.set_attribute(name.clone(), value.clone());
            }
        }

        Ok((fused, stats))
    }
}

/// Fuse a model with the default configuration
pub fn fuse(model: &GraphModule, is_training: bool) -> FuseResult<GraphModule> {
    Fuser::new().fuse(model, is_training, &FuseConfig::default(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Arg, Graph, ModuleInfo, Node, Op};
    use crate::pattern::{MatchedNodeTree, Pattern};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Handler that records every invocation and copies the root node
    struct RecordingHandler {
        calls: Rc<RefCell<Vec<(String, MatchedNodeTree)>>>,
    }

    impl FuseHandler for RecordingHandler {
        fn fuse(
            &self,
            rw: &mut GraphRewriter<'_>,
            root: &Node,
            matched: &MatchedNodeTree,
            _config: &FuseConfig,
            _fuser_methods: Option<&FuserMethodTable>,
            _is_training: bool,
        ) -> FuseResult<Arg> {
            self.calls
                .borrow_mut()
                .push((root.name.clone(), matched.clone()));
            rw.copy_node(root)
        }
    }

    fn recording_factory(
        calls: Rc<RefCell<Vec<(String, MatchedNodeTree)>>>,
    ) -> HandlerFactory {
        Rc::new(move |_anchor| {
            Ok(Rc::new(RecordingHandler {
                calls: Rc::clone(&calls),
            }))
        })
    }

    /// Root getter selecting the head of the top group instead of the
    /// deepest-last leaf
    fn head_root_getter() -> RootNodeGetter {
        Rc::new(|tree| match tree {
            MatchedNodeTree::Group(items) => items
                .first()
                .and_then(MatchedNodeTree::as_node)
                .map(str::to_string)
                .ok_or_else(|| FuseError::MalformedMatch("no head node".to_string())),
            MatchedNodeTree::Node(name) => Ok(name.clone()),
            MatchedNodeTree::Value(_) => {
                Err(FuseError::MalformedMatch("scalar tree".to_string()))
            }
        })
    }

    fn make_conv_bn_relu_model() -> GraphModule {
        let mut g = Graph::new();
        let x = g.input("x").unwrap();
        let conv = g.call_module("conv_0", "conv", [x]).unwrap();
        let bn = g.call_module("bn_0", "bn", [conv]).unwrap();
        let relu = g.call_function("relu_0", "relu", [bn]).unwrap();
        g.output("out", [relu]).unwrap();

        let mut gm = GraphModule::new(g);
        gm.add_module("conv", ModuleInfo::new("Conv2d"));
        gm.add_module("bn", ModuleInfo::new("BatchNorm2d"));
        gm
    }

    // ------------------------------------------------------------------
    // Scenario A: conv -> bn -> relu collapses to one fused node
    // ------------------------------------------------------------------

    #[test]
    fn scenario_a_chain_collapses() {
        let model = make_conv_bn_relu_model();
        let (fused, stats) = Fuser::new()
            .fuse_with_stats(&model, false, &FuseConfig::default(), None)
            .unwrap();

        let names: Vec<_> = fused.graph.node_names().collect();
        assert_eq!(names, vec!["x", "conv_0", "out"]);

        // The consumer of relu_0 now references the fused node
        let out = fused.graph.get("out").unwrap();
        assert_eq!(out.args.as_slice(), &[Arg::node("conv_0")]);

        // The fused module replaced the conv at the root's path
        assert_eq!(
            fused.get_module("conv").map(|m| m.kind.as_str()),
            Some("ConvReLU2d")
        );

        assert_eq!(stats.matches, 1);
        assert_eq!(stats.nodes_fused, 1);
        assert_eq!(stats.nodes_copied, 2); // x, out
        assert_eq!(stats.nodes_dropped, 2); // conv_0, bn_0
    }

    #[test]
    fn scenario_a_handler_runs_once_with_full_tree() {
        let model = make_conv_bn_relu_model();
        let calls = Rc::new(RefCell::new(Vec::new()));

        let pattern = Pattern::seq(
            Pattern::function("relu"),
            [Pattern::seq(
                Pattern::module("BatchNorm2d"),
                [Pattern::module("Conv2d")],
            )],
        );
        let mut patterns = FusionRegistry::new();
        patterns.register(pattern, recording_factory(Rc::clone(&calls)));

        let backend = BackendConfig {
            patterns,
            ..BackendConfig::default()
        };
        let fused = Fuser::new()
            .fuse(&model, false, &FuseConfig::default(), Some(&backend))
            .unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);

        // Default root policy: deepest-last leaf of the matched tree
        let (root, tree) = &calls[0];
        assert_eq!(root, "conv_0");
        assert_eq!(
            *tree,
            MatchedNodeTree::Group(vec![
                MatchedNodeTree::Node("relu_0".to_string()),
                MatchedNodeTree::Group(vec![
                    MatchedNodeTree::Node("bn_0".to_string()),
                    MatchedNodeTree::Node("conv_0".to_string()),
                ]),
            ])
        );

        assert_eq!(
            fused.graph.node_names().collect::<Vec<_>>(),
            vec!["x", "conv_0", "out"]
        );
    }

    #[test]
    fn training_flag_selects_fused_module_flavor() {
        let model = make_conv_bn_relu_model();

        let fused = fuse(&model, true).unwrap();
        assert_eq!(
            fused.get_module("conv").map(|m| m.kind.as_str()),
            Some("ConvBnReLU2d")
        );
    }

    // ------------------------------------------------------------------
    // Scenario B: wildcard boundary survives independently
    // ------------------------------------------------------------------

    #[test]
    fn scenario_b_wildcard_boundary_survives() {
        let mut g = Graph::new();
        let x = g.input("x").unwrap();
        let relu = g.call_function("relu_0", "relu", [x]).unwrap();
        g.output("y", [relu]).unwrap();
        let model = GraphModule::new(g);

        let calls = Rc::new(RefCell::new(Vec::new()));
        let pattern = Pattern::seq(Pattern::function("relu"), [Pattern::Wildcard]);

        let mut patterns = FusionRegistry::new();
        patterns.register(pattern.clone(), recording_factory(Rc::clone(&calls)));
        let mut root_getters = RootGetterRegistry::new();
        root_getters.register(pattern, head_root_getter());

        let backend = BackendConfig {
            patterns,
            root_getters,
            ..BackendConfig::default()
        };
        let (fused, stats) = Fuser::new()
            .fuse_with_stats(&model, false, &FuseConfig::default(), Some(&backend))
            .unwrap();

        // x was claimed as a wildcard leaf yet copied into the output
        assert_eq!(
            fused.graph.node_names().collect::<Vec<_>>(),
            vec!["x", "relu_0", "y"]
        );
        assert_eq!(stats.nodes_copied, 2); // x, y
        assert_eq!(stats.nodes_fused, 1);
        assert_eq!(stats.nodes_dropped, 0);

        // The handler fired at the relu with the wildcard node in its tree
        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "relu_0");
        assert_eq!(
            calls[0].1,
            MatchedNodeTree::Group(vec![
                MatchedNodeTree::Node("relu_0".to_string()),
                MatchedNodeTree::Node("x".to_string()),
            ])
        );
    }

    #[test]
    fn wildcard_claim_blocks_second_match() {
        // conv_0 is claimed as relu_0's wildcard boundary before the scan
        // reaches it, so the conv-only pattern never fires.
        let mut g = Graph::new();
        let x = g.input("x").unwrap();
        let conv = g.call_module("conv_0", "conv", [x]).unwrap();
        g.call_function("relu_0", "relu", [conv]).unwrap();
        let mut model = GraphModule::new(g);
        model.add_module("conv", ModuleInfo::new("Conv2d"));

        let relu_calls = Rc::new(RefCell::new(Vec::new()));
        let conv_calls = Rc::new(RefCell::new(Vec::new()));

        let relu_pattern = Pattern::seq(Pattern::function("relu"), [Pattern::Wildcard]);
        let mut patterns = FusionRegistry::new();
        patterns.register(
            relu_pattern.clone(),
            recording_factory(Rc::clone(&relu_calls)),
        );
        patterns.register(
            Pattern::module("Conv2d"),
            recording_factory(Rc::clone(&conv_calls)),
        );
        let mut root_getters = RootGetterRegistry::new();
        root_getters.register(relu_pattern, head_root_getter());

        let backend = BackendConfig {
            patterns,
            root_getters,
            ..BackendConfig::default()
        };
        let (fused, stats) = Fuser::new()
            .fuse_with_stats(&model, false, &FuseConfig::default(), Some(&backend))
            .unwrap();

        assert_eq!(stats.matches, 1);
        assert_eq!(relu_calls.borrow().len(), 1);
        assert!(conv_calls.borrow().is_empty());

        // conv_0 survives via the boundary-copy path
        assert!(fused.graph.contains("conv_0"));
    }

    // ------------------------------------------------------------------
    // Scenario C: unmatched nodes are copied verbatim, args remapped
    // ------------------------------------------------------------------

    #[test]
    fn scenario_c_unmatched_copied_verbatim() {
        let mut g = Graph::new();
        let x = g.input("x").unwrap();
        let sig = g.call_function("sigmoid_0", "sigmoid", [x, Arg::Float(0.5)]).unwrap();
        g.output("out", [sig]).unwrap();
        let model = GraphModule::new(g);

        let (fused, stats) = Fuser::new()
            .fuse_with_stats(&model, false, &FuseConfig::default(), None)
            .unwrap();

        assert_eq!(stats.nodes_copied, 3);
        assert_eq!(stats.nodes_fused, 0);

        let sig = fused.graph.get("sigmoid_0").unwrap();
        assert_eq!(sig.op, Op::CallFunction("sigmoid".to_string()));
        assert_eq!(sig.args.as_slice(), &[Arg::node("x"), Arg::Float(0.5)]);
    }

    // ------------------------------------------------------------------
    // Scenario D: arity mismatch is a clean non-match
    // ------------------------------------------------------------------

    #[test]
    fn scenario_d_arity_mismatch_copies_node() {
        let mut g = Graph::new();
        let x = g.input("x").unwrap();
        g.call_function("add_0", "add", [x]).unwrap();
        let model = GraphModule::new(g);

        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut patterns = FusionRegistry::new();
        patterns.register(
            Pattern::seq(
                Pattern::function("add"),
                [Pattern::Wildcard, Pattern::Wildcard],
            ),
            recording_factory(Rc::clone(&calls)),
        );

        let backend = BackendConfig {
            patterns,
            ..BackendConfig::default()
        };
        let (fused, stats) = Fuser::new()
            .fuse_with_stats(&model, false, &FuseConfig::default(), Some(&backend))
            .unwrap();

        assert!(calls.borrow().is_empty());
        assert_eq!(stats.nodes_fused, 0);
        assert!(fused.graph.contains("add_0"));
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    fn make_two_chain_model() -> GraphModule {
        let mut g = Graph::new();
        let x = g.input("x").unwrap();
        let conv = g.call_module("conv_0", "conv", [x]).unwrap();
        let bn = g.call_module("bn_0", "bn", [conv]).unwrap();
        let lin = g.call_module("linear_0", "linear", [bn.clone()]).unwrap();
        let relu = g.call_function("relu_0", "relu", [lin]).unwrap();
        g.output("out", [relu]).unwrap();

        let mut gm = GraphModule::new(g);
        gm.add_module("conv", ModuleInfo::new("Conv2d"));
        gm.add_module("bn", ModuleInfo::new("BatchNorm2d"));
        gm.add_module("linear", ModuleInfo::new("Linear"));
        gm
    }

    fn graph_fingerprint(model: &GraphModule) -> Vec<(String, Op, Vec<Arg>)> {
        model
            .graph
            .nodes()
            .map(|n| (n.name.clone(), n.op.clone(), n.args.to_vec()))
            .collect()
    }

    #[test]
    fn disjoint_patterns_are_registration_order_independent() {
        let model = make_two_chain_model();

        let bn_conv = Pattern::seq(
            Pattern::module("BatchNorm2d"),
            [Pattern::module("Conv2d")],
        );
        let relu_linear = Pattern::seq(Pattern::function("relu"), [Pattern::module("Linear")]);

        let run = |first: &Pattern, second: &Pattern| {
            let mut extra = FusionRegistry::new();
            extra.register(first.clone(), DefaultFuseHandler::factory());
            extra.register(second.clone(), DefaultFuseHandler::factory());
            let backend = BackendConfig {
                patterns: extra,
                fuser_methods: default_fuser_methods(),
                ..BackendConfig::default()
            };
            Fuser::new()
                .fuse(&model, true, &FuseConfig::default(), Some(&backend))
                .unwrap()
        };

        let forward = run(&bn_conv, &relu_linear);
        let backward = run(&relu_linear, &bn_conv);

        assert_eq!(graph_fingerprint(&forward), graph_fingerprint(&backward));
    }

    #[test]
    fn overlapping_patterns_first_registered_wins() {
        let model = make_conv_bn_relu_model();

        let long_calls = Rc::new(RefCell::new(Vec::new()));
        let short_calls = Rc::new(RefCell::new(Vec::new()));

        let long = Pattern::seq(
            Pattern::function("relu"),
            [Pattern::seq(
                Pattern::module("BatchNorm2d"),
                [Pattern::module("Conv2d")],
            )],
        );
        let short = Pattern::function("relu");

        let mut patterns = FusionRegistry::new();
        patterns.register(long, recording_factory(Rc::clone(&long_calls)));
        patterns.register(short, recording_factory(Rc::clone(&short_calls)));

        let backend = BackendConfig {
            patterns,
            ..BackendConfig::default()
        };
        Fuser::new()
            .fuse(&model, false, &FuseConfig::default(), Some(&backend))
            .unwrap();

        assert_eq!(long_calls.borrow().len(), 1);
        assert!(short_calls.borrow().is_empty());
    }

    #[test]
    fn coverage_accounts_for_every_node() {
        let model = make_two_chain_model();
        let (_, stats) = Fuser::new()
            .fuse_with_stats(&model, true, &FuseConfig::default(), None)
            .unwrap();

        assert_eq!(
            stats.nodes_fused + stats.nodes_copied + stats.nodes_dropped,
            model.graph.len()
        );
    }

    #[test]
    fn output_wiring_has_no_dangling_references() {
        let model = make_two_chain_model();
        let fused = fuse(&model, false).unwrap();

        // Every argument in the output resolves to an earlier output node
        assert!(fused.graph.validate().is_ok());
    }

    // ------------------------------------------------------------------
    // Configuration surfaces
    // ------------------------------------------------------------------

    #[test]
    fn preserved_attributes_copied_onto_output() {
        let mut model = make_conv_bn_relu_model();
        model.set_attribute("version", Arg::Int(3));
        model.set_attribute("debug_name", Arg::Str("resnet".to_string()));

        let config =
            FuseConfig::new().with_preserved_attributes(["version", "not_present"]);
        let fused = Fuser::new().fuse(&model, false, &config, None).unwrap();

        assert_eq!(fused.attribute("version"), Some(&Arg::Int(3)));
        assert!(!fused.has_attribute("debug_name"));
        assert!(!fused.has_attribute("not_present"));
    }

    #[test]
    fn additional_patterns_merge_over_defaults() {
        // gelu -> Linear is not a built-in pattern; supply it via config
        let mut g = Graph::new();
        let x = g.input("x").unwrap();
        let lin = g.call_module("linear_0", "linear", [x]).unwrap();
        let gelu = g.call_function("gelu_0", "gelu", [lin]).unwrap();
        g.output("out", [gelu]).unwrap();
        let mut model = GraphModule::new(g);
        model.add_module("linear", ModuleInfo::new("Linear"));

        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut extra = FusionRegistry::new();
        extra.register(
            Pattern::seq(Pattern::function("gelu"), [Pattern::module("Linear")]),
            recording_factory(Rc::clone(&calls)),
        );

        let config = FuseConfig::new().with_additional_patterns(extra);
        let fused = Fuser::new().fuse(&model, false, &config, None).unwrap();

        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(
            fused.graph.node_names().collect::<Vec<_>>(),
            vec!["x", "linear_0", "out"]
        );
    }

    #[test]
    fn backend_config_replaces_default_patterns() {
        // With a backend set that lacks the conv/bn/relu chain, the default
        // patterns must not fire.
        let model = make_conv_bn_relu_model();

        let backend = BackendConfig::default();
        let (fused, stats) = Fuser::new()
            .fuse_with_stats(&model, false, &FuseConfig::default(), Some(&backend))
            .unwrap();

        assert_eq!(stats.matches, 0);
        assert_eq!(fused.graph.len(), model.graph.len());
    }
}
