//! Dominator and post-dominator trees.
//!
//! Both are computed with `petgraph`'s `simple_fast` (Cooper, Harvey and Kennedy). Post-dominators
//! run the same algorithm over the reversed graph rooted at the exit block. Blocks that cannot
//! reach the root (e.g. unreachable code, or an infinite loop for post-dominance) are absent from
//! the resulting tree.

use murk_core::cfg_ir::{DomDirection, DomTree, Function};
use petgraph::algo::dominators::simple_fast;
use petgraph::visit::Reversed;
use std::collections::HashMap;

/// Computes one dominance relation of `func` without touching its cache.
pub fn dominator_tree(func: &Function, direction: DomDirection) -> DomTree {
    let (root, doms) = match direction {
        DomDirection::Dominators => (func.entry, simple_fast(&func.cfg, func.entry)),
        DomDirection::PostDominators => (func.exit, simple_fast(Reversed(&func.cfg), func.exit)),
    };
    let mut idom = HashMap::new();
    for node in func.cfg.node_indices() {
        if let Some(parent) = doms.immediate_dominator(node) {
            idom.insert(node, parent);
        }
    }
    DomTree { root, idom }
}

/// Fills the function's dominator and post-dominator caches.
pub fn compute_dominance(func: &mut Function) {
    let doms = dominator_tree(func, DomDirection::Dominators);
    let post = dominator_tree(func, DomDirection::PostDominators);
    tracing::debug!(
        "dominance for {}: {} dominated, {} post-dominated blocks",
        func.name,
        doms.idom.len(),
        post.idom.len()
    );
    func.analysis.dominators = Some(doms);
    func.analysis.post_dominators = Some(post);
}
