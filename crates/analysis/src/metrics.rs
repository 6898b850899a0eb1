/// Module for computing analytical metrics to evaluate obfuscation passes.
///
/// Implements a small set of metrics quantified by control-flow size, statement count,
/// cyclomatic complexity, loop count and dominator overlap to assess pass potency (analyst
/// effort). The module provides functions to collect metrics from a [`Function`], compare pre-
/// and post-obfuscation states, and compute dominator/post-dominator overlap.
///
/// # Usage
/// ```rust,ignore
/// let before = metrics::collect_metrics(&func)?;
/// pipeline.run(&mut func, &mut ctx);
/// let after = metrics::collect_metrics(&func)?;
/// println!("potency Δ {:+.2}", metrics::compare(&before, &after));
/// ```
use crate::dominance::dominator_tree;
use crate::loops::natural_loops;
use murk_core::cfg_ir::{Block, DomDirection, DomTree, Function};
use murk_utils::errors::MetricsError;
use serde::{Deserialize, Serialize};

/// Represents a set of analytical metrics for one function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Number of basic blocks in the CFG (excluding Entry/Exit).
    pub block_cnt: usize,
    /// Number of edges in the CFG.
    pub edge_cnt: usize,
    /// Number of statements across all body blocks.
    pub stmt_cnt: usize,
    /// McCabe complexity `E - N + 2` over the whole graph.
    pub cyclomatic: i64,
    /// Number of natural loops.
    pub loop_cnt: usize,
    /// Fraction of nodes whose immediate dominator is also their immediate post-dominator.
    pub dom_overlap: f64,
    /// Composite potency score (heuristic based on nodes, edges, and overlap).
    pub potency: f64,
}

/// Collects metrics from a function's CFG.
///
/// The potency score balances complexity (nodes, edges, loops) against overlap to estimate
/// analyst effort.
///
/// # Returns
/// A `Metrics` struct with computed metrics, or an error if the CFG is degenerate.
pub fn collect_metrics(func: &Function) -> Result<Metrics, MetricsError> {
    if func.cfg.node_count() < 2 {
        return Err(MetricsError::EmptyCfg);
    }

    let block_cnt = func
        .cfg
        .node_indices()
        .filter(|&n| matches!(func.cfg[n], Block::Body { .. }))
        .count();
    if block_cnt == 0 {
        return Err(MetricsError::NoBodyBlocks);
    }

    let doms = dominator_tree(func, DomDirection::Dominators);
    let post_doms = dominator_tree(func, DomDirection::PostDominators);
    let overlap = dom_overlap(&doms, &post_doms);

    let edge_cnt = func.cfg.edge_count();
    let stmt_cnt = func
        .cfg
        .node_indices()
        .map(|n| func.cfg[n].stmts().len())
        .sum();
    let loop_cnt = natural_loops(func).len();

    Ok(Metrics {
        block_cnt,
        edge_cnt,
        stmt_cnt,
        cyclomatic: edge_cnt as i64 - func.cfg.node_count() as i64 + 2,
        loop_cnt,
        dom_overlap: overlap,
        potency: score(overlap, block_cnt, edge_cnt, loop_cnt),
    })
}

/// Computes the fraction of nodes that are both dominators and post-dominators.
///
/// A higher overlap suggests a more linear CFG, reducing obfuscation potency.
fn dom_overlap(doms: &DomTree, pdoms: &DomTree) -> f64 {
    let common = doms
        .idom
        .iter()
        .filter(|(n, d)| pdoms.idom.get(*n) == Some(*d))
        .count();
    if doms.idom.is_empty() {
        0.0
    } else {
        common as f64 / doms.idom.len() as f64
    }
}

/// Composite potency score: higher means more work for an analyst.
fn score(overlap: f64, nodes: usize, edges: usize, loops: usize) -> f64 {
    5.0 * (nodes as f64).log2() + edges as f64 + 4.0 * loops as f64 + 30.0 * (1.0 - overlap)
}

/// Compares two sets of metrics; a positive result means the pass made the function harder to
/// read, discounted by statement growth.
pub fn compare(before: &Metrics, after: &Metrics) -> f64 {
    after.potency - before.potency - 0.05 * (after.stmt_cnt as f64 - before.stmt_cnt as f64)
}
