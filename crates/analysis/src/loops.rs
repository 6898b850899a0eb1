//! Natural-loop discovery and loop-tree repair.
//!
//! A back edge is an edge `latch -> header` where `header` dominates `latch`. The body of the loop
//! is every block that reaches a latch without passing through the header. Loops sharing a header
//! are merged, nesting follows body containment, and every body block is tagged with the smallest
//! loop that contains it.

use murk_core::cfg_ir::{Block, DomDirection, Function, Loop, LoopId};
use petgraph::Direction;
use petgraph::stable_graph::NodeIndex;
use std::collections::{BTreeMap, HashSet};

use crate::dominance::dominator_tree;

/// A discovered natural loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalLoop {
    pub header: NodeIndex,
    pub body: HashSet<NodeIndex>,
}

/// Finds the natural loops of `func`, one per header, largest first.
pub fn natural_loops(func: &Function) -> Vec<NaturalLoop> {
    let doms = dominator_tree(func, DomDirection::Dominators);
    let mut by_header: BTreeMap<NodeIndex, HashSet<NodeIndex>> = BTreeMap::new();

    for edge in func.cfg.edge_indices() {
        let Some((latch, header)) = func.cfg.edge_endpoints(edge) else {
            continue;
        };
        let reachable = latch == func.entry || doms.idom.contains_key(&latch);
        if !reachable || !doms.dominates(header, latch) {
            continue;
        }
        let body = by_header.entry(header).or_insert_with(|| HashSet::from([header]));
        let mut stack = vec![latch];
        while let Some(node) = stack.pop() {
            if body.insert(node) {
                stack.extend(func.cfg.neighbors_directed(node, Direction::Incoming));
            }
        }
    }

    let mut loops: Vec<NaturalLoop> = by_header
        .into_iter()
        .map(|(header, body)| NaturalLoop { header, body })
        .collect();
    loops.sort_by(|a, b| b.body.len().cmp(&a.body.len()).then(a.header.cmp(&b.header)));
    loops
}

/// Re-derives the loop tree of `func` from its current graph and retags every body block.
pub fn fixup_loops(func: &mut Function) {
    let found = natural_loops(func);

    let mut tree = vec![Loop {
        parent: None,
        header: None,
        depth: 0,
    }];
    for (i, lp) in found.iter().enumerate() {
        // Larger loops come first, so the smallest earlier loop holding the header is the parent.
        let parent = (0..i)
            .rev()
            .find(|&j| found[j].body.contains(&lp.header) && found[j].body.len() > lp.body.len())
            .map_or(LoopId::ROOT, |j| LoopId(j as u32 + 1));
        let depth = tree[parent.0 as usize].depth + 1;
        tree.push(Loop {
            parent: Some(parent),
            header: Some(lp.header),
            depth,
        });
    }

    let nodes: Vec<NodeIndex> = func.cfg.node_indices().collect();
    for node in nodes {
        let innermost = found
            .iter()
            .enumerate()
            .rev()
            .find(|(_, lp)| lp.body.contains(&node))
            .map_or(LoopId::ROOT, |(i, _)| LoopId(i as u32 + 1));
        if let Block::Body { loop_id, .. } = &mut func.cfg[node] {
            *loop_id = Some(innermost);
        }
    }

    tracing::debug!("{}: {} natural loops", func.name, found.len());
    func.loops.replace(tree);
}
