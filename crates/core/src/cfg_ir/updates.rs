//! CFG edit operations
//!
//! Graph surgery used by the obfuscation passes. Every primitive expects well-formed inputs: a
//! missing block or edge, or a block in the wrong state, is a programming error and panics.

use crate::ir::Stmt;
use petgraph::Direction;
use petgraph::stable_graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use super::{Block, DomDirection, EdgeType, Function, LoopId};

impl Function {
    /// Adds an empty body block inside `loop_id`, placed in the layout right before `before`.
    pub fn add_block(&mut self, loop_id: LoopId, before: NodeIndex) -> NodeIndex {
        assert!(self.loops.contains(loop_id), "loop {} does not exist", loop_id.0);
        assert!(before != self.entry, "nothing may precede the entry block");
        let pos = self.layout_position(before);
        let node = self.cfg.add_node(Block::empty(loop_id));
        self.layout.insert(pos, node);
        tracing::debug!("added block {} before {}", node.index(), before.index());
        node
    }

    fn layout_position(&self, node: NodeIndex) -> usize {
        self.layout
            .iter()
            .position(|&n| n == node)
            .unwrap_or_else(|| panic!("block {} is not in the layout", node.index()))
    }

    /// Adds an edge `src -> dst` of the given kind.
    ///
    /// `Untyped` edges carry no branch meaning; they only make `dst` reachable in the static graph.
    pub fn make_edge(&mut self, src: NodeIndex, dst: NodeIndex, kind: EdgeType) -> EdgeIndex {
        assert!(
            self.cfg.contains_node(src) && self.cfg.contains_node(dst),
            "edge endpoints {} -> {} must exist",
            src.index(),
            dst.index()
        );
        self.cfg.add_edge(src, dst, kind)
    }

    /// Removes an edge.
    pub fn remove_edge(&mut self, edge: EdgeIndex) {
        let removed = self.cfg.remove_edge(edge);
        assert!(removed.is_some(), "edge {} does not exist", edge.index());
    }

    /// Endpoints of an edge.
    pub fn edge_endpoints(&self, edge: EdgeIndex) -> (NodeIndex, NodeIndex) {
        self.cfg
            .edge_endpoints(edge)
            .unwrap_or_else(|| panic!("edge {} does not exist", edge.index()))
    }

    /// Kind of an edge.
    pub fn edge_kind(&self, edge: EdgeIndex) -> EdgeType {
        *self
            .cfg
            .edge_weight(edge)
            .unwrap_or_else(|| panic!("edge {} does not exist", edge.index()))
    }

    /// Retags an edge.
    pub fn set_edge_kind(&mut self, edge: EdgeIndex, kind: EdgeType) {
        let weight = self
            .cfg
            .edge_weight_mut(edge)
            .unwrap_or_else(|| panic!("edge {} does not exist", edge.index()));
        *weight = kind;
    }

    /// Outgoing edges of `node`, oldest first.
    pub fn succ_edges(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .cfg
            .edges_directed(node, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges
    }

    /// Incoming edges of `node`, oldest first.
    pub fn pred_edges(&self, node: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .cfg
            .edges_directed(node, Direction::Incoming)
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges
    }

    /// Successor blocks of `node`.
    pub fn successors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        self.succ_edges(node)
            .into_iter()
            .map(|e| self.edge_endpoints(e).1)
            .collect()
    }

    /// The only outgoing edge of `node`; panics if there is not exactly one.
    pub fn single_succ_edge(&self, node: NodeIndex) -> EdgeIndex {
        match self.succ_edges(node).as_slice() {
            [edge] => *edge,
            other => panic!(
                "block {} has {} successors, expected one",
                node.index(),
                other.len()
            ),
        }
    }

    /// The `(BranchTrue, BranchFalse)` edges of a conditional block.
    pub fn true_false_edges(&self, node: NodeIndex) -> (EdgeIndex, EdgeIndex) {
        let mut on_true = None;
        let mut on_false = None;
        for edge in self.succ_edges(node) {
            match self.edge_kind(edge) {
                EdgeType::BranchTrue => on_true = Some(edge),
                EdgeType::BranchFalse => on_false = Some(edge),
                _ => {}
            }
        }
        match (on_true, on_false) {
            (Some(t), Some(f)) => (t, f),
            _ => panic!("block {} lacks a true/false edge pair", node.index()),
        }
    }

    /// Repoints `edge` at `new_target`, keeping its kind. Case labels of a switch in the source
    /// block follow the edge. Returns the id of the redirected edge.
    pub fn redirect_edge_target(&mut self, edge: EdgeIndex, new_target: NodeIndex) -> EdgeIndex {
        let (src, old_target) = self.edge_endpoints(edge);
        let kind = self.edge_kind(edge);
        self.remove_edge(edge);
        let redirected = self.make_edge(src, new_target, kind);
        if let Some(Stmt::Switch(switch)) = self.stmts_mut_if_body(src).and_then(|s| s.last_mut())
        {
            switch.retarget(old_target, new_target);
        }
        tracing::debug!(
            "redirected {} -> {} to {}",
            src.index(),
            old_target.index(),
            new_target.index()
        );
        redirected
    }

    fn stmts_mut_if_body(&mut self, node: NodeIndex) -> Option<&mut Vec<Stmt>> {
        match self.cfg.node_weight_mut(node) {
            Some(Block::Body { stmts, .. }) => Some(stmts),
            _ => None,
        }
    }

    /// Subdivides `edge` with a new empty block.
    ///
    /// The upstream half keeps the edge's kind and the downstream half is a fresh `Jump`. The new
    /// block joins the innermost loop containing both endpoints.
    pub fn split_edge(&mut self, edge: EdgeIndex) -> NodeIndex {
        let (src, dst) = self.edge_endpoints(edge);
        let loop_id = self
            .loops
            .common(self.loop_or_root(src), self.loop_or_root(dst));
        let middle = self.add_block(loop_id, dst);
        self.redirect_edge_target(edge, middle);
        self.make_edge(middle, dst, EdgeType::Jump);
        middle
    }

    /// Gives `block` a fresh empty predecessor that receives every incoming edge, so code placed
    /// in it runs before the block's first statement. Returns the `Fallthrough` edge from the new
    /// block to `block`.
    pub fn split_block_after_labels(&mut self, block: NodeIndex) -> EdgeIndex {
        assert!(
            self.block(block).is_body(),
            "block {} is not a body block",
            block.index()
        );
        let loop_id = self.loop_of(block);
        let head = self.add_block(loop_id, block);
        for edge in self.pred_edges(block) {
            self.redirect_edge_target(edge, head);
        }
        if self.loops.get(loop_id).header == Some(block) {
            self.loops.get_mut(loop_id).header = Some(head);
        }
        self.make_edge(head, block, EdgeType::Fallthrough)
    }

    /// Innermost loop containing a body block; panics for detached or non-body blocks.
    pub fn loop_of(&self, block: NodeIndex) -> LoopId {
        match self.block(block) {
            Block::Body {
                loop_id: Some(id), ..
            } => *id,
            Block::Body { loop_id: None, .. } => {
                panic!("block {} is detached from the loop tree", block.index())
            }
            Block::Entry | Block::Exit => {
                panic!("block {} is not a body block", block.index())
            }
        }
    }

    fn loop_or_root(&self, block: NodeIndex) -> LoopId {
        match self.block(block) {
            Block::Body {
                loop_id: Some(id), ..
            } => *id,
            _ => LoopId::ROOT,
        }
    }

    /// Detaches a body block from its loop.
    pub fn remove_block_from_loop(&mut self, block: NodeIndex) {
        match self.cfg.node_weight_mut(block) {
            Some(Block::Body { loop_id, .. }) => {
                assert!(loop_id.is_some(), "block {} is already detached", block.index());
                *loop_id = None;
            }
            _ => panic!("block {} is not a body block", block.index()),
        }
    }

    /// Attaches a detached body block to `owner`.
    pub fn add_block_to_loop(&mut self, block: NodeIndex, owner: LoopId) {
        assert!(self.loops.contains(owner), "loop {} does not exist", owner.0);
        match self.cfg.node_weight_mut(block) {
            Some(Block::Body { loop_id, .. }) => {
                assert!(
                    loop_id.is_none(),
                    "block {} still belongs to a loop",
                    block.index()
                );
                *loop_id = Some(owner);
            }
            _ => panic!("block {} is not a body block", block.index()),
        }
    }

    /// Drops cached dominance information for one direction.
    pub fn free_dominance_info(&mut self, direction: DomDirection) {
        match direction {
            DomDirection::Dominators => self.analysis.dominators = None,
            DomDirection::PostDominators => self.analysis.post_dominators = None,
        }
    }

    /// Flags the loop tree as stale so the next consumer re-derives it.
    pub fn mark_loops_for_fixup(&mut self) {
        self.loops.mark_for_fixup();
    }
}
