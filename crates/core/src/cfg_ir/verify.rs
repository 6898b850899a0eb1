//! Structural verification of a function's CFG.

use crate::ir::{GlobalTable, Stmt, Var};
use murk_utils::errors::CfgIrError;
use petgraph::Direction;
use petgraph::stable_graph::NodeIndex;
use std::collections::HashSet;

use super::{Block, EdgeType, Function};

impl Function {
    /// Checks the structural invariants of the CFG. Global variables are not resolved; use
    /// [`Function::verify_in`] when the owning module's globals are at hand.
    pub fn verify(&self) -> Result<(), CfgIrError> {
        self.verify_structure()?;
        self.verify_vars(None)
    }

    /// Like [`Function::verify`], additionally resolving every global against `globals`.
    pub fn verify_in(&self, globals: &GlobalTable) -> Result<(), CfgIrError> {
        self.verify_structure()?;
        self.verify_vars(Some(globals))
    }

    fn verify_structure(&self) -> Result<(), CfgIrError> {
        if !matches!(self.cfg.node_weight(self.entry), Some(Block::Entry)) {
            return Err(CfgIrError::NoEntryBlock);
        }
        if !matches!(self.cfg.node_weight(self.exit), Some(Block::Exit)) {
            return Err(CfgIrError::NoExitBlock);
        }
        self.verify_layout()?;

        let degree = |n: NodeIndex, dir: Direction| self.cfg.edges_directed(n, dir).count();
        if degree(self.entry, Direction::Incoming) != 0
            || degree(self.entry, Direction::Outgoing) != 1
        {
            return Err(CfgIrError::MalformedEntry(self.entry.index()));
        }
        if degree(self.exit, Direction::Outgoing) != 0 {
            return Err(CfgIrError::MalformedExit(self.exit.index()));
        }

        for node in self.cfg.node_indices() {
            let Block::Body { stmts, loop_id } = &self.cfg[node] else {
                if node != self.entry && node != self.exit {
                    return Err(CfgIrError::InvalidSequence);
                }
                continue;
            };
            let idx = node.index();
            if !loop_id.is_some_and(|id| self.loops.contains(id)) {
                return Err(CfgIrError::DetachedFromLoop(idx));
            }
            if degree(node, Direction::Incoming) == 0 {
                return Err(CfgIrError::NoPredecessors(idx));
            }
            if degree(node, Direction::Outgoing) == 0 {
                return Err(CfgIrError::NoSuccessors(idx));
            }
            if let Some(pos) = stmts.iter().position(Stmt::is_terminator) {
                if pos + 1 != stmts.len() {
                    return Err(CfgIrError::MisplacedTerminator(idx));
                }
            }
            self.verify_terminator(node, stmts.last())?;
        }
        Ok(())
    }

    fn verify_terminator(&self, node: NodeIndex, last: Option<&Stmt>) -> Result<(), CfgIrError> {
        let idx = node.index();
        let succs = self.succ_edges(node);
        let kinds: Vec<EdgeType> = succs.iter().map(|&e| self.edge_kind(e)).collect();
        let count = |k: EdgeType| kinds.iter().filter(|&&x| x == k).count();
        let branchy = count(EdgeType::BranchTrue) + count(EdgeType::BranchFalse);

        match last {
            Some(Stmt::Cond(_)) => {
                if count(EdgeType::BranchTrue) != 1
                    || count(EdgeType::BranchFalse) != 1
                    || succs.len() != 2
                {
                    return Err(CfgIrError::BadBranchEdges(idx));
                }
            }
            Some(Stmt::Switch(switch)) => {
                if branchy != 0 {
                    return Err(CfgIrError::StrayBranchEdge(idx));
                }
                let targets: HashSet<NodeIndex> =
                    succs.iter().map(|&e| self.edge_endpoints(e).1).collect();
                let labelled = switch.cases.iter().map(|c| c.target);
                for target in labelled.chain(std::iter::once(switch.default)) {
                    if !targets.contains(&target) {
                        return Err(CfgIrError::MissingSwitchEdge {
                            block: idx,
                            target: target.index(),
                        });
                    }
                }
            }
            Some(Stmt::Return(_)) => {
                if succs.len() != 1 || self.edge_endpoints(succs[0]).1 != self.exit {
                    return Err(CfgIrError::BadReturn(idx));
                }
            }
            _ => {
                if branchy != 0 {
                    return Err(CfgIrError::StrayBranchEdge(idx));
                }
                if succs.len() != 1 {
                    return Err(CfgIrError::AmbiguousFallthrough(idx, succs.len()));
                }
            }
        }
        Ok(())
    }

    fn verify_layout(&self) -> Result<(), CfgIrError> {
        if self.layout.first() != Some(&self.entry) || self.layout.last() != Some(&self.exit) {
            return Err(CfgIrError::BadLayout(
                "layout must start at entry and end at exit".into(),
            ));
        }
        let mut seen = HashSet::new();
        for &node in &self.layout {
            if !self.cfg.contains_node(node) {
                return Err(CfgIrError::BadLayout(format!(
                    "block {} is not in the graph",
                    node.index()
                )));
            }
            if !seen.insert(node) {
                return Err(CfgIrError::BadLayout(format!(
                    "block {} is listed twice",
                    node.index()
                )));
            }
        }
        if seen.len() != self.cfg.node_count() {
            return Err(CfgIrError::BadLayout(format!(
                "{} blocks in the graph, {} in the layout",
                self.cfg.node_count(),
                seen.len()
            )));
        }
        Ok(())
    }

    fn verify_vars(&self, globals: Option<&GlobalTable>) -> Result<(), CfgIrError> {
        let resolves = |var: Var| match var {
            Var::Local(id) => self.local(id).is_some(),
            Var::Global(id) => globals.is_none_or(|g| g.get(id).is_some()),
        };
        for param in &self.params {
            if self.local(*param).is_none() {
                return Err(CfgIrError::UnknownVariable(Var::Local(*param).to_string()));
            }
        }
        for node in self.cfg.node_indices() {
            for stmt in self.cfg[node].stmts() {
                let vars = stmt.uses().into_iter().chain(stmt.def());
                if let Some(bad) = vars.into_iter().find(|&v| !resolves(v)) {
                    return Err(CfgIrError::UnknownVariable(bad.to_string()));
                }
            }
        }
        Ok(())
    }
}
