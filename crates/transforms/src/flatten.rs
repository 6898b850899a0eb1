//! Control-flow flattening: every block returns to a central switch that dispatches on a
//! next-block variable.

use crate::Transform;
use crate::context::ObfuscationContext;
use indexmap::IndexMap;
use murk_core::cfg_ir::{Block, DomDirection, EdgeType, Function, LoopId};
use murk_core::ir::{CaseLabel, LocalKind, Operand, Rvalue, Stmt, SwitchStmt, Ty, Var};
use murk_utils::errors::TransformError;
use petgraph::stable_graph::NodeIndex;
use std::collections::HashSet;
use tracing::debug;

/// Functions with at most this many ordinary blocks are left alone.
pub const MIN_BLOCKS: usize = 3;

/// Rewrites the CFG into
///
/// ```text
/// entry -> init -> switch --case id(B)--> B --> return -> switch
///                    |  default
///                    v
///                  dummy -> return
/// ```
///
/// `init` stores the id of the original first block in `switchVar`. Each block ends by storing
/// the id of its successor (a `Select` for conditional blocks) and jumping to the return block.
/// Blocks that fall through to the exit keep their edge.
#[derive(Debug, Clone, Default)]
pub struct Flatten;

/// What the rewrite does to one block, decided before anything is mutated.
enum Rewrite {
    Branch {
        on_true: NodeIndex,
        on_false: NodeIndex,
    },
    Goto(NodeIndex),
    Keep,
}

impl Flatten {
    pub const fn new() -> Self {
        Self
    }

    fn plan(func: &Function, blocks: &[NodeIndex]) -> Result<Vec<Rewrite>, TransformError> {
        let ordinary: HashSet<NodeIndex> = blocks.iter().copied().collect();
        let unsupported = |block: NodeIndex, reason: &str| TransformError::UnsupportedShape {
            block: block.index(),
            reason: reason.to_owned(),
        };

        let first = func.edge_endpoints(func.single_succ_edge(func.entry)).1;
        if !ordinary.contains(&first) {
            return Err(unsupported(func.entry, "entry does not lead to an ordinary block"));
        }

        blocks
            .iter()
            .map(|&block| match func.last_stmt(block) {
                Some(Stmt::Cond(_)) => {
                    let (t, f) = func.true_false_edges(block);
                    let on_true = func.edge_endpoints(t).1;
                    let on_false = func.edge_endpoints(f).1;
                    if !ordinary.contains(&on_true) || !ordinary.contains(&on_false) {
                        return Err(unsupported(block, "conditional branch leaves the function"));
                    }
                    Ok(Rewrite::Branch { on_true, on_false })
                }
                Some(Stmt::Switch(_)) => Err(unsupported(block, "block already ends in a switch")),
                Some(Stmt::Return(_)) => Ok(Rewrite::Keep),
                _ => {
                    let succ = func.edge_endpoints(func.single_succ_edge(block)).1;
                    if succ == func.exit {
                        Ok(Rewrite::Keep)
                    } else {
                        Ok(Rewrite::Goto(succ))
                    }
                }
            })
            .collect()
    }

    /// Draws a distinct non-negative id for every block.
    fn assign_ids(blocks: &[NodeIndex], ctx: &mut ObfuscationContext) -> IndexMap<NodeIndex, u32> {
        let mut ids = IndexMap::with_capacity(blocks.len());
        let mut used = HashSet::with_capacity(blocks.len());
        for &block in blocks {
            let id = loop {
                let candidate = ctx.rng().next_int().unsigned_abs();
                if used.insert(candidate) {
                    break candidate;
                }
            };
            ids.insert(block, id);
        }
        ids
    }
}

impl Transform for Flatten {
    fn name(&self) -> &'static str {
        "fla"
    }

    fn apply(
        &self,
        func: &mut Function,
        ctx: &mut ObfuscationContext,
    ) -> Result<bool, TransformError> {
        let blocks = func.ordinary_blocks();
        if blocks.len() <= MIN_BLOCKS {
            debug!("fla: {} has only {} blocks", func.name, blocks.len());
            return Ok(false);
        }
        let plan = Self::plan(func, &blocks)?;
        let ids = Self::assign_ids(&blocks, ctx);
        let id_of = |block: NodeIndex| Operand::Const(i64::from(ids[&block]));

        // Scaffold.
        let switch_var = func.new_local("switchVar", Ty::U32, LocalKind::Temp);
        let entry_edge = func.single_succ_edge(func.entry);
        let first = func.edge_endpoints(entry_edge).1;

        let init = func.add_block(LoopId::ROOT, blocks[0]);
        let dispatch = func.add_block(LoopId::ROOT, blocks[0]);
        let ret = func.add_block(LoopId::ROOT, func.exit);
        let dummy = func.add_block(LoopId::ROOT, func.exit);

        func.stmts_mut(init).push(assign(switch_var, id_of(first)));
        func.redirect_edge_target(entry_edge, init);
        func.make_edge(init, dispatch, EdgeType::Fallthrough);
        func.stmts_mut(dispatch).push(Stmt::Nop);
        func.make_edge(ret, dispatch, EdgeType::Jump);
        func.make_edge(dummy, ret, EdgeType::Jump);

        // Per-block rewrite.
        let mut cases = Vec::with_capacity(blocks.len());
        for (&block, rewrite) in blocks.iter().zip(plan) {
            match rewrite {
                Rewrite::Branch { on_true, on_false } => {
                    let Some(Stmt::Cond(cond)) = func.stmts_mut(block).pop() else {
                        unreachable!("planned branch block {} lost its condition", block.index());
                    };
                    func.stmts_mut(block).push(Stmt::Assign {
                        dest: switch_var,
                        value: Rvalue::Select {
                            cond,
                            on_true: id_of(on_true),
                            on_false: id_of(on_false),
                        },
                    });
                    for edge in func.succ_edges(block) {
                        func.remove_edge(edge);
                    }
                    func.make_edge(block, ret, EdgeType::Jump);
                }
                Rewrite::Goto(succ) => {
                    func.stmts_mut(block).push(assign(switch_var, id_of(succ)));
                    func.remove_edge(func.single_succ_edge(block));
                    func.make_edge(block, ret, EdgeType::Jump);
                }
                Rewrite::Keep => {}
            }
            cases.push(CaseLabel {
                value: i64::from(ids[&block]),
                target: block,
            });
        }

        // Switch assembly.
        cases.sort_by_key(|c| c.value);
        func.stmts_mut(dispatch).push(Stmt::Switch(SwitchStmt {
            index: switch_var,
            cases,
            default: dummy,
        }));
        func.make_edge(dispatch, dummy, EdgeType::Untyped);
        for &block in &blocks {
            func.make_edge(dispatch, block, EdgeType::Untyped);
        }

        debug!(
            "fla: {} flattened {} blocks behind switch block {}",
            func.name,
            blocks.len(),
            dispatch.index()
        );
        func.mark_loops_for_fixup();
        func.free_dominance_info(DomDirection::Dominators);
        func.free_dominance_info(DomDirection::PostDominators);
        Ok(true)
    }
}

const fn assign(dest: Var, value: Operand) -> Stmt {
    Stmt::Assign {
        dest,
        value: Rvalue::Use(value),
    }
}

/// Finds the dispatch switch of a flattened function.
pub fn dispatch_switch(func: &Function) -> Option<(NodeIndex, &SwitchStmt)> {
    func.layout.iter().find_map(|&node| match func.cfg.node_weight(node)? {
        Block::Body { stmts, .. } => match stmts.last() {
            Some(Stmt::Switch(s)) => Some((node, s)),
            _ => None,
        },
        _ => None,
    })
}
