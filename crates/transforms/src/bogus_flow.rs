//! Bogus control flow: guards blocks with an always-true predicate whose false edge leads into a
//! dead loop.

use crate::Transform;
use crate::context::{ObfuscationContext, OpaqueGlobals};
use murk_core::cfg_ir::{DomDirection, EdgeType, Function};
use murk_core::ir::{CmpOp, Condition, Expr, Operand, Stmt, Ty, Var};
use murk_utils::errors::TransformError;
use petgraph::stable_graph::NodeIndex;
use tracing::debug;

/// For every eligible block `B`:
///
/// ```text
///   preds -> B            preds -> C --true--> B
///                   =>             | false   ^
///                                  v         |
///                                  J --------+ (J loops back to C)
/// ```
///
/// `C` evaluates `gy < 10 || (gx * (gx + 1)) & 1 == 0`. The product of two consecutive integers is
/// even, so the predicate always holds and the junk block `J` never runs.
#[derive(Debug, Clone, Default)]
pub struct BogusFlow;

impl BogusFlow {
    pub const fn new() -> Self {
        Self
    }

    /// Blocks eligible for wrapping: the layout without the entry and its last two positions.
    fn candidates(func: &Function) -> Vec<NodeIndex> {
        let n = func.layout.len();
        if n < 3 {
            return Vec::new();
        }
        func.layout[1..n - 2].to_vec()
    }

    fn predicate(func: &mut Function, globals: OpaqueGlobals, out: &mut Vec<Stmt>) -> Condition {
        let x = || Expr::var(Var::Global(globals.x));
        let y = Expr::var(Var::Global(globals.y));
        let small = Expr::compare(CmpOp::Lt, Ty::I32, y, Expr::konst(10));
        let even = Expr::compare(
            CmpOp::Eq,
            Ty::I32,
            (x() * (x() + Expr::konst(1))) & Expr::konst(1),
            Expr::konst(0),
        );
        let value = func.gimplify(small | even, Ty::Bool, out);
        let flag = func.new_temp(Ty::Bool);
        out.push(Stmt::Assign { dest: flag, value });
        Condition {
            op: CmpOp::Ne,
            lhs: Operand::Var(flag),
            rhs: Operand::Const(0),
        }
    }
}

impl Transform for BogusFlow {
    fn name(&self) -> &'static str {
        "bcf"
    }

    fn apply(
        &self,
        func: &mut Function,
        ctx: &mut ObfuscationContext,
    ) -> Result<bool, TransformError> {
        let blocks = Self::candidates(func);
        if blocks.is_empty() {
            return Ok(false);
        }
        let globals = ctx.opaque_globals();

        for block in &blocks {
            let head_edge = func.split_block_after_labels(*block);
            let (cond_block, body) = func.edge_endpoints(head_edge);

            let mut code = Vec::new();
            let cond = Self::predicate(func, globals, &mut code);
            code.push(Stmt::Cond(cond));
            func.stmts_mut(cond_block).extend(code);

            let junk = func.split_edge(head_edge);
            let to_junk = func.single_succ_edge(cond_block);
            func.set_edge_kind(to_junk, EdgeType::BranchFalse);
            func.make_edge(cond_block, body, EdgeType::BranchTrue);

            let junk_exit = func.single_succ_edge(junk);
            func.redirect_edge_target(junk_exit, cond_block);
            let owner = func.loop_of(cond_block);
            func.remove_block_from_loop(junk);
            func.add_block_to_loop(junk, owner);

            debug!(
                "bcf: block {} guarded by {} with junk {}",
                body.index(),
                cond_block.index(),
                junk.index()
            );
        }

        func.mark_loops_for_fixup();
        func.free_dominance_info(DomDirection::Dominators);
        func.free_dominance_info(DomDirection::PostDominators);
        Ok(true)
    }
}
