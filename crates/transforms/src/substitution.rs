//! Instruction substitution: rewrites bitwise operations into longer equivalent forms.

use crate::Transform;
use crate::context::ObfuscationContext;
use murk_core::cfg_ir::Function;
use murk_core::ir::{BinOp, Expr, Operand, Rvalue, Stmt};
use murk_utils::errors::{CfgIrError, TransformError};
use tracing::debug;

/// Replaces every `dest = b op c` with `op` in `&`, `|`, `^` by an equivalent expression:
///
/// | original | rewritten |
/// |---|---|
/// | `b & c` | `(b ^ ~c) & b` |
/// | `b \| c` | `(b & c) \| (b ^ c)` |
/// | `b ^ c` | `(~b & c) \| (b & ~c)` |
///
/// The rewritten tree is flattened into fresh temporaries inserted before the statement, which is
/// then replaced. Each round rewrites the output of the previous one, so code grows geometrically
/// with the round count.
#[derive(Debug, Clone)]
pub struct Substitution {
    rounds: u32,
}

impl Substitution {
    pub const fn new(rounds: u32) -> Self {
        Self { rounds }
    }
}

/// The equivalent expression for `b op c`, or `None` if `op` is not bitwise.
pub fn substitute(op: BinOp, b: Operand, c: Operand) -> Option<Expr> {
    let (b, c) = (Expr::Leaf(b), Expr::Leaf(c));
    let rewritten = match op {
        BinOp::And => (b.clone() ^ !c) & b,
        BinOp::Or => (b.clone() & c.clone()) | (b ^ c),
        BinOp::Xor => (!b.clone() & c.clone()) | (b & !c),
        _ => return None,
    };
    Some(rewritten)
}

impl Transform for Substitution {
    fn name(&self) -> &'static str {
        "sub"
    }

    fn apply(
        &self,
        func: &mut Function,
        ctx: &mut ObfuscationContext,
    ) -> Result<bool, TransformError> {
        let mut rewrites = 0usize;
        for round in 0..self.rounds {
            for block in func.ordinary_blocks() {
                let mut i = 0;
                while i < func.block(block).stmts().len() {
                    let Stmt::Assign {
                        dest,
                        value: Rvalue::Binary(op, b, c),
                    } = func.block(block).stmts()[i]
                    else {
                        i += 1;
                        continue;
                    };
                    let Some(expr) = substitute(op, b, c) else {
                        i += 1;
                        continue;
                    };
                    let ty = func
                        .var_ty(dest, ctx.globals())
                        .ok_or_else(|| CfgIrError::UnknownVariable(dest.to_string()))?;

                    let mut code = Vec::new();
                    let root = func.gimplify(expr, ty, &mut code);
                    code.push(Stmt::Assign { dest, value: root });
                    let inserted = code.len();
                    func.stmts_mut(block).splice(i..=i, code);
                    // Continue after the replaced statement; the new temporaries are picked up by
                    // the next round.
                    i += inserted;
                    rewrites += 1;
                }
            }
            debug!("sub round {} on {}: {} rewrites so far", round, func.name, rewrites);
        }
        Ok(rewrites > 0)
    }
}
