//! Reference semantics of the function IR.
//!
//! Values are `i64`s normalized to their variable's type on every store. Arithmetic wraps, shift
//! amounts are taken modulo 64 and comparisons act on normalized values, so signed and unsigned
//! types compare correctly as long as both operands share a type. Locals start at zero and
//! globals at their initial value.

use murk_core::cfg_ir::{EdgeType, Function};
use murk_core::ir::{BinOp, GlobalTable, Operand, Rvalue, Stmt, Ty, UnOp, Var};
use murk_utils::errors::ExecError;
use petgraph::stable_graph::NodeIndex;
use serde::{Deserialize, Serialize};

/// Observable result of one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Returned value, normalized to the return type.
    pub ret: Option<i64>,
    /// Final value of every global, by id.
    pub globals: Vec<i64>,
    /// Number of blocks executed.
    pub steps: u64,
}

struct Machine<'a> {
    func: &'a Function,
    globals_ty: Vec<Ty>,
    locals: Vec<i64>,
    globals: Vec<i64>,
}

impl Machine<'_> {
    fn read(&self, var: Var) -> Result<i64, ExecError> {
        let slot = match var {
            Var::Local(id) => self.locals.get(id.0 as usize),
            Var::Global(id) => self.globals.get(id.0 as usize),
        };
        slot.copied()
            .ok_or_else(|| ExecError::UnknownVariable(var.to_string()))
    }

    fn write(&mut self, var: Var, value: i64) -> Result<(), ExecError> {
        let unknown = || ExecError::UnknownVariable(var.to_string());
        match var {
            Var::Local(id) => {
                let ty = self.func.local(id).ok_or_else(unknown)?.ty;
                *self.locals.get_mut(id.0 as usize).ok_or_else(unknown)? = ty.normalize(value);
            }
            Var::Global(id) => {
                let ty = *self.globals_ty.get(id.0 as usize).ok_or_else(unknown)?;
                *self.globals.get_mut(id.0 as usize).ok_or_else(unknown)? = ty.normalize(value);
            }
        }
        Ok(())
    }

    fn operand(&self, op: Operand) -> Result<i64, ExecError> {
        match op {
            Operand::Var(v) => self.read(v),
            Operand::Const(c) => Ok(c),
        }
    }

    fn eval(&self, value: &Rvalue, block: NodeIndex) -> Result<i64, ExecError> {
        Ok(match value {
            Rvalue::Use(a) => self.operand(*a)?,
            Rvalue::Unary(UnOp::Not, a) => !self.operand(*a)?,
            Rvalue::Unary(UnOp::Neg, a) => self.operand(*a)?.wrapping_neg(),
            Rvalue::Binary(op, a, b) => {
                let (a, b) = (self.operand(*a)?, self.operand(*b)?);
                match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::Div | BinOp::Rem if b == 0 => {
                        return Err(ExecError::DivisionByZero(block.index()));
                    }
                    BinOp::Div => a.wrapping_div(b),
                    BinOp::Rem => a.wrapping_rem(b),
                    BinOp::And => a & b,
                    BinOp::Or => a | b,
                    BinOp::Xor => a ^ b,
                    BinOp::Shl => a.wrapping_shl(b as u32),
                    BinOp::Shr => a.wrapping_shr(b as u32),
                }
            }
            Rvalue::Compare(op, a, b) => i64::from(op.holds(self.operand(*a)?, self.operand(*b)?)),
            Rvalue::Select {
                cond,
                on_true,
                on_false,
            } => {
                if cond.op.holds(self.operand(cond.lhs)?, self.operand(cond.rhs)?) {
                    self.operand(*on_true)?
                } else {
                    self.operand(*on_false)?
                }
            }
        })
    }

    /// Successor along the edge of the given kind, or the only successor when `kind` is `None`.
    fn follow(&self, block: NodeIndex, kind: Option<EdgeType>) -> Result<NodeIndex, ExecError> {
        let succs = self.func.succ_edges(block);
        let edge = match kind {
            Some(kind) => succs.into_iter().find(|&e| self.func.edge_kind(e) == kind),
            None if succs.len() == 1 => succs.first().copied(),
            None => None,
        };
        edge.map(|e| self.func.edge_endpoints(e).1)
            .ok_or(ExecError::Stuck(block.index()))
    }
}

/// Calls `func` with `args`, executing at most `fuel` blocks.
pub fn execute(
    func: &Function,
    globals: &GlobalTable,
    args: &[i64],
    fuel: u64,
) -> Result<Outcome, ExecError> {
    if args.len() != func.params.len() {
        return Err(ExecError::ArgumentCount {
            expected: func.params.len(),
            got: args.len(),
        });
    }
    let mut m = Machine {
        func,
        globals_ty: globals.iter().map(|(_, g)| g.ty).collect(),
        locals: vec![0; func.locals.len()],
        globals: globals.iter().map(|(_, g)| g.init).collect(),
    };
    for (param, &arg) in func.params.iter().zip(args) {
        m.write(Var::Local(*param), arg)?;
    }

    let mut block = m.follow(func.entry, None)?;
    let mut steps = 0u64;
    let mut ret = None;
    while block != func.exit {
        if steps == fuel {
            return Err(ExecError::OutOfFuel(fuel));
        }
        steps += 1;

        let mut next = None;
        for stmt in func.block(block).stmts() {
            match stmt {
                Stmt::Assign { dest, value } => {
                    let v = m.eval(value, block)?;
                    m.write(*dest, v)?;
                }
                Stmt::Nop => {}
                Stmt::Cond(c) => {
                    let taken = c.op.holds(m.operand(c.lhs)?, m.operand(c.rhs)?);
                    let kind = if taken {
                        EdgeType::BranchTrue
                    } else {
                        EdgeType::BranchFalse
                    };
                    next = Some(m.follow(block, Some(kind))?);
                }
                Stmt::Switch(s) => next = Some(s.target_for(m.read(s.index)?)),
                Stmt::Return(value) => {
                    ret = match (value, func.ret_ty) {
                        (Some(op), Some(ty)) => Some(ty.normalize(m.operand(*op)?)),
                        (Some(op), None) => Some(m.operand(*op)?),
                        (None, _) => None,
                    };
                    next = Some(func.exit);
                }
            }
        }
        block = match next {
            Some(n) => n,
            None => m.follow(block, None)?,
        };
    }

    Ok(Outcome {
        ret,
        globals: m.globals,
        steps,
    })
}
