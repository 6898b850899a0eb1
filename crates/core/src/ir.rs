//! Statement-level intermediate representation.
//!
//! Statements are kept in a flat, three-address form: every operand of an [`Rvalue`] is either a
//! variable or a constant. Deeper expressions are written as [`Expr`] trees and lowered through
//! [`crate::cfg_ir::Function::gimplify`], which spills every interior node into a fresh
//! temporary.

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops;

/// Integer types understood by the IR.
///
/// Values of every type are carried in an `i64` normalized to the type's width, so comparisons
/// between normalized values are numerically correct for both signed and unsigned types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ty {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
}

impl Ty {
    /// Width of the type in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::I8 | Self::U8 => 8,
            Self::I16 | Self::U16 => 16,
            Self::I32 | Self::U32 => 32,
            Self::I64 => 64,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Truncates `value` to this type's width and re-extends it.
    pub const fn normalize(self, value: i64) -> i64 {
        let bits = self.bits();
        if bits == 64 {
            return value;
        }
        let mask = (1i64 << bits) - 1;
        let low = value & mask;
        if self.is_signed() && (low >> (bits - 1)) & 1 == 1 {
            low | !mask
        } else {
            low
        }
    }

    /// Smallest representable value.
    pub const fn min_value(self) -> i64 {
        if self.is_signed() {
            if self.bits() == 64 {
                i64::MIN
            } else {
                -(1i64 << (self.bits() - 1))
            }
        } else {
            0
        }
    }

    /// Largest representable value.
    pub const fn max_value(self) -> i64 {
        match (self.is_signed(), self.bits()) {
            (true, 64) => i64::MAX,
            (true, bits) => (1i64 << (bits - 1)) - 1,
            (false, bits) => (1i64 << bits) - 1,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
        };
        f.write_str(name)
    }
}

/// Index of a function-owned variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub u32);

/// Index of a module-wide global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId(pub u32);

/// A variable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Var {
    Local(LocalId),
    Global(GlobalId),
}

/// How a local came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalKind {
    /// Function parameter, bound from the caller's arguments.
    Param,
    /// User-level variable produced by the front end.
    User,
    /// Compiler-introduced temporary.
    Temp,
}

/// A function-owned variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Local {
    pub name: String,
    pub ty: Ty,
    pub kind: LocalKind,
}

/// A process-wide global variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    pub ty: Ty,
    /// Initial value, normalized to `ty`.
    pub init: i64,
    /// Externally visible for linkage purposes.
    pub public: bool,
}

/// The globals of one compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalTable {
    globals: Vec<Global>,
}

impl GlobalTable {
    pub const fn new() -> Self {
        Self {
            globals: Vec::new(),
        }
    }

    /// Declares a new global and returns its id.
    pub fn declare(&mut self, name: impl Into<String>, ty: Ty, init: i64, public: bool) -> GlobalId {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(Global {
            name: name.into(),
            ty,
            init: ty.normalize(init),
            public,
        });
        id
    }

    pub fn get(&self, id: GlobalId) -> Option<&Global> {
        self.globals.get(id.0 as usize)
    }

    pub fn lookup(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .position(|g| g.name == name)
            .map(|i| GlobalId(i as u32))
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GlobalId, &Global)> {
        self.globals
            .iter()
            .enumerate()
            .map(|(i, g)| (GlobalId(i as u32), g))
    }
}

/// A leaf operand: a variable or an integer constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Var(Var),
    Const(i64),
}

impl From<Var> for Operand {
    fn from(v: Var) -> Self {
        Self::Var(v)
    }
}

impl From<i64> for Operand {
    fn from(c: i64) -> Self {
        Self::Const(c)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    /// Bitwise complement.
    Not,
    /// Two's complement negation.
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinOp {
    /// True for the two-operand bitwise operations.
    pub const fn is_bitwise(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Xor)
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub const fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// A flat comparison `lhs op rhs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub op: CmpOp,
    pub lhs: Operand,
    pub rhs: Operand,
}

/// Right-hand side of an assignment, in flat form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rvalue {
    Use(Operand),
    Unary(UnOp, Operand),
    Binary(BinOp, Operand, Operand),
    /// Evaluates to 1 when the comparison holds, 0 otherwise.
    Compare(CmpOp, Operand, Operand),
    /// `cond ? on_true : on_false`.
    Select {
        cond: Condition,
        on_true: Operand,
        on_false: Operand,
    },
}

/// One case of a switch dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseLabel {
    pub value: i64,
    pub target: NodeIndex,
}

/// Multi-way dispatch on a variable. Labels are kept sorted by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchStmt {
    pub index: Var,
    pub cases: Vec<CaseLabel>,
    pub default: NodeIndex,
}

impl SwitchStmt {
    /// Target selected for `value`.
    pub fn target_for(&self, value: i64) -> NodeIndex {
        self.cases
            .binary_search_by_key(&value, |c| c.value)
            .map_or(self.default, |i| self.cases[i].target)
    }

    /// Rewrites every label (including the default) that points at `old`.
    pub fn retarget(&mut self, old: NodeIndex, new: NodeIndex) {
        for case in self.cases.iter_mut().filter(|c| c.target == old) {
            case.target = new;
        }
        if self.default == old {
            self.default = new;
        }
    }
}

/// An IR statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stmt {
    Assign { dest: Var, value: Rvalue },
    /// Conditional branch selecting the block's `BranchTrue`/`BranchFalse` edge.
    Cond(Condition),
    Nop,
    Switch(SwitchStmt),
    /// Leaves the function; the block's single successor is the exit.
    Return(Option<Operand>),
}

impl Stmt {
    /// Statements that decide where control goes next.
    pub const fn is_terminator(&self) -> bool {
        matches!(self, Self::Cond(_) | Self::Switch(_) | Self::Return(_))
    }

    /// Variables read by the statement.
    pub fn uses(&self) -> Vec<Var> {
        fn push(out: &mut Vec<Var>, op: &Operand) {
            if let Operand::Var(v) = op {
                out.push(*v);
            }
        }
        let mut out = Vec::new();
        match self {
            Self::Assign { value, .. } => match value {
                Rvalue::Use(a) | Rvalue::Unary(_, a) => push(&mut out, a),
                Rvalue::Binary(_, a, b) | Rvalue::Compare(_, a, b) => {
                    push(&mut out, a);
                    push(&mut out, b);
                }
                Rvalue::Select {
                    cond,
                    on_true,
                    on_false,
                } => {
                    push(&mut out, &cond.lhs);
                    push(&mut out, &cond.rhs);
                    push(&mut out, on_true);
                    push(&mut out, on_false);
                }
            },
            Self::Cond(c) => {
                push(&mut out, &c.lhs);
                push(&mut out, &c.rhs);
            }
            Self::Switch(s) => out.push(s.index),
            Self::Return(Some(op)) => push(&mut out, op),
            Self::Return(None) | Self::Nop => {}
        }
        out
    }

    /// Variable written by the statement, if any.
    pub const fn def(&self) -> Option<Var> {
        match self {
            Self::Assign { dest, .. } => Some(*dest),
            _ => None,
        }
    }
}

/// Expression tree used to build code before it is flattened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Leaf(Operand),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// Comparison whose operands are evaluated at `operand_ty`; the result is a `Bool`.
    Compare {
        op: CmpOp,
        operand_ty: Ty,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub const fn var(v: Var) -> Self {
        Self::Leaf(Operand::Var(v))
    }

    pub const fn konst(c: i64) -> Self {
        Self::Leaf(Operand::Const(c))
    }

    pub fn binary(op: BinOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn compare(op: CmpOp, operand_ty: Ty, lhs: Self, rhs: Self) -> Self {
        Self::Compare {
            op,
            operand_ty,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

macro_rules! expr_binop {
    ($tr:ident, $method:ident, $op:expr) => {
        impl ops::$tr for Expr {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self {
                Self::binary($op, self, rhs)
            }
        }
    };
}

expr_binop!(BitAnd, bitand, BinOp::And);
expr_binop!(BitOr, bitor, BinOp::Or);
expr_binop!(BitXor, bitxor, BinOp::Xor);
expr_binop!(Add, add, BinOp::Add);
expr_binop!(Sub, sub, BinOp::Sub);
expr_binop!(Mul, mul, BinOp::Mul);

impl ops::Not for Expr {
    type Output = Self;

    fn not(self) -> Self {
        Self::Unary(UnOp::Not, Box::new(self))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(v) => write!(f, "{v}"),
            Self::Const(c) => write!(f, "{c}"),
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(LocalId(i)) => write!(f, "_{i}"),
            Self::Global(GlobalId(i)) => write!(f, "$g{i}"),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op.symbol(), self.rhs)
    }
}

impl fmt::Display for Rvalue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Use(a) => write!(f, "{a}"),
            Self::Unary(UnOp::Not, a) => write!(f, "~{a}"),
            Self::Unary(UnOp::Neg, a) => write!(f, "-{a}"),
            Self::Binary(op, a, b) => write!(f, "{a} {} {b}", op.symbol()),
            Self::Compare(op, a, b) => write!(f, "{a} {} {b}", op.symbol()),
            Self::Select {
                cond,
                on_true,
                on_false,
            } => write!(f, "{cond} ? {on_true} : {on_false}"),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assign { dest, value } => write!(f, "{dest} = {value};"),
            Self::Cond(c) => write!(f, "if ({c})"),
            Self::Nop => f.write_str("nop;"),
            Self::Switch(s) => {
                write!(f, "switch ({}) <default: bb{}", s.index, s.default.index())?;
                for case in &s.cases {
                    write!(f, ", case {}: bb{}", case.value, case.target.index())?;
                }
                f.write_str(">")
            }
            Self::Return(Some(op)) => write!(f, "return {op};"),
            Self::Return(None) => f.write_str("return;"),
        }
    }
}
