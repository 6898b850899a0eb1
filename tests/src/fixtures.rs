//! Functions shared by the integration tests.

use murk_core::cfg_ir::{Function, FunctionBuilder, Module};
use murk_core::ir::{BinOp, CmpOp, Condition, GlobalTable, Operand, Rvalue, Ty, Var};
use petgraph::stable_graph::NodeIndex;

pub(crate) const MAGIC: i64 = 0xBAAA_D0BF;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn eq(lhs: Var, rhs: i64) -> Condition {
    Condition {
        op: CmpOp::Eq,
        lhs: Operand::Var(lhs),
        rhs: Operand::Const(rhs),
    }
}

/// Four-way dispatch on `n % 4`, each arm mixing `n` with a constant through bitwise operators.
///
/// ```text
/// target(n) = match n % 4 {
///     0 => (n | MAGIC) * (2 ^ n),
///     1 => (n & MAGIC) * (3 + n),
///     2 => (n ^ MAGIC) * (4 | n),
///     _ => (n + MAGIC) * (5 & n),
/// }
/// ```
pub(crate) fn target(globals: &GlobalTable) -> Function {
    let mut b = FunctionBuilder::new("target");
    let n = b.param("n", Ty::U32);
    let m = b.local("mod", Ty::U32);
    let result = b.local("result", Ty::U32);
    let lhs = b.local("lhs", Ty::U32);
    let rhs = b.local("rhs", Ty::U32);
    b.returns(Ty::U32);

    let test0 = b.block();
    let arm0 = b.block();
    let test1 = b.block();
    let arm1 = b.block();
    let test2 = b.block();
    let arm2 = b.block();
    let arm3 = b.block();
    let done = b.block();

    let n_op = Operand::Var(n);
    b.assign(test0, m, Rvalue::Binary(BinOp::Rem, n_op, Operand::Const(4)));
    b.assign(test0, result, Rvalue::Use(Operand::Const(0)));
    b.branch(test0, eq(m, 0), arm0, test1);
    b.branch(test1, eq(m, 1), arm1, test2);
    b.branch(test2, eq(m, 2), arm2, arm3);

    let arms = [
        (arm0, BinOp::Or, BinOp::Xor, 2),
        (arm1, BinOp::And, BinOp::Add, 3),
        (arm2, BinOp::Xor, BinOp::Or, 4),
        (arm3, BinOp::Add, BinOp::And, 5),
    ];
    for (arm, mix, combine, k) in arms {
        b.assign(arm, lhs, Rvalue::Binary(mix, n_op, Operand::Const(MAGIC)));
        b.assign(arm, rhs, Rvalue::Binary(combine, Operand::Const(k), n_op));
        b.assign(arm, result, Rvalue::Binary(BinOp::Mul, Operand::Var(lhs), Operand::Var(rhs)));
        b.goto(arm, done);
    }
    b.ret(done, Some(Operand::Var(result)));
    b.finish(globals).unwrap()
}

/// Rotating checksum over `0..len`, tagged `nobcf` and `fla` and counting its calls in `calls`.
pub(crate) fn checksum(globals: &mut GlobalTable) -> Function {
    let calls = Var::Global(
        globals
            .lookup("calls")
            .unwrap_or_else(|| globals.declare("calls", Ty::U32, 0, true)),
    );

    let mut b = FunctionBuilder::new("checksum");
    b.attribute("nobcf");
    b.attribute("fla");
    let seed = b.param("seed", Ty::U8);
    let len = b.param("len", Ty::I8);
    let i = b.local("i", Ty::I8);
    let c = b.local("c", Ty::U8);
    let carry = b.local("carry", Ty::U8);
    b.returns(Ty::U8);

    let init = b.block();
    let head = b.block();
    let body = b.block();
    let done = b.block();
    b.assign(init, c, Rvalue::Use(Operand::Var(seed)));
    b.assign(init, i, Rvalue::Use(Operand::Const(0)));
    b.assign(
        init,
        calls,
        Rvalue::Binary(BinOp::Add, Operand::Var(calls), Operand::Const(1)),
    );
    b.goto(init, head);
    b.branch(
        head,
        Condition {
            op: CmpOp::Lt,
            lhs: Operand::Var(i),
            rhs: Operand::Var(len),
        },
        body,
        done,
    );
    b.assign(body, carry, Rvalue::Binary(BinOp::Shr, Operand::Var(c), Operand::Const(7)));
    b.assign(body, c, Rvalue::Binary(BinOp::Shl, Operand::Var(c), Operand::Const(1)));
    b.assign(body, c, Rvalue::Binary(BinOp::Or, Operand::Var(c), Operand::Var(carry)));
    b.assign(body, c, Rvalue::Binary(BinOp::Xor, Operand::Var(c), Operand::Var(i)));
    b.assign(body, i, Rvalue::Binary(BinOp::Add, Operand::Var(i), Operand::Const(1)));
    b.goto(body, head);
    b.ret(done, Some(Operand::Var(c)));
    b.finish(globals).unwrap()
}

/// `entry -> A -> B (branch) -> {C, D} -> exit`, with C and D returning.
pub(crate) fn five_block() -> (Function, [NodeIndex; 4]) {
    let mut b = FunctionBuilder::new("five");
    let x = b.param("x", Ty::I32);
    let y = b.local("y", Ty::I32);
    b.returns(Ty::I32);
    let a = b.block();
    let bb = b.block();
    let c = b.block();
    let d = b.block();
    b.assign(a, y, Rvalue::Binary(BinOp::Add, Operand::Var(x), Operand::Const(1)));
    b.goto(a, bb);
    b.branch(
        bb,
        Condition {
            op: CmpOp::Gt,
            lhs: Operand::Var(y),
            rhs: Operand::Const(10),
        },
        c,
        d,
    );
    b.ret(c, Some(Operand::Var(y)));
    b.assign(d, y, Rvalue::Binary(BinOp::Xor, Operand::Var(y), Operand::Var(x)));
    b.ret(d, Some(Operand::Var(y)));
    (b.finish(&GlobalTable::new()).unwrap(), [a, bb, c, d])
}

/// A module holding [`target`] and [`checksum`].
pub(crate) fn sample_module() -> Module {
    let mut globals = GlobalTable::new();
    let checksum = checksum(&mut globals);
    let target = target(&globals);
    Module {
        globals,
        functions: vec![target, checksum],
    }
}
