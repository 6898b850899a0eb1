//! Incremental construction of a [`Function`].

use crate::ir::{CaseLabel, Condition, GlobalTable, LocalKind, Operand, Rvalue, Stmt, SwitchStmt, Ty, Var};
use murk_utils::errors::CfgIrError;
use petgraph::stable_graph::NodeIndex;

use super::{EdgeType, Function, LoopId};

/// Builds a function block by block, the way a front end lowers source code.
///
/// Blocks are laid out in creation order and the first block created becomes the entry's
/// successor. Every block must be closed with [`goto`](Self::goto), [`branch`](Self::branch),
/// [`switch`](Self::switch) or [`ret`](Self::ret) before [`finish`](Self::finish), which runs
/// the structural verifier.
///
/// # Examples
/// ```rust,ignore
/// let mut b = FunctionBuilder::new("abs");
/// let x = b.param("x", Ty::I32);
/// b.returns(Ty::I32);
/// let test = b.block();
/// let neg = b.block();
/// let done = b.block();
/// b.branch(test, Condition { op: CmpOp::Lt, lhs: x.into(), rhs: 0.into() }, neg, done);
/// b.assign(neg, x, Rvalue::Unary(UnOp::Neg, x.into()));
/// b.goto(neg, done);
/// b.ret(done, Some(x.into()));
/// let func = b.finish(&GlobalTable::new())?;
/// ```
#[derive(Debug)]
pub struct FunctionBuilder {
    func: Function,
    blocks: Vec<NodeIndex>,
    back_edges: usize,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            func: Function::new(name),
            blocks: Vec::new(),
            back_edges: 0,
        }
    }

    /// Declares a parameter; parameters bind call arguments in declaration order.
    pub fn param(&mut self, name: &str, ty: Ty) -> Var {
        self.func.new_local(name, ty, LocalKind::Param)
    }

    pub fn local(&mut self, name: &str, ty: Ty) -> Var {
        self.func.new_local(name, ty, LocalKind::User)
    }

    pub fn returns(&mut self, ty: Ty) {
        self.func.ret_ty = Some(ty);
    }

    /// Attaches an obfuscation attribute token such as `"fla"` or `"nobcf"`.
    pub fn attribute(&mut self, token: &str) {
        self.func.attributes.push(token.to_owned());
    }

    /// Appends a new empty block to the layout.
    pub fn block(&mut self) -> NodeIndex {
        let node = self.func.add_block(LoopId::ROOT, self.func.exit);
        self.blocks.push(node);
        node
    }

    pub fn push(&mut self, block: NodeIndex, stmt: Stmt) {
        self.func.stmts_mut(block).push(stmt);
    }

    pub fn assign(&mut self, block: NodeIndex, dest: Var, value: Rvalue) {
        self.push(block, Stmt::Assign { dest, value });
    }

    /// Ends `block` with an unconditional transfer to `target`.
    pub fn goto(&mut self, block: NodeIndex, target: NodeIndex) {
        let kind = if self.position(target) == self.position(block) + 1 {
            EdgeType::Fallthrough
        } else {
            EdgeType::Jump
        };
        self.edge(block, target, kind);
    }

    /// Ends `block` with a conditional branch.
    pub fn branch(
        &mut self,
        block: NodeIndex,
        cond: Condition,
        on_true: NodeIndex,
        on_false: NodeIndex,
    ) {
        self.push(block, Stmt::Cond(cond));
        self.edge(block, on_true, EdgeType::BranchTrue);
        self.edge(block, on_false, EdgeType::BranchFalse);
    }

    /// Ends `block` with a multi-way dispatch on `index`. Labels are sorted by value; one edge is
    /// added per distinct target.
    pub fn switch(
        &mut self,
        block: NodeIndex,
        index: Var,
        cases: Vec<(i64, NodeIndex)>,
        default: NodeIndex,
    ) {
        let mut cases: Vec<CaseLabel> = cases
            .into_iter()
            .map(|(value, target)| CaseLabel { value, target })
            .collect();
        cases.sort_by_key(|c| c.value);
        cases.dedup_by_key(|c| c.value);

        let mut targets: Vec<NodeIndex> = cases.iter().map(|c| c.target).collect();
        targets.push(default);
        targets.sort();
        targets.dedup();
        for target in targets {
            self.edge(block, target, EdgeType::Jump);
        }
        self.push(
            block,
            Stmt::Switch(SwitchStmt {
                index,
                cases,
                default,
            }),
        );
    }

    /// Ends `block` with a return.
    pub fn ret(&mut self, block: NodeIndex, value: Option<Operand>) {
        self.push(block, Stmt::Return(value));
        let exit = self.func.exit;
        self.func.make_edge(block, exit, EdgeType::Jump);
    }

    fn position(&self, block: NodeIndex) -> usize {
        self.blocks
            .iter()
            .position(|&b| b == block)
            .unwrap_or_else(|| panic!("block {} was not created by this builder", block.index()))
    }

    fn edge(&mut self, src: NodeIndex, dst: NodeIndex, kind: EdgeType) {
        if self.position(dst) <= self.position(src) {
            self.back_edges += 1;
        }
        self.func.make_edge(src, dst, kind);
    }

    /// Wires the entry block and verifies the result against `globals`.
    pub fn finish(mut self, globals: &GlobalTable) -> Result<Function, CfgIrError> {
        let first = *self.blocks.first().ok_or(CfgIrError::NoEntryBlock)?;
        let entry = self.func.entry;
        self.func.make_edge(entry, first, EdgeType::Fallthrough);
        if self.back_edges > 0 {
            // Blocks all start in the root loop until the loop tree is re-derived.
            self.func.mark_loops_for_fixup();
        }
        self.func.verify_in(globals)?;
        tracing::debug!(
            "built function {} with {} blocks",
            self.func.name,
            self.blocks.len()
        );
        Ok(self.func)
    }
}
