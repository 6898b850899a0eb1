/// Module for the Control Flow Graph (CFG) of a function and the IR statements it carries.
///
/// A [`Function`] owns a petgraph `StableDiGraph` whose nodes are [`Block`]s and whose edges are
/// tagged with an [`EdgeType`]. Stable indices are used so block and edge identities survive the
/// removals performed by the obfuscation passes. Besides the graph the function keeps a layout
/// order (entry first, exit last), loop membership bookkeeping and cached dominance information
/// that passes invalidate when they reshape the graph.
use crate::ir::{Expr, GlobalTable, Local, LocalId, LocalKind, Operand, Rvalue, Stmt, Ty, Var};
use murk_utils::errors::CfgIrError;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use self::builder::FunctionBuilder;

mod builder;
mod updates;
mod verify;

/// Represents a node in the Control Flow Graph (CFG).
///
/// `Entry` and `Exit` are the distinguished start and end nodes and never carry statements.
/// Body blocks hold an ordered statement list and the innermost loop they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    /// The entry point of the CFG, representing the start of execution.
    Entry,
    /// The exit point of the CFG, reached by every return.
    Exit,
    /// An ordinary basic block.
    Body {
        /// The statements of the block, in execution order.
        stmts: Vec<Stmt>,
        /// Innermost loop containing the block. `None` only while a block is being moved
        /// between loops.
        loop_id: Option<LoopId>,
    },
}

impl Block {
    /// Creates an empty body block inside `loop_id`.
    pub const fn empty(loop_id: LoopId) -> Self {
        Self::Body {
            stmts: Vec::new(),
            loop_id: Some(loop_id),
        }
    }

    pub const fn is_body(&self) -> bool {
        matches!(self, Self::Body { .. })
    }

    /// The statements of the block; empty for entry and exit.
    pub fn stmts(&self) -> &[Stmt] {
        match self {
            Self::Body { stmts, .. } => stmts,
            Self::Entry | Self::Exit => &[],
        }
    }

    pub fn last_stmt(&self) -> Option<&Stmt> {
        self.stmts().last()
    }
}

/// Represents the type of edge connecting blocks in the CFG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    /// Sequential execution to the next block.
    Fallthrough,
    /// Unconditional transfer to a target block.
    Jump,
    /// Conditional branch taken when the block's condition is true.
    BranchTrue,
    /// Conditional branch taken when the block's condition is false.
    BranchFalse,
    /// Reachability-only edge with no branch meaning, e.g. from a dispatch switch.
    Untyped,
}

/// Identifier of a natural loop in a function's [`LoopTree`]. Loop 0 is the root, which stands
/// for the whole function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoopId(pub u32);

impl LoopId {
    pub const ROOT: Self = Self(0);
}

/// One loop of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loop {
    pub parent: Option<LoopId>,
    pub header: Option<NodeIndex>,
    pub depth: u32,
}

/// Loop nesting structure of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopTree {
    loops: Vec<Loop>,
    needs_fixup: bool,
}

impl Default for LoopTree {
    fn default() -> Self {
        Self {
            loops: vec![Loop {
                parent: None,
                header: None,
                depth: 0,
            }],
            needs_fixup: false,
        }
    }
}

impl LoopTree {
    /// Adds a loop nested in `parent` and returns its id.
    pub fn add_loop(&mut self, parent: LoopId, header: NodeIndex) -> LoopId {
        let depth = self.get(parent).depth + 1;
        let id = LoopId(self.loops.len() as u32);
        self.loops.push(Loop {
            parent: Some(parent),
            header: Some(header),
            depth,
        });
        id
    }

    /// Returns the loop with the given id; panics on an unknown id.
    pub fn get(&self, id: LoopId) -> &Loop {
        self.loops
            .get(id.0 as usize)
            .unwrap_or_else(|| panic!("loop {} does not exist", id.0))
    }

    pub(crate) fn get_mut(&mut self, id: LoopId) -> &mut Loop {
        self.loops
            .get_mut(id.0 as usize)
            .unwrap_or_else(|| panic!("loop {} does not exist", id.0))
    }

    pub fn contains(&self, id: LoopId) -> bool {
        (id.0 as usize) < self.loops.len()
    }

    /// Number of loops, including the root.
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Innermost loop containing both `a` and `b`.
    pub fn common(&self, a: LoopId, b: LoopId) -> LoopId {
        let (mut a, mut b) = (a, b);
        while self.get(a).depth > self.get(b).depth {
            a = self.get(a).parent.unwrap_or(LoopId::ROOT);
        }
        while self.get(b).depth > self.get(a).depth {
            b = self.get(b).parent.unwrap_or(LoopId::ROOT);
        }
        while a != b {
            a = self.get(a).parent.unwrap_or(LoopId::ROOT);
            b = self.get(b).parent.unwrap_or(LoopId::ROOT);
        }
        a
    }

    /// True if the tree no longer reflects the graph and must be re-derived.
    pub const fn needs_fixup(&self) -> bool {
        self.needs_fixup
    }

    pub fn mark_for_fixup(&mut self) {
        self.needs_fixup = true;
    }

    /// Replaces the tree with a freshly derived one.
    pub fn replace(&mut self, loops: Vec<Loop>) {
        assert!(
            loops.first().is_some_and(|root| root.parent.is_none()),
            "loop tree must start with the root loop"
        );
        self.loops = loops;
        self.needs_fixup = false;
    }
}

/// Immediate-dominator tree rooted at `root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomTree {
    pub root: NodeIndex,
    pub idom: HashMap<NodeIndex, NodeIndex>,
}

impl DomTree {
    /// True if `a` dominates `b` (every node dominates itself).
    pub fn dominates(&self, a: NodeIndex, b: NodeIndex) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom.get(&cur) {
                Some(&next) if next != cur => cur = next,
                _ => return false,
            }
        }
    }
}

/// Which dominance relation a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomDirection {
    Dominators,
    PostDominators,
}

/// Analysis results cached on a function. Passes drop them when they go stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisState {
    pub dominators: Option<DomTree>,
    pub post_dominators: Option<DomTree>,
}

/// A function: its CFG, its variables and its obfuscation attribute tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Free-form tokens attached by the front end, e.g. `"nobcf"` or `"fla"`.
    pub attributes: Vec<String>,
    pub params: Vec<LocalId>,
    pub locals: Vec<Local>,
    pub ret_ty: Option<Ty>,
    pub cfg: StableDiGraph<Block, EdgeType>,
    pub entry: NodeIndex,
    pub exit: NodeIndex,
    /// Traversal order of the blocks; entry first, exit last.
    pub layout: Vec<NodeIndex>,
    pub loops: LoopTree,
    #[serde(skip)]
    pub analysis: AnalysisState,
}

impl Function {
    /// Creates a function containing only the entry and exit blocks.
    pub fn new(name: impl Into<String>) -> Self {
        let mut cfg = StableDiGraph::new();
        let entry = cfg.add_node(Block::Entry);
        let exit = cfg.add_node(Block::Exit);
        Self {
            name: name.into(),
            attributes: Vec::new(),
            params: Vec::new(),
            locals: Vec::new(),
            ret_ty: None,
            cfg,
            entry,
            exit,
            layout: vec![entry, exit],
            loops: LoopTree::default(),
            analysis: AnalysisState::default(),
        }
    }

    /// Ordinary blocks in layout order (everything except entry and exit).
    pub fn ordinary_blocks(&self) -> Vec<NodeIndex> {
        self.layout
            .iter()
            .copied()
            .filter(|&n| n != self.entry && n != self.exit)
            .collect()
    }

    /// Returns the block at `node`; panics if it does not exist.
    pub fn block(&self, node: NodeIndex) -> &Block {
        self.cfg
            .node_weight(node)
            .unwrap_or_else(|| panic!("block {} does not exist", node.index()))
    }

    /// Mutable statement list of a body block; panics for entry, exit or a missing block.
    pub fn stmts_mut(&mut self, node: NodeIndex) -> &mut Vec<Stmt> {
        match self.cfg.node_weight_mut(node) {
            Some(Block::Body { stmts, .. }) => stmts,
            Some(_) => panic!("block {} is not a body block", node.index()),
            None => panic!("block {} does not exist", node.index()),
        }
    }

    pub fn last_stmt(&self, node: NodeIndex) -> Option<&Stmt> {
        self.block(node).last_stmt()
    }

    /// Declares a new local variable.
    pub fn new_local(&mut self, name: impl Into<String>, ty: Ty, kind: LocalKind) -> Var {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(Local {
            name: name.into(),
            ty,
            kind,
        });
        if kind == LocalKind::Param {
            self.params.push(id);
        }
        Var::Local(id)
    }

    /// Declares a fresh compiler temporary.
    pub fn new_temp(&mut self, ty: Ty) -> Var {
        let name = format!("_{}", self.locals.len());
        self.new_local(name, ty, LocalKind::Temp)
    }

    pub fn local(&self, id: LocalId) -> Option<&Local> {
        self.locals.get(id.0 as usize)
    }

    /// Type of a variable, if it resolves.
    pub fn var_ty(&self, var: Var, globals: &GlobalTable) -> Option<Ty> {
        match var {
            Var::Local(id) => self.local(id).map(|l| l.ty),
            Var::Global(id) => globals.get(id).map(|g| g.ty),
        }
    }

    /// Lowers an expression tree into flat form.
    ///
    /// Every interior node below the root is computed into a fresh temporary; the statements
    /// computing them are appended to `out` in evaluation order and the root is returned as a
    /// single flat [`Rvalue`]. Arithmetic temporaries get type `ty`, comparison temporaries get
    /// `Bool`.
    pub fn gimplify(&mut self, expr: Expr, ty: Ty, out: &mut Vec<Stmt>) -> Rvalue {
        match expr {
            Expr::Leaf(op) => Rvalue::Use(op),
            Expr::Unary(op, a) => Rvalue::Unary(op, self.gimplify_operand(*a, ty, out)),
            Expr::Binary(op, a, b) => {
                let a = self.gimplify_operand(*a, ty, out);
                let b = self.gimplify_operand(*b, ty, out);
                Rvalue::Binary(op, a, b)
            }
            Expr::Compare {
                op,
                operand_ty,
                lhs,
                rhs,
            } => {
                let a = self.gimplify_operand(*lhs, operand_ty, out);
                let b = self.gimplify_operand(*rhs, operand_ty, out);
                Rvalue::Compare(op, a, b)
            }
        }
    }

    fn gimplify_operand(&mut self, expr: Expr, ty: Ty, out: &mut Vec<Stmt>) -> Operand {
        if let Expr::Leaf(op) = expr {
            return op;
        }
        let temp_ty = if matches!(expr, Expr::Compare { .. }) {
            Ty::Bool
        } else {
            ty
        };
        let value = self.gimplify(expr, temp_ty, out);
        let dest = self.new_temp(temp_ty);
        out.push(Stmt::Assign { dest, value });
        Operand::Var(dest)
    }
}

/// A compilation unit: its globals and its functions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub globals: GlobalTable,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Verifies every function against the module's globals.
    pub fn verify(&self) -> Result<(), (String, CfgIrError)> {
        for func in &self.functions {
            func.verify_in(&self.globals)
                .map_err(|e| (func.name.clone(), e))?;
        }
        Ok(())
    }
}
