use thiserror::Error;

/// Error type for CFG and IR construction and structural verification.
///
/// Block references are raw node indices so this crate stays independent of the graph library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfgIrError {
    /// The function has no usable entry block.
    #[error("no valid entry block found")]
    NoEntryBlock,
    /// The function has no usable exit block.
    #[error("no valid exit block found")]
    NoExitBlock,
    /// The entry block must have exactly one successor and no predecessors.
    #[error("entry block {0} must have no predecessors and exactly one successor")]
    MalformedEntry(usize),
    /// The exit block must not have successors.
    #[error("exit block {0} has outgoing edges")]
    MalformedExit(usize),
    /// A body block is not reachable by any edge.
    #[error("block {0} has no incoming edges")]
    NoPredecessors(usize),
    /// A body block has no way to continue.
    #[error("block {0} has no outgoing edges")]
    NoSuccessors(usize),
    /// A conditional block does not carry exactly one true and one false edge.
    #[error("conditional block {0} must have exactly one true and one false edge")]
    BadBranchEdges(usize),
    /// A branch-kind edge leaves a block that does not end in a conditional.
    #[error("block {0} has branch edges but does not end in a conditional")]
    StrayBranchEdge(usize),
    /// A switch label has no matching CFG edge.
    #[error("switch in block {block} targets {target} without an edge")]
    MissingSwitchEdge { block: usize, target: usize },
    /// A return statement must lead straight to the exit block.
    #[error("return in block {0} must have the exit block as its single successor")]
    BadReturn(usize),
    /// A plain block has more than one successor.
    #[error("block {0} falls through to {1} successors")]
    AmbiguousFallthrough(usize, usize),
    /// A terminator statement appears before the end of its block.
    #[error("terminator in the middle of block {0}")]
    MisplacedTerminator(usize),
    /// The layout order is inconsistent with the graph.
    #[error("block layout is inconsistent: {0}")]
    BadLayout(String),
    /// A body block is not attached to any loop of the function's loop tree.
    #[error("block {0} is not attached to a known loop")]
    DetachedFromLoop(usize),
    /// A statement refers to a variable that does not exist.
    #[error("unknown variable {0}")]
    UnknownVariable(String),
    /// The instruction sequence is invalid (e.g., malformed control flow).
    #[error("invalid instruction sequence")]
    InvalidSequence,
}

/// Error type for metrics computation.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("CFG is empty or malformed")]
    EmptyCfg,
    #[error("no body blocks found")]
    NoBodyBlocks,
}

/// Error type for transform operations.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A block's terminator shape is not one the transform understands.
    #[error("unsupported block shape at block {block}: {reason}")]
    UnsupportedShape { block: usize, reason: String },
    /// The rewritten function failed structural verification.
    #[error("core operation failed: {0}")]
    CoreError(#[from] CfgIrError),
}

/// Errors raised while turning external settings into an obfuscation configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("seed argument malformed: `{0}` (expected 8 hex digits, optionally 0x-prefixed)")]
    MalformedSeed(String),
    #[error("seed hex decode failed: {0}")]
    SeedHex(#[from] hex::FromHexError),
    #[error("subLoop argument malformed: `{0}`")]
    MalformedSubLoop(String),
}

/// Errors produced by the reference interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("division by zero in block {0}")]
    DivisionByZero(usize),
    #[error("execution did not finish within {0} block steps")]
    OutOfFuel(u64),
    #[error("expected {expected} arguments, got {got}")]
    ArgumentCount { expected: usize, got: usize },
    #[error("block {0} has no edge to follow")]
    Stuck(usize),
    #[error("unknown variable {0}")]
    UnknownVariable(String),
}

/// Errors from semantic equivalence checking.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("functions differ in signature: {0}")]
    SignatureMismatch(String),
    #[error("reference run failed: {0}")]
    Reference(#[from] ExecError),
}

/// Errors that can occur during module obfuscation.
#[derive(Debug, Error)]
pub enum ObfuscateError {
    /// The input module failed structural verification; nothing was transformed.
    #[error("function `{function}` is malformed: {source}")]
    Malformed {
        function: String,
        #[source]
        source: CfgIrError,
    },
}
