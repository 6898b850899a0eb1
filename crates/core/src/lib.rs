//! Function IR, control-flow graphs and the graph-surgery primitives the obfuscation passes are
//! built on.

pub mod cfg_ir;
pub mod ir;
