//! Graph analyses over a function's CFG: dominance, natural loops and obfuscation metrics.

pub mod dominance;
pub mod loops;
pub mod metrics;
