//! Murk Verification
//!
//! Empirical evidence that an obfuscated function behaves like its original:
//!
//! 1. **Semantics**: a reference interpreter for the function IR
//! 2. **Equivalence**: running both versions on boundary and random inputs and comparing return
//!    values and global state

pub mod equivalence;
pub mod semantics;

pub use equivalence::{EquivalenceReport, SampleConfig, check_equivalence, check_module_equivalence};
pub use semantics::{Outcome, execute};
