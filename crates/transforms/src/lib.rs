//! Obfuscation passes over the function IR: instruction substitution, bogus control flow and
//! control-flow flattening, plus the pipeline that drives them over a module.

pub mod bogus_flow;
pub mod config;
pub mod context;
pub mod flatten;
pub mod gate;
pub mod obfuscator;
pub mod pass;
pub mod random;
pub mod substitution;

pub use bogus_flow::BogusFlow;
pub use config::ObfuscationConfig;
pub use context::ObfuscationContext;
pub use flatten::Flatten;
pub use obfuscator::{ObfuscationReport, obfuscate_module};
pub use pass::Pipeline;
pub use random::RandomEngine;
pub use substitution::Substitution;

use murk_core::cfg_ir::Function;
use murk_utils::errors::TransformError;

/// Trait for function obfuscation transforms.
pub trait Transform: Send + Sync {
    /// Returns the transform's name; it doubles as the attribute token that gates it.
    fn name(&self) -> &'static str;
    /// Applies the transform to one function, returning whether changes were made.
    fn apply(
        &self,
        func: &mut Function,
        ctx: &mut ObfuscationContext,
    ) -> Result<bool, TransformError>;
}
