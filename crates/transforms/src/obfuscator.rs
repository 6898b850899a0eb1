use crate::config::ObfuscationConfig;
use crate::context::ObfuscationContext;
use crate::pass::{FunctionReport, Pipeline};
use crate::random::RandomEngine;
use murk_core::cfg_ir::Module;
use murk_utils::errors::ObfuscateError;
use serde::{Deserialize, Serialize};

/// Result of obfuscating a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObfuscationReport {
    /// Seed the run's random engine was created with.
    pub seed: u32,
    /// Configuration the run used.
    pub config: ObfuscationConfig,
    /// One entry per function, in module order.
    pub functions: Vec<FunctionReport>,
}

impl ObfuscationReport {
    /// Names of the functions on which some pass failed.
    pub fn failed_functions(&self) -> Vec<&str> {
        self.functions
            .iter()
            .filter(|f| f.failed())
            .map(|f| f.function.as_str())
            .collect()
    }
}

/// Main obfuscation pipeline
///
/// The module is verified up front; if any function is malformed nothing is transformed. Then
/// every function runs through SUB, BCF and FLA in module order, all sharing one random engine
/// and one set of opaque-predicate globals. A pass failure only affects the function it happened
/// in.
pub fn obfuscate_module(
    module: &mut Module,
    config: &ObfuscationConfig,
) -> Result<ObfuscationReport, ObfuscateError> {
    module
        .verify()
        .map_err(|(function, source)| ObfuscateError::Malformed { function, source })?;

    tracing::debug!("Starting obfuscation pipeline:");
    tracing::debug!("  Functions: {}", module.functions.len());
    tracing::debug!("  Seed: 0x{:08x}", config.seed);

    let pipeline = Pipeline::from_config(config);
    let globals = std::mem::take(&mut module.globals);
    let mut ctx = ObfuscationContext::new(RandomEngine::new(config.seed), globals);

    let mut functions = Vec::with_capacity(module.functions.len());
    for func in &mut module.functions {
        functions.push(pipeline.run(func, &mut ctx));
    }
    module.globals = ctx.into_globals();

    let report = ObfuscationReport {
        seed: config.seed,
        config: config.clone(),
        functions,
    };
    let failed = report.failed_functions();
    if !failed.is_empty() {
        tracing::warn!("obfuscation incomplete for: {}", failed.join(", "));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use murk_core::cfg_ir::{Function, FunctionBuilder};
    use murk_core::ir::{BinOp, GlobalTable, Operand, Rvalue, Ty};

    fn chain(name: &str, len: usize) -> Function {
        let mut b = FunctionBuilder::new(name);
        let x = b.param("x", Ty::I32);
        b.returns(Ty::I32);
        let blocks: Vec<_> = (0..len).map(|_| b.block()).collect();
        for pair in blocks.windows(2) {
            b.assign(pair[0], x, Rvalue::Binary(BinOp::Or, Operand::Var(x), Operand::Const(2)));
            b.goto(pair[0], pair[1]);
        }
        b.ret(blocks[len - 1], Some(Operand::Var(x)));
        b.finish(&GlobalTable::new()).unwrap()
    }

    fn config() -> ObfuscationConfig {
        ObfuscationConfig {
            seed: 0xc0ffee,
            enable_sub: true,
            enable_bcf: true,
            enable_fla: true,
            sub_loop: 1,
        }
    }

    #[test]
    fn test_obfuscate_module_shares_globals() {
        let mut module = Module {
            globals: GlobalTable::new(),
            functions: vec![chain("f", 4), chain("g", 5)],
        };
        let report = obfuscate_module(&mut module, &config()).unwrap();
        assert_eq!(report.functions.len(), 2);
        assert!(report.failed_functions().is_empty());
        assert_eq!(module.globals.len(), 2);
        assert!(module.verify().is_ok());
    }

    #[test]
    fn test_malformed_module_is_untouched() {
        let mut broken = chain("broken", 3);
        let first = broken.ordinary_blocks()[0];
        broken.stmts_mut(first).clear();
        broken.stmts_mut(first).push(murk_core::ir::Stmt::Return(None));
        let mut module = Module {
            globals: GlobalTable::new(),
            functions: vec![chain("ok", 4), broken],
        };
        let before = serde_json::to_string(&module).unwrap();

        let err = obfuscate_module(&mut module, &config()).unwrap_err();
        assert!(matches!(err, ObfuscateError::Malformed { ref function, .. } if function == "broken"));
        assert_eq!(serde_json::to_string(&module).unwrap(), before);
    }

    #[test]
    fn test_same_seed_same_output() {
        let run = || {
            let mut module = Module {
                globals: GlobalTable::new(),
                functions: vec![chain("f", 4), chain("g", 6)],
            };
            obfuscate_module(&mut module, &config()).unwrap();
            serde_json::to_string(&module).unwrap()
        };
        assert_eq!(run(), run());
    }
}
