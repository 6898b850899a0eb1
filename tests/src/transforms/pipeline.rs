use crate::fixtures::{init_tracing, sample_module, target};
use murk_core::cfg_ir::{EdgeType, Function, FunctionBuilder, Module};
use murk_core::ir::{CmpOp, Condition, GlobalTable, Operand, Stmt, Ty};
use murk_transform::flatten::dispatch_switch;
use murk_transform::pass::PassOutcome;
use murk_transform::{ObfuscationConfig, obfuscate_module};
use murk_utils::errors::{CfgIrError, ObfuscateError};

fn statuses(report: &murk_transform::ObfuscationReport, function: &str) -> Vec<&'static str> {
    let entry = report
        .functions
        .iter()
        .find(|f| f.function == function)
        .unwrap();
    entry
        .passes
        .iter()
        .map(|p| match p.outcome {
            PassOutcome::Applied { .. } => "applied",
            PassOutcome::Skipped => "skipped",
            PassOutcome::Failed { .. } => "failed",
        })
        .collect()
}

/// Four blocks where the first may leave the function straight from its conditional branch.
fn early_exit() -> Function {
    let mut b = FunctionBuilder::new("early");
    let x = b.param("x", Ty::I32);
    let blocks: Vec<_> = (0..4).map(|_| b.block()).collect();
    b.goto(blocks[0], blocks[1]);
    b.goto(blocks[1], blocks[2]);
    b.goto(blocks[2], blocks[3]);
    b.ret(blocks[3], None);
    let mut f = b.finish(&GlobalTable::new()).unwrap();
    let edge = f.single_succ_edge(blocks[0]);
    f.set_edge_kind(edge, EdgeType::BranchTrue);
    f.make_edge(blocks[0], f.exit, EdgeType::BranchFalse);
    f.stmts_mut(blocks[0]).push(Stmt::Cond(Condition {
        op: CmpOp::Ne,
        lhs: Operand::Var(x),
        rhs: Operand::Const(0),
    }));
    f.verify().unwrap();
    f
}

#[test]
fn test_attributes_override_defaults() {
    init_tracing();
    let mut module = sample_module();
    let config = ObfuscationConfig {
        enable_bcf: true,
        ..ObfuscationConfig::default()
    };
    let report = obfuscate_module(&mut module, &config).unwrap();

    assert_eq!(statuses(&report, "target"), vec!["skipped", "applied", "skipped"]);
    // checksum carries `nobcf` and `fla`
    assert_eq!(statuses(&report, "checksum"), vec!["skipped", "skipped", "applied"]);
    assert!(dispatch_switch(module.function("checksum").unwrap()).is_some());
    assert!(dispatch_switch(module.function("target").unwrap()).is_none());
}

#[test]
fn test_failure_is_confined_to_its_function() {
    init_tracing();
    let globals = GlobalTable::new();
    let early = early_exit();
    let mut module = Module {
        functions: vec![early.clone(), target(&globals)],
        globals,
    };
    let config = ObfuscationConfig {
        enable_fla: true,
        ..ObfuscationConfig::default()
    };
    let report = obfuscate_module(&mut module, &config).unwrap();

    assert_eq!(report.failed_functions(), vec!["early"]);
    assert_eq!(statuses(&report, "early"), vec!["skipped", "skipped", "failed"]);
    assert_eq!(module.functions[0].layout, early.layout, "failed function is left intact");
    assert_eq!(module.functions[0].cfg.edge_count(), early.cfg.edge_count());
    assert!(dispatch_switch(&module.functions[1]).is_some());
    assert!(module.verify().is_ok());
}

#[test]
fn test_malformed_module_is_untouched() {
    let mut module = sample_module();
    let target = &mut module.functions[0];
    let first = target.layout[1];
    target.stmts_mut(first).insert(0, Stmt::Return(None));
    let snapshot = serde_json::to_value(&module).unwrap();

    let config = ObfuscationConfig {
        enable_sub: true,
        enable_bcf: true,
        enable_fla: true,
        ..ObfuscationConfig::default()
    };
    let err = obfuscate_module(&mut module, &config).unwrap_err();
    assert!(matches!(
        err,
        ObfuscateError::Malformed { ref function, source: CfgIrError::MisplacedTerminator(_) }
            if function == "target"
    ));
    assert_eq!(serde_json::to_value(&module).unwrap(), snapshot);
}

#[test]
fn test_same_seed_same_output() {
    let config = |seed| ObfuscationConfig {
        seed,
        enable_sub: true,
        enable_bcf: true,
        enable_fla: true,
        sub_loop: 1,
    };
    let run = |seed| {
        let mut module = sample_module();
        obfuscate_module(&mut module, &config(seed)).unwrap();
        serde_json::to_string(&module).unwrap()
    };
    assert_eq!(run(7), run(7));
    assert_ne!(run(7), run(8));
}

#[test]
fn test_random_stream_spans_functions() {
    let config = ObfuscationConfig {
        seed: 99,
        enable_fla: true,
        ..ObfuscationConfig::default()
    };
    let case_values = |module: &Module| {
        let (_, switch) = dispatch_switch(module.function("checksum").unwrap()).unwrap();
        switch.cases.iter().map(|c| c.value).collect::<Vec<_>>()
    };

    let mut both = sample_module();
    obfuscate_module(&mut both, &config).unwrap();

    let mut alone = sample_module();
    alone.functions.retain(|f| f.name == "checksum");
    obfuscate_module(&mut alone, &config).unwrap();

    // Flattening `target` first consumes draws, so `checksum` sees a later part of the stream.
    assert_ne!(case_values(&both), case_values(&alone));
}
