use crate::fixtures::{init_tracing, target};
use murk_core::cfg_ir::Module;
use murk_core::ir::{GlobalTable, Operand, Rvalue, Stmt, Ty, Var};
use murk_transform::pass::PassOutcome;
use murk_transform::{ObfuscationConfig, obfuscate_module};
use murk_verification::{SampleConfig, check_module_equivalence, execute};

fn bcf_only() -> ObfuscationConfig {
    ObfuscationConfig {
        seed: 0x0bad_cafe,
        enable_bcf: true,
        ..ObfuscationConfig::default()
    }
}

#[test]
fn test_predicate_holds_for_any_global_values() {
    init_tracing();
    // Values that make the first disjunct false and the product odd-looking.
    for (gx, gy) in [(0, 0), (-7, 12_345), (i64::from(i32::MAX), 10), (i64::from(i32::MIN), 9)] {
        let mut globals = GlobalTable::new();
        globals.declare("gx", Ty::I32, gx, true);
        globals.declare("gy", Ty::I32, gy, true);
        let func = target(&globals);
        let before = Module {
            globals,
            functions: vec![func],
        };
        let mut after = before.clone();
        obfuscate_module(&mut after, &bcf_only()).unwrap();
        assert_eq!(after.globals.len(), 2, "existing opaque globals are reused");

        let reports = check_module_equivalence(&before, &after, &SampleConfig::default()).unwrap();
        assert!(reports.iter().all(|r| r.is_equivalent()), "gx={gx} gy={gy}: {reports:?}");
    }
}

#[test]
fn test_each_candidate_gains_guard_and_junk() {
    let globals = GlobalTable::new();
    let func = target(&globals);
    // entry, eight blocks, exit: everything but the entry and the last two layout slots.
    let candidates = func.layout.len() - 3;
    let mut module = Module {
        globals,
        functions: vec![func],
    };
    let report = obfuscate_module(&mut module, &bcf_only()).unwrap();
    let PassOutcome::Applied {
        changed,
        block_delta,
        ..
    } = report.functions[0].passes[1].outcome
    else {
        panic!("bcf should apply");
    };
    assert!(changed);
    assert_eq!(block_delta, 2 * candidates as i64);

    let f = &module.functions[0];
    // A guard's false edge leads to a statement-free block whose only edge returns to it.
    let guards = f
        .ordinary_blocks()
        .into_iter()
        .filter(|&n| matches!(f.last_stmt(n), Some(Stmt::Cond(_))))
        .filter(|&n| {
            let junk = f.edge_endpoints(f.true_false_edges(n).1).1;
            f.block(junk).stmts().is_empty() && f.successors(junk) == vec![n]
        })
        .count();
    assert_eq!(guards, candidates);
}

#[test]
fn test_junk_blocks_never_run() {
    let globals = GlobalTable::new();
    let mut module = Module {
        functions: vec![target(&globals)],
        globals,
    };
    obfuscate_module(&mut module, &bcf_only()).unwrap();

    // Mark every junk block so that running one leaves a trace.
    let hit = module.globals.declare("hit", Ty::U8, 0, false);
    let f = &mut module.functions[0];
    let junk: Vec<_> = f
        .ordinary_blocks()
        .into_iter()
        .filter(|&n| matches!(f.last_stmt(n), Some(Stmt::Cond(_))))
        .map(|n| f.edge_endpoints(f.true_false_edges(n).1).1)
        .filter(|&j| f.block(j).stmts().is_empty())
        .collect();
    assert!(!junk.is_empty());
    for j in junk {
        f.stmts_mut(j).push(Stmt::Assign {
            dest: Var::Global(hit),
            value: Rvalue::Use(Operand::Const(1)),
        });
    }
    f.verify_in(&module.globals).unwrap();

    let f = &module.functions[0];
    for n in [0u32, 1, 2, 3, 10, u32::MAX] {
        let out = execute(f, &module.globals, &[i64::from(n)], 10_000).unwrap();
        assert_eq!(out.globals[hit.0 as usize], 0, "junk ran for n={n}");
    }
}
