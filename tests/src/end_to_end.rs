//! Every combination of the three passes must leave observable behavior unchanged.

use crate::fixtures::{five_block, init_tracing, sample_module};
use murk_core::cfg_ir::Module;
use murk_core::ir::GlobalTable;
use murk_transform::{ObfuscationConfig, obfuscate_module};
use murk_verification::{SampleConfig, check_module_equivalence};

fn combinations() -> impl Iterator<Item = (bool, bool, bool)> {
    (0..8u8).map(|bits| (bits & 1 != 0, bits & 2 != 0, bits & 4 != 0))
}

fn assert_preserved(before: &Module, seed: u32, sub_loop: u32) {
    for (enable_sub, enable_bcf, enable_fla) in combinations() {
        let config = ObfuscationConfig {
            seed,
            enable_sub,
            enable_bcf,
            enable_fla,
            sub_loop,
        };
        let mut after = before.clone();
        let report = obfuscate_module(&mut after, &config).unwrap();
        assert!(report.failed_functions().is_empty(), "{config:?}: {report:?}");
        assert!(after.verify().is_ok(), "{config:?}");

        let samples = SampleConfig {
            samples: 48,
            seed: u64::from(seed),
            ..SampleConfig::default()
        };
        for r in check_module_equivalence(before, &after, &samples).unwrap() {
            assert!(
                r.is_equivalent(),
                "{config:?} changed {}: {:?}",
                r.function,
                r.mismatches
            );
            assert!(r.compared > 0);
        }
    }
}

#[test]
fn test_sample_module_semantics_preserved() {
    init_tracing();
    assert_preserved(&sample_module(), 0x1337_c0de, 2);
}

#[test]
fn test_five_block_semantics_preserved() {
    init_tracing();
    let (func, _) = five_block();
    let module = Module {
        globals: GlobalTable::new(),
        functions: vec![func],
    };
    for seed in [0, 1, u32::MAX] {
        assert_preserved(&module, seed, 1);
    }
}

#[test]
fn test_obfuscated_module_survives_json() {
    let mut module = sample_module();
    let config = ObfuscationConfig {
        seed: 5,
        enable_sub: true,
        enable_bcf: true,
        enable_fla: true,
        sub_loop: 1,
    };
    obfuscate_module(&mut module, &config).unwrap();
    let json = serde_json::to_string(&module).unwrap();
    let loaded: Module = serde_json::from_str(&json).unwrap();
    assert!(loaded.verify().is_ok());

    let reports = check_module_equivalence(&module, &loaded, &SampleConfig::default()).unwrap();
    assert!(reports.iter().all(|r| r.is_equivalent()));
}
