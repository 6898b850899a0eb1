use crate::fixtures::target;
use murk_core::cfg_ir::Function;
use murk_core::ir::{GlobalTable, Rvalue, Stmt};
use murk_transform::{ObfuscationContext, RandomEngine, Substitution, Transform};
use murk_verification::execute;
use proptest::prelude::*;

fn substituted(rounds: u32) -> Function {
    let mut f = target(&GlobalTable::new());
    let mut ctx = ObfuscationContext::new(RandomEngine::new(0), GlobalTable::new());
    Substitution::new(rounds).apply(&mut f, &mut ctx).unwrap();
    f.verify().unwrap();
    f
}

fn bitwise_count(f: &Function) -> usize {
    f.ordinary_blocks()
        .into_iter()
        .flat_map(|n| f.block(n).stmts().to_vec())
        .filter(|s| {
            matches!(s, Stmt::Assign { value: Rvalue::Binary(op, ..), .. } if op.is_bitwise())
        })
        .count()
}

#[test]
fn test_zero_rounds_is_noop() {
    let original = target(&GlobalTable::new());
    let f = substituted(0);
    assert_eq!(
        serde_json::to_value(&f).unwrap(),
        serde_json::to_value(&original).unwrap()
    );
}

#[test]
fn test_rounds_compound() {
    let original = bitwise_count(&target(&GlobalTable::new()));
    let once = bitwise_count(&substituted(1));
    let twice = bitwise_count(&substituted(2));
    assert_eq!(original, 6);
    assert!(once > original);
    assert!(twice > once, "second round rewrites the first round's output");
}

proptest! {
    #[test]
    fn substituted_target_agrees(n in any::<u32>()) {
        let globals = GlobalTable::new();
        let original = target(&globals);
        let rewritten = substituted(2);
        let expected = execute(&original, &globals, &[i64::from(n)], 1_000).unwrap();
        let actual = execute(&rewritten, &globals, &[i64::from(n)], 1_000).unwrap();
        prop_assert_eq!(expected.ret, actual.ret);
    }
}
