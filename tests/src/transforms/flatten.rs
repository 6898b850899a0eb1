use crate::fixtures::{five_block, init_tracing, target};
use murk_core::cfg_ir::Function;
use murk_core::ir::{GlobalTable, Stmt};
use murk_transform::flatten::dispatch_switch;
use murk_transform::{Flatten, ObfuscationContext, RandomEngine, Transform};
use murk_verification::{SampleConfig, check_equivalence};
use petgraph::Direction;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::Bfs;
use std::collections::HashSet;

fn flatten(func: &mut Function, seed: u32) {
    let mut ctx = ObfuscationContext::new(RandomEngine::new(seed), GlobalTable::new());
    assert!(Flatten::new().apply(func, &mut ctx).unwrap());
    func.verify().unwrap();
}

#[test]
fn test_five_block_scenario() {
    init_tracing();
    let (mut f, originals) = five_block();
    flatten(&mut f, 0xdead_beef);

    let switch_blocks: Vec<NodeIndex> = f
        .ordinary_blocks()
        .into_iter()
        .filter(|&n| matches!(f.last_stmt(n), Some(Stmt::Switch(_))))
        .collect();
    assert_eq!(switch_blocks.len(), 1, "exactly one switch block");
    assert_eq!(
        f.locals.iter().filter(|l| l.name == "switchVar").count(),
        1,
        "exactly one dispatch variable"
    );

    let (dispatch, switch) = dispatch_switch(&f).unwrap();
    assert_eq!(dispatch, switch_blocks[0]);
    assert_eq!(switch.cases.len(), 4);
    let targets: HashSet<NodeIndex> = switch.cases.iter().map(|c| c.target).collect();
    assert_eq!(targets, HashSet::from(originals));
    let values: HashSet<i64> = switch.cases.iter().map(|c| c.value).collect();
    assert_eq!(values.len(), 4, "case values are distinct");

    // The default target loops forever: dummy -> return-to-switch -> switch.
    let dummy = switch.default;
    assert!(!targets.contains(&dummy));
    assert!(f.block(dummy).stmts().is_empty());
    let back = f.successors(dummy);
    assert_eq!(back.len(), 1);
    assert_eq!(f.successors(back[0]), vec![dispatch]);
}

#[test]
fn test_original_blocks_stay_reachable_from_switch() {
    let mut f = target(&GlobalTable::new());
    let originals = f.ordinary_blocks();
    flatten(&mut f, 77);
    let (dispatch, switch) = dispatch_switch(&f).unwrap();

    let mut reached = HashSet::new();
    let mut bfs = Bfs::new(&f.cfg, dispatch);
    while let Some(node) = bfs.next(&f.cfg) {
        reached.insert(node);
    }
    assert!(originals.iter().all(|b| reached.contains(b)));

    // Only the switch leads into the trap, and no case label selects it.
    let dummy = switch.default;
    let preds: Vec<NodeIndex> = f
        .cfg
        .neighbors_directed(dummy, Direction::Incoming)
        .collect();
    assert_eq!(preds, vec![dispatch]);
    assert!(switch.cases.iter().all(|c| c.target != dummy));
}

#[test]
fn test_flattened_target_is_equivalent() {
    init_tracing();
    let globals = GlobalTable::new();
    let before = target(&globals);
    let mut after = before.clone();
    flatten(&mut after, 1);

    let report = check_equivalence(&before, &globals, &after, &globals, &SampleConfig::default())
        .unwrap();
    assert!(report.is_equivalent(), "{:?}", report.mismatches);
    assert!(report.compared > 0);
}
