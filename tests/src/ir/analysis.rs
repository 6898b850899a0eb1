use crate::fixtures::{init_tracing, sample_module, target};
use murk_analysis::dominance::compute_dominance;
use murk_analysis::loops::{fixup_loops, natural_loops};
use murk_analysis::metrics::collect_metrics;
use murk_core::cfg_ir::LoopId;
use murk_core::ir::GlobalTable;

#[test]
fn test_checksum_loop_is_recovered() {
    init_tracing();
    let mut module = sample_module();
    let func = &mut module.functions[1];
    let [_, init, head, body, done, _] = func.layout[..] else {
        panic!("unexpected layout");
    };
    assert!(func.loops.needs_fixup(), "the builder saw a back edge");

    fixup_loops(func);
    assert!(!func.loops.needs_fixup());
    let loops = natural_loops(func);
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0].header, head);
    assert_eq!(func.loop_of(head), func.loop_of(body));
    assert_ne!(func.loop_of(head), LoopId::ROOT);
    assert_eq!(func.loop_of(init), LoopId::ROOT);
    assert_eq!(func.loop_of(done), LoopId::ROOT);
    assert!(func.verify().is_ok());
}

#[test]
fn test_target_dominance_and_metrics() {
    let mut func = target(&GlobalTable::new());
    let test0 = func.layout[1];
    let done = func.layout[func.layout.len() - 2];

    compute_dominance(&mut func);
    let doms = func.analysis.dominators.as_ref().unwrap();
    let post = func.analysis.post_dominators.as_ref().unwrap();
    assert!(func.ordinary_blocks().iter().all(|&b| doms.dominates(test0, b)));
    assert!(func.ordinary_blocks().iter().all(|&b| post.dominates(done, b)));

    let m = collect_metrics(&func).unwrap();
    assert_eq!(m.block_cnt, 8);
    assert_eq!(m.loop_cnt, 0);
    // three two-way branches
    assert_eq!(m.cyclomatic, 4);
}
