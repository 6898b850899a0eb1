use crate::fixtures::{init_tracing, sample_module};
use murk_core::cfg_ir::{EdgeType, Module};
use murk_utils::errors::CfgIrError;
use murk_verification::execute;

#[test]
fn test_module_survives_json() {
    init_tracing();
    let module = sample_module();
    let json = serde_json::to_string(&module).unwrap();
    let loaded: Module = serde_json::from_str(&json).unwrap();

    assert!(loaded.verify().is_ok());
    assert_eq!(loaded.globals.len(), module.globals.len());
    let target = loaded.function("target").unwrap();
    assert!(target.analysis.dominators.is_none(), "analysis caches are not serialized");
    assert_eq!(target.layout, module.function("target").unwrap().layout);

    let checksum = loaded.function("checksum").unwrap();
    assert_eq!(checksum.attributes, vec!["nobcf".to_owned(), "fla".to_owned()]);

    let out = execute(target, &loaded.globals, &[10], 1_000).unwrap();
    assert_eq!(out.ret, Some(894_921_190));
}

#[test]
fn test_module_verify_names_the_broken_function() {
    let mut module = sample_module();
    let checksum = &mut module.functions[1];
    let first = checksum.layout[1];
    let exit = checksum.exit;
    checksum.make_edge(first, exit, EdgeType::Jump);

    let (name, err) = module.verify().unwrap_err();
    assert_eq!(name, "checksum");
    assert_eq!(err, CfgIrError::AmbiguousFallthrough(first.index(), 2));
}
