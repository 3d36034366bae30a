//! Integration tests for cached data
//!
//! Producing an artifact from an evaluated module and rebuilding a module
//! from it.

use std::sync::Arc;

use strata_module::{
    EngineError, EngineOptions, Module, ModuleContent, ModuleError, ModuleOptions, ModuleStatus,
    ReferenceEngine, Value,
};

const SOURCE: &str = r#"
import { base } from "base";
let offset = 2;
export let total = base;
"#;

fn create_engine() -> Arc<ReferenceEngine> {
    let _ = env_logger::builder().is_test(true).try_init();
    Arc::new(ReferenceEngine::new())
}

fn evaluated(
    engine: &Arc<ReferenceEngine>,
    identifier: &str,
    source: &str,
) -> Module<ReferenceEngine> {
    let module = Module::source_text(engine, identifier, source).unwrap();
    module.link([]).unwrap();
    module.evaluate().unwrap();
    module
}

fn from_cache(
    engine: &Arc<ReferenceEngine>,
    source: &str,
    cached_data: &[u8],
) -> Result<Module<ReferenceEngine>, ModuleError> {
    Module::new(
        engine,
        "cached",
        ModuleContent::SourceText(source),
        ModuleOptions::new().with_cached_data(cached_data),
    )
}

#[test]
fn test_cached_data_rebuilds_module() {
    let engine = create_engine();
    let base = evaluated(&engine, "base", "export let base = 40;");
    let original = Module::source_text(&engine, "original", SOURCE).unwrap();
    original.link([("base", &base)]).unwrap();
    original.evaluate().unwrap();

    let bytes = original.create_cached_data().unwrap();
    assert_eq!(engine.stats().cache_hits, 0);

    let rebuilt = from_cache(&engine, SOURCE, &bytes).unwrap();
    assert_eq!(engine.stats().cache_hits, 1);
    assert_eq!(rebuilt.import_specifiers(), original.import_specifiers());

    rebuilt.link([("base", &base)]).unwrap();
    rebuilt.evaluate().unwrap();
    assert_eq!(
        rebuilt.namespace().unwrap().get("total"),
        Some(Value::Number(40.0))
    );
}

#[test]
fn test_cached_data_requires_evaluated_module() {
    let engine = create_engine();
    let module = Module::source_text(&engine, "main", "export let x = 1;").unwrap();

    match module.create_cached_data() {
        Err(ModuleError::CannotCreateCachedData { identifier, status }) => {
            assert_eq!(identifier, "main");
            assert_eq!(status, ModuleStatus::Unlinked);
        }
        other => panic!("Expected CannotCreateCachedData, got {:?}", other),
    }
    assert_eq!(module.status(), ModuleStatus::Unlinked);

    module.link([]).unwrap();
    assert!(module.create_cached_data().is_err());
    assert_eq!(module.status(), ModuleStatus::Linked);

    module.evaluate().unwrap();
    assert!(module.create_cached_data().is_ok());
}

#[test]
fn test_cached_data_from_errored_module_fails() {
    let engine = create_engine();
    let module = Module::source_text(&engine, "main", "throw 0;").unwrap();
    module.link([]).unwrap();
    assert!(module.evaluate().is_err());

    assert!(matches!(
        module.create_cached_data(),
        Err(ModuleError::CannotCreateCachedData {
            status: ModuleStatus::Errored,
            ..
        })
    ));
}

#[test]
fn test_cached_data_for_synthetic_module_fails() {
    let engine = create_engine();
    let module = Module::synthetic(&engine, "host", ["x"], |_| Ok(())).unwrap();
    module.link([]).unwrap();
    module.evaluate().unwrap();

    assert!(matches!(
        module.create_cached_data(),
        Err(ModuleError::CannotCreateCachedData { .. })
    ));
}

#[test]
fn test_cached_data_rejected_for_other_source() {
    let engine = create_engine();
    let module = evaluated(&engine, "main", "export let x = 1;");
    let bytes = module.create_cached_data().unwrap();

    assert!(matches!(
        from_cache(&engine, "export let x = 2;", &bytes),
        Err(ModuleError::Engine(EngineError::CachedDataRejected(_)))
    ));
    assert_eq!(engine.stats().cache_hits, 0);
}

#[test]
fn test_garbage_cached_data_rejected() {
    let engine = create_engine();
    let err = from_cache(&engine, "", b"\x00\x01garbage").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot build module 'cached' from the supplied cached data"
    );
}

#[test]
fn test_cached_data_disabled() {
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = Arc::new(ReferenceEngine::with_options(EngineOptions {
        enable_cached_data: false,
        ..EngineOptions::default()
    }));
    let module = evaluated(&engine, "main", "export let x = 1;");

    assert!(matches!(
        module.create_cached_data(),
        Err(ModuleError::Engine(EngineError::CannotCreateCachedData(_)))
    ));

    let bytes = evaluated(&create_engine(), "main", "export let x = 1;")
        .create_cached_data()
        .unwrap();
    assert!(matches!(
        from_cache(&engine, "export let x = 1;", &bytes),
        Err(ModuleError::Engine(EngineError::CachedDataRejected(_)))
    ));
}

#[test]
fn test_cached_data_shared_between_engines() {
    let bytes = evaluated(&create_engine(), "main", "export let x = 3;")
        .create_cached_data()
        .unwrap();

    let engine = create_engine();
    let module = from_cache(&engine, "export let x = 3;", &bytes).unwrap();
    module.link([]).unwrap();
    module.evaluate().unwrap();
    assert_eq!(module.namespace().unwrap().get("x"), Some(Value::Number(3.0)));
}
