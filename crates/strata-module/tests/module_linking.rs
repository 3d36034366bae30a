//! Integration tests for module linking
//!
//! Covers the link contract (coverage, surplus names, engine and context
//! checks), deferred instantiation of partially bound graphs, circular
//! imports and failure propagation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strata_module::reference::ErrorKind;
use strata_module::{
    EngineError, ExportWriter, Module, ModuleContent, ModuleError, ModuleOptions, ModuleStatus,
    ReferenceEngine, Value,
};

fn create_engine() -> Arc<ReferenceEngine> {
    let _ = env_logger::builder().is_test(true).try_init();
    Arc::new(ReferenceEngine::new())
}

fn create_module(
    engine: &Arc<ReferenceEngine>,
    identifier: &str,
    source: &str,
) -> Module<ReferenceEngine> {
    Module::source_text(engine, identifier, source).unwrap()
}

#[test]
fn test_link_declared_specifier() {
    let engine = create_engine();
    let dep = create_module(&engine, "dep", "export let x = 41;");
    let main = create_module(&engine, "main", r#"import { x } from "a"; export let y = x;"#);

    main.link([("a", &dep)]).unwrap();
    assert_eq!(main.status(), ModuleStatus::Linked);
    // Instantiating the graph instantiates the dependency too
    assert_eq!(dep.status(), ModuleStatus::Linked);

    main.evaluate().unwrap();
    assert_eq!(main.status(), ModuleStatus::Evaluated);
    assert_eq!(dep.status(), ModuleStatus::Evaluated);
    assert_eq!(main.namespace().unwrap().get("y"), Some(Value::Number(41.0)));
}

#[test]
fn test_link_missing_import() {
    let engine = create_engine();
    let main = create_module(&engine, "main", r#"import "a";"#);

    match main.link([]) {
        Err(ModuleError::MissingImports { identifier, missing }) => {
            assert_eq!(identifier, "main");
            assert_eq!(missing, vec!["a".to_string()]);
        }
        other => panic!("Expected MissingImports, got {:?}", other),
    }
    assert_eq!(main.status(), ModuleStatus::Unlinked);
}

#[test]
fn test_link_missing_import_error_message() {
    let engine = create_engine();
    let dep = create_module(&engine, "dep", "");
    let main = create_module(&engine, "main", r#"import "a"; import "b"; import "c";"#);

    let err = main.link([("b", &dep)]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Missing required imports for module 'main': a, c"
    );
    assert_eq!(main.status(), ModuleStatus::Unlinked);
    assert_eq!(dep.status(), ModuleStatus::Unlinked);
}

#[test]
fn test_link_twice_fails() {
    let engine = create_engine();
    let dep = create_module(&engine, "dep", "");
    let main = create_module(&engine, "main", r#"import "a";"#);
    main.link([("a", &dep)]).unwrap();

    match main.link([("a", &dep)]) {
        Err(ModuleError::Status {
            operation, actual, ..
        }) => {
            assert_eq!(operation, "link");
            assert_eq!(actual, ModuleStatus::Linked);
        }
        other => panic!("Expected Status error, got {:?}", other),
    }
    // Arguments do not matter
    assert!(main.link([]).is_err());
}

#[test]
fn test_link_surplus_names_rejected() {
    let engine = create_engine();
    let dep = create_module(&engine, "dep", "");
    let main = create_module(&engine, "main", r#"import "a";"#);

    match main.link([("a", &dep), ("zeta", &dep), ("extra", &dep)]) {
        Err(ModuleError::UnexpectedImports { unexpected, .. }) => {
            assert_eq!(unexpected, vec!["extra".to_string(), "zeta".to_string()]);
        }
        other => panic!("Expected UnexpectedImports, got {:?}", other),
    }
    assert_eq!(main.status(), ModuleStatus::Unlinked);
}

#[test]
fn test_link_foreign_engine_rejected() {
    let engine = create_engine();
    let other = create_engine();
    let dep = create_module(&other, "dep", "");
    let main = create_module(&engine, "main", r#"import "a";"#);

    match main.link([("a", &dep)]) {
        Err(ModuleError::ForeignModule { specifier, .. }) => assert_eq!(specifier, "a"),
        other => panic!("Expected ForeignModule, got {:?}", other),
    }
    assert_eq!(main.status(), ModuleStatus::Unlinked);
}

#[test]
fn test_link_across_contexts_rejected() {
    let engine = create_engine();
    let sandbox = engine.create_context("sandbox");
    let dep = Module::new(
        &engine,
        "dep",
        ModuleContent::SourceText(""),
        ModuleOptions::new().with_context(&sandbox),
    )
    .unwrap();
    let main = create_module(&engine, "main", r#"import "a";"#);

    assert!(matches!(
        main.link([("a", &dep)]),
        Err(ModuleError::Engine(EngineError::DifferentContext { .. }))
    ));
    assert_eq!(main.status(), ModuleStatus::Unlinked);
}

#[test]
fn test_circular_imports() {
    let engine = create_engine();
    let a = create_module(&engine, "a", r#"import { b } from "b"; export let a = 1;"#);
    let b = create_module(&engine, "b", r#"import { a } from "a"; export let b = 2;"#);

    a.link([("b", &b)]).unwrap();
    // Waits for "b" to be bound
    assert_eq!(a.status(), ModuleStatus::Linking);
    assert_eq!(b.status(), ModuleStatus::Unlinked);

    b.link([("a", &a)]).unwrap();
    assert_eq!(a.status(), ModuleStatus::Linked);
    assert_eq!(b.status(), ModuleStatus::Linked);

    let before = engine.stats().evaluations;
    a.evaluate().unwrap();
    assert_eq!(a.status(), ModuleStatus::Evaluated);
    assert_eq!(b.status(), ModuleStatus::Evaluated);
    assert_eq!(engine.stats().evaluations - before, 2);

    assert_eq!(b.namespace().unwrap().get("b"), Some(Value::Number(2.0)));
    assert!(b.evaluate().is_err());
}

#[test]
fn test_cycle_reading_uninitialized_import() {
    let engine = create_engine();
    let a = create_module(&engine, "a", r#"import { b } from "b"; export let a = b;"#);
    let b = create_module(&engine, "b", r#"import { a } from "a"; export let b = a;"#);
    a.link([("b", &b)]).unwrap();
    b.link([("a", &a)]).unwrap();

    assert!(a.evaluate().is_err());
    assert_eq!(a.status(), ModuleStatus::Errored);
    assert_eq!(b.status(), ModuleStatus::Errored);
    match b.error() {
        Some(Value::Error { kind, message }) => {
            assert_eq!(kind, ErrorKind::ReferenceError);
            assert!(message.contains("'a'"));
        }
        other => panic!("Expected ReferenceError, got {:?}", other),
    }
    assert_eq!(a.error(), b.error());
}

#[test]
fn test_cycle_member_errored_when_importer_throws() {
    let engine = create_engine();
    let a = create_module(
        &engine,
        "a",
        r#"import { y } from "b"; export let x = y; throw "boom";"#,
    );
    let b = create_module(&engine, "b", r#"import { x } from "a"; export let y = 1;"#);
    a.link([("b", &b)]).unwrap();
    b.link([("a", &a)]).unwrap();

    match a.evaluate() {
        Err(ModuleError::Evaluation { message, .. }) => assert_eq!(message, "boom"),
        other => panic!("Expected Evaluation error, got {:?}", other),
    }
    // b finished its body first but belongs to the same cycle
    assert_eq!(a.status(), ModuleStatus::Errored);
    assert_eq!(b.status(), ModuleStatus::Errored);
    assert_eq!(b.error(), Some(Value::from("boom")));
    assert_eq!(engine.stats().evaluations, 0);
}

#[test]
fn test_cycle_completes_together() {
    let engine = create_engine();
    let leaf = create_module(&engine, "leaf", "export let z = 3;");
    let a = create_module(
        &engine,
        "a",
        r#"import { y } from "b"; export let x = y;"#,
    );
    let b = create_module(
        &engine,
        "b",
        r#"import { x } from "a"; import { z } from "leaf"; export let y = z;"#,
    );
    a.link([("b", &b)]).unwrap();
    b.link([("a", &a), ("leaf", &leaf)]).unwrap();

    a.evaluate().unwrap();
    for module in [&a, &b, &leaf] {
        assert_eq!(module.status(), ModuleStatus::Evaluated);
    }
    assert_eq!(a.namespace().unwrap().get("x"), Some(Value::Number(3.0)));
    assert_eq!(engine.stats().evaluations, 3);
}

#[test]
fn test_top_down_linking_resumes_waiting_modules() {
    let engine = create_engine();
    let a = create_module(&engine, "a", r#"import "b";"#);
    let b = create_module(&engine, "b", r#"import "c";"#);
    let c = create_module(&engine, "c", "");

    a.link([("b", &b)]).unwrap();
    assert_eq!(a.status(), ModuleStatus::Linking);

    b.link([("c", &c)]).unwrap();
    assert_eq!(a.status(), ModuleStatus::Linked);
    assert_eq!(b.status(), ModuleStatus::Linked);
    assert_eq!(c.status(), ModuleStatus::Linked);
}

#[test]
fn test_errored_dependency_errors_importer() {
    let engine = create_engine();
    let dep = create_module(&engine, "dep", r#"throw "boom";"#);
    dep.link([]).unwrap();
    assert!(dep.evaluate().is_err());

    let main = create_module(&engine, "main", r#"import "dep";"#);
    match main.link([("dep", &dep)]) {
        Err(ModuleError::Link { identifier, message }) => {
            assert_eq!(identifier, "main");
            assert_eq!(message, "boom");
        }
        other => panic!("Expected Link error, got {:?}", other),
    }
    assert_eq!(main.status(), ModuleStatus::Errored);
    assert_eq!(main.error(), Some(Value::String("boom".to_string())));
}

#[test]
fn test_unresolvable_import_name() {
    let engine = create_engine();
    let dep = create_module(&engine, "dep", "export let x = 1;");
    dep.link([]).unwrap();
    let main = create_module(&engine, "main", r#"import { missing } from "dep";"#);

    let err = main.link([("dep", &dep)]).unwrap_err();
    assert!(err
        .to_string()
        .contains("does not provide an export named 'missing'"));
    assert_eq!(main.status(), ModuleStatus::Errored);
    assert_eq!(dep.status(), ModuleStatus::Linked);
    match main.error() {
        Some(Value::Error { kind, .. }) => assert_eq!(kind, ErrorKind::SyntaxError),
        other => panic!("Expected SyntaxError, got {:?}", other),
    }
}

#[test]
fn test_failure_propagates_to_waiting_importers() {
    let engine = create_engine();
    let top = create_module(&engine, "top", r#"import "mid";"#);
    let mid = create_module(&engine, "mid", r#"import { nope } from "leaf";"#);
    let leaf = create_module(&engine, "leaf", "");

    top.link([("mid", &mid)]).unwrap();
    assert!(mid.link([("leaf", &leaf)]).is_err());

    assert_eq!(mid.status(), ModuleStatus::Errored);
    assert_eq!(top.status(), ModuleStatus::Errored);
    assert_eq!(leaf.status(), ModuleStatus::Linked);
}

#[test]
fn test_shared_dependency_evaluated_once() {
    let engine = create_engine();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let shared = Module::synthetic(&engine, "shared", ["v"], move |exports| {
        counter.fetch_add(1, Ordering::SeqCst);
        exports
            .set_export("v", Value::from(7))
            .map_err(|err| Value::from(err.to_string()))
    })
    .unwrap();
    let left = create_module(&engine, "left", r#"import { v } from "shared"; export let l = v;"#);
    let right = create_module(&engine, "right", r#"import { v } from "shared"; export let r = v;"#);
    let main = create_module(
        &engine,
        "main",
        r#"import { l } from "left"; import { r } from "right"; export let sum = r;"#,
    );

    main.link([("left", &left), ("right", &right)]).unwrap();
    left.link([("shared", &shared)]).unwrap();
    assert_eq!(main.status(), ModuleStatus::Linking);
    right.link([("shared", &shared)]).unwrap();
    assert_eq!(main.status(), ModuleStatus::Linked);

    main.evaluate().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(main.namespace().unwrap().get("sum"), Some(Value::Number(7.0)));
    assert_eq!(left.namespace().unwrap().get("l"), Some(Value::Number(7.0)));
}

#[test]
fn test_import_alias() {
    let engine = create_engine();
    let dep = create_module(&engine, "dep", r#"export let value = "hi";"#);
    let main = create_module(
        &engine,
        "main",
        r#"import { value as greeting } from "dep"; export let out = greeting;"#,
    );
    main.link([("dep", &dep)]).unwrap();
    main.evaluate().unwrap();

    let namespace = main.namespace().unwrap();
    assert_eq!(namespace.get("out"), Some(Value::from("hi")));
    assert!(!namespace.contains("greeting"));
}
