use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_module::{Module, ModuleContent, ModuleOptions, ReferenceEngine};

/// Source for a module importing `count` siblings by name
fn importer_source(count: usize) -> String {
    let mut source = String::new();
    for i in 0..count {
        source.push_str(&format!("import {{ v{i} }} from \"dep{i}\";\n"));
    }
    source.push_str("export let done = true;\n");
    source
}

fn bench_compile(c: &mut Criterion) {
    let engine = Arc::new(ReferenceEngine::new());
    let source = importer_source(32);

    c.bench_function("compile_32_imports", |b| {
        b.iter(|| {
            drop(Module::source_text(&engine, "main", black_box(&source)).unwrap());
            engine.collect()
        });
    });
}

fn bench_cached_compile(c: &mut Criterion) {
    let engine = Arc::new(ReferenceEngine::new());
    let source = "let a = 1; let b = a; export let c = b;";
    let module = Module::source_text(&engine, "main", source).unwrap();
    module.link([]).unwrap();
    module.evaluate().unwrap();
    let bytes = module.create_cached_data().unwrap();

    c.bench_function("compile_from_cached_data", |b| {
        b.iter(|| {
            let cached = Module::new(
                &engine,
                "cached",
                ModuleContent::SourceText(source),
                ModuleOptions::new().with_cached_data(black_box(&bytes)),
            )
            .unwrap();
            drop(cached);
            engine.collect()
        });
    });
}

fn bench_link_and_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("link_and_evaluate");

    for count in [4usize, 32, 128] {
        group.bench_with_input(BenchmarkId::new("fan_out", count), &count, |b, &count| {
            let source = importer_source(count);
            b.iter(|| {
                let engine = Arc::new(ReferenceEngine::new());
                let deps: Vec<_> = (0..count)
                    .map(|i| {
                        let text = format!("export let v{i} = {i};");
                        Module::source_text(&engine, format!("dep{i}"), &text).unwrap()
                    })
                    .collect();
                let main = Module::source_text(&engine, "main", &source).unwrap();
                let specifiers: Vec<String> = (0..count).map(|i| format!("dep{i}")).collect();
                main.link(specifiers.iter().map(String::as_str).zip(deps.iter()))
                    .unwrap();
                main.evaluate().unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_cached_compile, bench_link_and_evaluate);
criterion_main!(benches);
