use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lr::compiler::build_schema;
use lr::parser::parse;
use lr::runtime::{resolve_field_parallel, Args, Registry, Resource, Runtime, RuntimeConfig, Value};

fn runtime() -> Arc<Runtime> {
    let lr = parse("process {\n  pid int\n  parent(pid) int\n}").unwrap();
    let mut registry = Registry::from_schema(&build_schema(&lr).unwrap());
    let kind = registry.kind_mut("process").unwrap();
    kind.set_id(|r| Ok(r.get::<i64>("pid")?.to_string()));
    kind.bind("parent", |_, deps| Ok(Value::Int(deps[0].get::<i64>().unwrap_or(0) / 2)))
        .unwrap();
    Runtime::new(registry)
}

fn create(rt: &Arc<Runtime>, pid: i64) -> Arc<Resource> {
    let mut args = Args::new();
    args.insert("pid".to_string(), Value::Int(pid));
    rt.create_resource("process", args).unwrap()
}

fn runtime_benchmark(c: &mut Criterion) {
    c.bench_function("create resource", |b| {
        let rt = runtime();
        let mut pid = 0;
        b.iter(|| {
            pid += 1;
            create(&rt, black_box(pid))
        })
    });

    c.bench_function("cached field read", |b| {
        let rt = runtime();
        let process = create(&rt, 42);
        rt.resolve(&process, "parent").unwrap();
        b.iter(|| rt.resolve(black_box(&process), "parent").unwrap())
    });

    c.bench_function("resolve field across 256 instances", |b| {
        let config = RuntimeConfig::default();
        b.iter(|| {
            let rt = runtime();
            let processes: Vec<_> = (0..256).map(|pid| create(&rt, pid)).collect();
            resolve_field_parallel(&rt, &processes, "parent", &config).unwrap()
        })
    });
}

criterion_group!(benches, runtime_benchmark);
criterion_main!(benches);
