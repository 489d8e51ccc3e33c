use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lr::compiler::{build_schema, generate, CompileOptions};
use lr::parser::parse;
use lr::LrScanner;

const SOURCE: &str = r#"
option go_package = "example.com/os"

// Operating system
os {
  hostname() string
  uptime(hostname) int
  env() map[string]string
  users() []os.user
}

// A local user
os.user {
  init(name string, uid? int)
  name string
  uid int
  home(name) string
  shell(home) string
}

os.users {
  []os.user
}
"#;

fn compile_benchmark(c: &mut Criterion) {
    c.bench_function("tokenize resource file", |b| {
        b.iter(|| LrScanner::new(black_box(SOURCE)).scan_tokens().unwrap())
    });

    c.bench_function("parse resource file", |b| {
        b.iter(|| parse(black_box(SOURCE)).unwrap())
    });

    let lr = parse(SOURCE).unwrap();
    c.bench_function("build schema", |b| b.iter(|| build_schema(black_box(&lr)).unwrap()));

    let options = CompileOptions::default();
    c.bench_function("generate bindings", |b| {
        b.iter(|| generate(black_box(&lr), &options).unwrap())
    });
}

criterion_group!(benches, compile_benchmark);
criterion_main!(benches);
