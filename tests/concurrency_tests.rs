//! Concurrent field evaluation: single-flight computation, parallel
//! resolution across instances and the async retry helper

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lr::compiler::build_schema;
use lr::parser::parse;
use lr::runtime::{
    await_field, resolve_field_parallel, Args, Claim, FieldStatus, Registry, Resource, Runtime,
    RuntimeConfig, Value,
};
use lr::Error;

fn registry(source: &str) -> Registry {
    Registry::from_schema(&build_schema(&parse(source).unwrap()).unwrap())
}

/// Resolve a field, spinning while another caller holds it
fn resolve_blocking(rt: &Arc<Runtime>, resource: &Arc<Resource>, field: &str) -> lr::Result<Value> {
    loop {
        match rt.resolve(resource, field) {
            Err(Error::NotReady) => std::thread::sleep(Duration::from_millis(1)),
            result => return result,
        }
    }
}

// ====================
// Single flight
// ====================

#[test]
fn test_field_is_computed_once_under_contention() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = registry("disk {\n  serial() string\n}");
    {
        let calls = calls.clone();
        registry
            .kind_mut("disk")
            .unwrap()
            .bind("serial", move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                Ok(Value::from("WD-123"))
            })
            .unwrap();
    }
    let rt = Runtime::new(registry);
    let disk = rt.create_resource("disk", Args::new()).unwrap();

    let results: Vec<lr::Result<Value>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| resolve_blocking(&rt, &disk, "serial")))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(result.unwrap(), Value::from("WD-123"));
    }
}

#[test]
fn test_dependent_field_is_computed_once_under_contention() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = registry("file {\n  path string\n  size(path) int\n}");
    {
        let calls = calls.clone();
        registry
            .kind_mut("file")
            .unwrap()
            .bind("size", move |_, deps| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                Ok(Value::Int(deps[0].to_string().len() as i64))
            })
            .unwrap();
    }
    let rt = Runtime::new(registry);
    let mut args = Args::new();
    args.insert("path".to_string(), Value::from("/etc/hosts"));
    let file = rt.create_resource("file", args).unwrap();

    let results: Vec<lr::Result<Value>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| scope.spawn(|| resolve_blocking(&rt, &file, "size")))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let expected = results[0].clone().unwrap();
    for result in results {
        assert_eq!(result.unwrap(), expected);
    }
}

#[test]
fn test_dependency_failure_leaves_held_slot_alone() {
    let mut registry = registry("file {\n  path string\n  size(path) int\n  label(size) string\n}");
    registry
        .kind_mut("file")
        .unwrap()
        .bind("size", |_, _| Err(Error::runtime("stat failed")))
        .unwrap();
    let rt = Runtime::new(registry);
    let mut args = Args::new();
    args.insert("path".to_string(), Value::from("/missing"));
    let file = rt.create_resource("file", args).unwrap();

    let guard = match file.cache().claim("label", false) {
        Claim::Acquired(guard) => guard,
        _ => panic!("label should be free to claim"),
    };
    assert_eq!(file.compute("label").unwrap_err(), Error::NotReady);
    assert_eq!(file.cache().status("label"), FieldStatus::Computing);
    drop(guard);
    assert_eq!(file.cache().status("label"), FieldStatus::Unset);

    assert_eq!(file.compute("label").unwrap_err(), Error::runtime("stat failed"));
    assert_eq!(file.cache().status("label"), FieldStatus::Error);
}

#[test]
fn test_concurrent_reads_of_computed_cross_dependency() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = registry("config {\n  port() int\n}\nserver {\n  url(config.port) string\n}");
    {
        let calls = calls.clone();
        registry
            .kind_mut("config")
            .unwrap()
            .bind("port", move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                Ok(Value::Int(8080))
            })
            .unwrap();
    }
    registry
        .kind_mut("server")
        .unwrap()
        .bind("url", |_, deps| Ok(Value::String(format!("http://localhost:{}", deps[0]))))
        .unwrap();
    let rt = Runtime::new(registry);
    let server = rt.create_resource("server", Args::new()).unwrap();
    assert_eq!(rt.resolve(&server, "url").unwrap_err(), Error::NotReady);

    let results: Vec<lr::Result<Value>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| resolve_blocking(&rt, &server, "url")))
            .collect();
        std::thread::sleep(Duration::from_millis(5));
        rt.create_resource("config", Args::new()).unwrap();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(result.unwrap(), Value::from("http://localhost:8080"));
    }
}

#[test]
fn test_concurrent_callers_see_not_ready_not_garbage() {
    let mut registry = registry("disk {\n  serial() string\n}");
    registry
        .kind_mut("disk")
        .unwrap()
        .bind("serial", |_, _| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(Value::from("WD-123"))
        })
        .unwrap();
    let rt = Runtime::new(registry);
    let disk = rt.create_resource("disk", Args::new()).unwrap();

    std::thread::scope(|scope| {
        let first = scope.spawn(|| rt.resolve(&disk, "serial"));
        std::thread::sleep(Duration::from_millis(10));
        match rt.resolve(&disk, "serial") {
            Err(Error::NotReady) | Ok(_) => {}
            Err(other) => panic!("unexpected error {:?}", other),
        }
        if let Ok(value) = rt.resolve(&disk, "serial") {
            assert_eq!(value, Value::from("WD-123"));
        }
        assert_eq!(first.join().unwrap().unwrap(), Value::from("WD-123"));
    });
}

#[test]
fn test_concurrent_creation_yields_one_instance() {
    let mut registry = registry("user {\n  name string\n}");
    registry
        .kind_mut("user")
        .unwrap()
        .set_id(|r| r.get::<String>("name"));
    let rt = Runtime::new(registry);

    let created: Vec<Arc<Resource>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    let mut args = Args::new();
                    args.insert("name".to_string(), Value::from("root"));
                    rt.create_resource("user", args).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for resource in &created[1..] {
        assert!(Arc::ptr_eq(resource, &created[0]));
    }
    assert_eq!(rt.resources("user").unwrap().len(), 1);
}

// ====================
// Parallel resolution
// ====================

#[test]
fn test_resolve_field_parallel_over_many_instances() {
    let mut registry = registry("process {\n  pid int\n  parent(pid) int\n}");
    let kind = registry.kind_mut("process").unwrap();
    kind.set_id(|r| Ok(r.get::<i64>("pid")?.to_string()));
    kind.bind("parent", |_, deps| Ok(Value::Int(deps[0].get::<i64>().unwrap_or(0) / 2)))
        .unwrap();
    let rt = Runtime::new(registry);

    let processes: Vec<Arc<Resource>> = (1..=64)
        .map(|pid| {
            let mut args = Args::new();
            args.insert("pid".to_string(), Value::Int(pid));
            rt.create_resource("process", args).unwrap()
        })
        .collect();

    let config = RuntimeConfig {
        max_parallelism: 4,
        ..Default::default()
    };
    let results = resolve_field_parallel(&rt, &processes, "parent", &config).unwrap();
    let parents: Vec<i64> = results
        .into_iter()
        .map(|r| r.unwrap().get::<i64>().unwrap())
        .collect();
    let expected: Vec<i64> = (1..=64).map(|pid| pid / 2).collect();
    assert_eq!(parents, expected);
}

// ====================
// Async retry
// ====================

fn cross_runtime() -> Arc<Runtime> {
    let mut registry = registry("config {\n  port int\n}\nserver {\n  url(config.port) string\n}");
    registry
        .kind_mut("server")
        .unwrap()
        .bind("url", |_, deps| Ok(Value::String(format!("http://localhost:{}", deps[0]))))
        .unwrap();
    Runtime::new(registry)
}

#[tokio::test]
async fn test_await_field_waits_for_dependency() {
    let rt = cross_runtime();
    let server = rt.create_resource("server", Args::new()).unwrap();

    let creator = {
        let rt = rt.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut args = Args::new();
            args.insert("port".to_string(), Value::Int(8080));
            rt.create_resource("config", args).unwrap();
        })
    };

    let url = await_field(&rt, &server, "url", &RuntimeConfig::default())
        .await
        .unwrap();
    assert_eq!(url, Value::from("http://localhost:8080"));
    creator.await.unwrap();
}

#[test]
fn test_await_field_gives_up() {
    let rt = cross_runtime();
    let server = rt.create_resource("server", Args::new()).unwrap();
    let config = RuntimeConfig {
        retry_interval: Duration::from_millis(1),
        max_retries: 3,
        ..Default::default()
    };
    let result = tokio_test::block_on(await_field(&rt, &server, "url", &config));
    assert_eq!(result.unwrap_err(), Error::NotReady);
}
