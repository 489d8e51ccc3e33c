//! Parallel and asynchronous field resolution
//!
//! Uses Rayon for work-stealing parallelism across many instances, and a
//! tokio retry loop for callers that want to wait out `NotReady`.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use super::resource::Resource;
use super::value::Value;
use super::{Runtime, RuntimeConfig};
use crate::error::{Error, Result};

/// Resolve one field across many instances (e.g. list elements) in parallel
///
/// # Returns
/// * `Ok(results)` - One result per instance, in input order. `NotReady`
///   stays visible per element.
/// * `Err(Error)` - First failure other than `NotReady` (if fail_fast=true)
pub fn resolve_field_parallel(
    runtime: &Arc<Runtime>,
    resources: &[Arc<Resource>],
    field: &str,
    config: &RuntimeConfig,
) -> Result<Vec<Result<Value>>> {
    // Empty array fast path
    if resources.is_empty() {
        return Ok(Vec::new());
    }

    // Single item - no parallelism needed
    if resources.len() == 1 {
        let result = runtime.resolve(&resources[0], field);
        return match result {
            Err(err) if config.fail_fast && !err.is_not_ready() => Err(err),
            other => Ok(vec![other]),
        };
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_parallelism.max(1).min(resources.len()))
        .build()
        .map_err(|e| Error::RuntimeError(format!("Failed to create thread pool: {}", e)))?;

    debug!(field, instances = resources.len(), "resolving field in parallel");

    let results: Vec<Result<Value>> = pool.install(|| {
        resources
            .par_iter()
            .map(|resource| runtime.resolve(resource, field))
            .collect()
    });

    if config.fail_fast {
        if let Some(Err(err)) = results
            .iter()
            .find(|r| matches!(r, Err(e) if !e.is_not_ready()))
        {
            return Err(err.clone());
        }
    }

    Ok(results)
}

/// Read a field, retrying while it is `NotReady`.
///
/// Each retry yields for `retry_interval`; after `max_retries` the last
/// `NotReady` is returned.
pub async fn await_field(
    runtime: &Arc<Runtime>,
    resource: &Arc<Resource>,
    field: &str,
    config: &RuntimeConfig,
) -> Result<Value> {
    let mut attempts = 0;
    loop {
        match runtime.resolve(resource, field) {
            Err(err) if err.is_not_ready() && attempts < config.max_retries => {
                attempts += 1;
                tokio::time::sleep(config.retry_interval).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::schema::build_schema;
    use crate::parser::parse;
    use crate::runtime::{Args, Registry};

    fn runtime() -> Arc<Runtime> {
        let schema = build_schema(&parse("item {\n  n int\n  double(n) int\n}").unwrap()).unwrap();
        let mut registry = Registry::from_schema(&schema);
        let kind = registry.kind_mut("item").unwrap();
        kind.set_id(|r| Ok(r.get::<i64>("n")?.to_string()));
        kind.bind("double", |_, deps| match deps.as_slice() {
            [Value::Int(n)] if *n >= 0 => Ok(Value::Int(n * 2)),
            _ => Err(Error::runtime("negative")),
        })
        .unwrap();
        Runtime::new(registry)
    }

    fn item(rt: &Arc<Runtime>, n: i64) -> Arc<Resource> {
        let mut args = Args::new();
        args.insert("n".to_string(), Value::Int(n));
        rt.create_resource("item", args).unwrap()
    }

    #[test]
    fn test_resolve_field_parallel_keeps_order() {
        let rt = runtime();
        let items: Vec<_> = (0..8).map(|n| item(&rt, n)).collect();
        let results = resolve_field_parallel(&rt, &items, "double", &RuntimeConfig::default()).unwrap();
        let values: Vec<i64> = results
            .into_iter()
            .map(|r| r.unwrap().get::<i64>().unwrap())
            .collect();
        assert_eq!(values, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn test_resolve_field_parallel_fail_fast() {
        let rt = runtime();
        let items = vec![item(&rt, 1), item(&rt, -1)];

        let collected = resolve_field_parallel(&rt, &items, "double", &RuntimeConfig::default()).unwrap();
        assert!(collected[0].is_ok());
        assert!(collected[1].is_err());

        let config = RuntimeConfig {
            fail_fast: true,
            ..Default::default()
        };
        assert!(resolve_field_parallel(&rt, &items, "double", &config).is_err());
    }

    #[test]
    fn test_resolve_field_parallel_empty() {
        let rt = runtime();
        let results = resolve_field_parallel(&rt, &[], "double", &RuntimeConfig::default()).unwrap();
        assert!(results.is_empty());
    }
}
