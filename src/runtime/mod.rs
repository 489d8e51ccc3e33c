//! Lazy, memoizing field-computation runtime
//!
//! A [`Runtime`] is one session: it owns the [`Registry`] of resource
//! kinds, every created instance (deduplicated by kind and id), and the
//! [`Observers`] watch graph that re-runs fields whose dependencies were
//! not ready on first access.

mod cache;
mod executor;
mod observers;
mod registry;
mod resource;
mod value;

pub use cache::{Cache, CacheEntry, Claim, ComputeGuard, FieldStatus};
pub use executor::{await_field, resolve_field_parallel};
pub use observers::{field_uid, Callback, Observers};
pub use registry::{ComputeFn, IdFn, InitFn, InitOutcome, Registry, ResourceKind};
pub use resource::Resource;
pub use value::{FromValue, Value};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use regex::Regex;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Type;
use resource::DependencyTarget;

/// Constructor arguments by field name
pub type Args = BTreeMap<String, Value>;

/// Argument that forces the id of a new instance
pub const ID_ARGUMENT: &str = "__id";

/// Configuration for field resolution
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Maximum number of parallel tasks (default: num_cpus)
    pub max_parallelism: usize,
    /// Pause between retries of a field that is not ready
    pub retry_interval: Duration,
    /// Retries before a not-ready field is given up on
    pub max_retries: u32,
    /// Fail on the first error vs collect all results
    pub fail_fast: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallelism: num_cpus::get(),
            retry_interval: Duration::from_millis(5),
            max_retries: 200,
            fail_fast: false,
        }
    }
}

/// One runtime session
pub struct Runtime {
    registry: Registry,
    instances: DashMap<String, Arc<Resource>>,
    observers: Observers,
    session_id: Uuid,
    config: RuntimeConfig,
}

impl Runtime {
    /// Create a runtime with default configuration
    pub fn new(registry: Registry) -> Arc<Self> {
        Self::with_config(registry, RuntimeConfig::default())
    }

    /// Create a runtime with explicit configuration
    pub fn with_config(registry: Registry, config: RuntimeConfig) -> Arc<Self> {
        let session_id = Uuid::new_v4();
        debug!(session = %session_id, kinds = registry.count(), "runtime created");
        Arc::new(Runtime {
            registry,
            instances: DashMap::new(),
            observers: Observers::new(),
            session_id,
            config,
        })
    }

    /// Session id
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Resource kinds of this session
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Watch graph of this session
    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    /// Runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Create an instance of `name`, or return the existing instance with
    /// the same kind and id.
    ///
    /// The init hook runs first and may rewrite the arguments or return an
    /// existing instance. Every remaining argument must name a field and
    /// match its type; all static fields must be supplied. The id comes
    /// from `__id` when given, else from the kind's id function, else it
    /// is empty.
    pub fn create_resource(self: &Arc<Self>, name: &str, args: Args) -> Result<Arc<Resource>> {
        let kind = self.registry.get(name)?;
        let mut args = args;

        if let Some(init) = kind.init_fn() {
            match init(self, args)? {
                InitOutcome::Existing(existing) => {
                    debug!(resource = %existing.name(), id = %existing.id(), "init returned existing resource");
                    return Ok(existing);
                }
                InitOutcome::Continue(rewritten) => args = rewritten,
            }
        }

        let forced_id = match args.remove(ID_ARGUMENT) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id),
            Some(other) => {
                return Err(Error::WrongArgumentType {
                    resource: kind.name().to_string(),
                    name: ID_ARGUMENT.to_string(),
                    expected: "string".to_string(),
                    got: other.type_name(),
                })
            }
        };

        let resource = Arc::new(Resource::new(kind.clone(), Arc::downgrade(self)));

        for (arg, value) in args {
            let info = kind.info().field(&arg).ok_or_else(|| Error::UnknownArgument {
                resource: kind.name().to_string(),
                name: arg.clone(),
            })?;

            if !value.is_null() {
                if !value.matches(&info.ty) {
                    return Err(Error::WrongArgumentType {
                        resource: kind.name().to_string(),
                        name: arg,
                        expected: info.ty.to_string(),
                        got: value.type_name(),
                    });
                }
                if let (Type::Regex, Value::String(pattern)) = (&info.ty, &value) {
                    if let Err(e) = Regex::new(pattern) {
                        return Err(Error::WrongArgumentType {
                            resource: kind.name().to_string(),
                            name: arg,
                            expected: "regex".to_string(),
                            got: format!("invalid pattern ({})", e),
                        });
                    }
                }
            }

            resource.cache().store(&arg, CacheEntry::valid(value));
        }

        for field in kind.info().static_fields() {
            if resource.cache().load(&field.name).is_none() {
                return Err(Error::MissingField {
                    resource: kind.name().to_string(),
                    field: field.name.clone(),
                });
            }
        }

        let id = match (forced_id, kind.id_fn()) {
            (Some(id), _) => id,
            (None, Some(id_fn)) => id_fn(&resource)?,
            (None, None) => String::new(),
        };
        resource.set_id(id);

        let resource = match self.instances.entry(resource.uid()) {
            Entry::Occupied(existing) => {
                debug!(resource = %kind.name(), id = %resource.id(), "reusing existing resource");
                return Ok(existing.get().clone());
            }
            Entry::Vacant(slot) => {
                slot.insert(resource.clone());
                resource
            }
        };
        debug!(resource = %kind.name(), id = %resource.id(), "created resource");

        // fields watched before this instance existed can now be computed
        for field in kind.info().fields.keys() {
            let uid = resource.field_uid(field);
            if !self.observers.is_watched(&uid) {
                continue;
            }
            if let Err(err) = resource.register(field).and_then(|_| resource.compute(field)) {
                if !err.is_not_ready() {
                    trace!(field = %uid.replace('\x00', "/"), error = %err, "compute of watched field");
                }
            }
            if resource.cache().load(field).is_some() {
                self.observers.trigger(&uid);
            }
        }

        Ok(resource)
    }

    /// Get an existing instance by kind and id
    pub fn get_resource(&self, name: &str, id: &str) -> Result<Arc<Resource>> {
        let kind = self.registry.get(name)?;
        self.instances
            .get(&format!("{}\x00{}", kind.name(), id))
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::ResourceNotFound {
                name: name.to_string(),
                id: id.to_string(),
            })
    }

    /// Find the first instance of `name` matching `predicate`, in id order
    pub fn find_resource<F>(&self, name: &str, predicate: F) -> Result<Arc<Resource>>
    where
        F: Fn(&Arc<Resource>) -> bool,
    {
        self.resources(name)?
            .into_iter()
            .find(|r| predicate(r))
            .ok_or_else(|| Error::ResourceNotFound {
                name: name.to_string(),
                id: String::new(),
            })
    }

    /// All instances of `name`, sorted by id
    pub fn resources(&self, name: &str) -> Result<Vec<Arc<Resource>>> {
        let kind = self.registry.get(name)?;
        let mut found: Vec<Arc<Resource>> = self
            .instances
            .iter()
            .filter(|item| item.value().name() == kind.name())
            .map(|item| item.value().clone())
            .collect();
        found.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(found)
    }

    /// Register, compute and read a field in one step
    pub fn resolve(self: &Arc<Self>, resource: &Arc<Resource>, field: &str) -> Result<Value> {
        resource.register(field)?;
        if let Err(err) = resource.compute(field) {
            if err.is_not_ready() {
                return Err(err);
            }
        }
        resource.field(field)
    }

    /// Watch a field and call `callback` with its value now (if settled)
    /// and every time it is triggered
    pub fn watch_and_update<F>(
        self: &Arc<Self>,
        resource: &Arc<Resource>,
        field: &str,
        watcher: &str,
        callback: F,
    ) -> Result<()>
    where
        F: Fn(Result<Value>) + Send + Sync + 'static,
    {
        if resource.kind().info().field(field).is_none() {
            return Err(Error::UnknownField {
                resource: resource.name().to_string(),
                field: field.to_string(),
            });
        }

        let callback = Arc::new(callback);
        let process: Callback = {
            let weak = Arc::downgrade(resource);
            let field = field.to_string();
            let callback = callback.clone();
            Arc::new(move || {
                let resource = match weak.upgrade() {
                    Some(resource) => resource,
                    None => return,
                };
                trace!(resource = %resource.name(), field = %field, "process field result");
                match resource.cache().load(&field).and_then(|e| e.result()) {
                    Some(result) => callback(result),
                    None => callback(Err(Error::runtime(format!(
                        "couldn't retrieve value of field \"{}\" in resource \"{}\"",
                        field,
                        resource.name()
                    )))),
                }
            })
        };

        let (is_initial, exists) =
            self.observers
                .watch(&resource.field_uid(field), watcher, process.clone());
        if exists {
            return Ok(());
        }

        if is_initial {
            resource.register(field)?;
            match resource.compute(field) {
                Err(err) if err.is_not_ready() => return Ok(()),
                _ => process(),
            }
            return Ok(());
        }

        if let Some(result) = resource.cache().load(field).and_then(|e| e.result()) {
            callback(result);
        }
        Ok(())
    }

    /// Recompute `dst.dfield` whenever `src.sfield` is triggered
    pub fn watch_and_compute(
        self: &Arc<Self>,
        src: &Arc<Resource>,
        sfield: &str,
        dst: &Arc<Resource>,
        dfield: &str,
    ) -> Result<()> {
        let target = DependencyTarget {
            resource: Some(src.clone()),
            field: sfield.to_string(),
            uid: src.field_uid(sfield),
        };
        self.watch_dependency(target, dst, dfield)
    }

    pub(crate) fn watch_dependency(
        self: &Arc<Self>,
        src: DependencyTarget,
        dst: &Arc<Resource>,
        dfield: &str,
    ) -> Result<()> {
        let fid = dst.field_uid(dfield);

        let recompute: Callback = {
            let weak_dst = Arc::downgrade(dst);
            let weak_runtime = Arc::downgrade(self);
            let dfield = dfield.to_string();
            Arc::new(move || {
                let (dst, runtime) = match (weak_dst.upgrade(), weak_runtime.upgrade()) {
                    (Some(dst), Some(runtime)) => (dst, runtime),
                    _ => return,
                };
                if let Err(err) = dst.recompute(&dfield) {
                    if err.is_not_ready() {
                        return;
                    }
                }
                if let Err(err) = runtime.trigger(&dst, &dfield) {
                    if !err.is_not_ready() {
                        error!(field = %dst.field_uid(&dfield).replace('\x00', "/"), error = %err, "failed to trigger resource field");
                    }
                }
            })
        };

        let (is_initial, exists) = self.observers.watch(&src.uid, &fid, recompute);
        if exists || !is_initial {
            return Ok(());
        }

        match src.resource {
            Some(resource) => {
                resource.register(&src.field)?;
                // a failed source stays cached and fails the destination on compute
                if let Err(err) = resource.compute(&src.field) {
                    trace!(src = %src.uid.replace('\x00', "/"), error = %err, "initial compute of watched field");
                }
                Ok(())
            }
            None => {
                warn!(
                    src = %src.uid.replace('\x00', "/"),
                    dst = %fid.replace('\x00', "/"),
                    "watching a field of a resource that does not exist yet"
                );
                Ok(())
            }
        }
    }

    /// Ask a field to settle and notify its watchers
    pub fn trigger(&self, resource: &Arc<Resource>, field: &str) -> Result<()> {
        if field.is_empty() {
            return Err(Error::runtime(
                "cannot trigger a resource without specifying a field",
            ));
        }
        trace!(resource = %resource.name(), id = %resource.id(), field, "trigger");

        match resource.cache().status(field) {
            FieldStatus::Valid | FieldStatus::Error => {
                self.observers.trigger(&resource.field_uid(field));
                Ok(())
            }
            FieldStatus::Computing => Err(Error::NotReady),
            FieldStatus::Unset => {
                resource.compute(field)?;
                if resource.cache().load(field).is_some() {
                    self.observers.trigger(&resource.field_uid(field));
                }
                Ok(())
            }
        }
    }

    /// Remove every watch held by `watcher`
    pub fn unregister(&self, watcher: &str) {
        trace!(watcher, "unregister");
        self.observers.unwatch_all(watcher);
    }

    /// Evict every computed field older than `max_age` across all
    /// instances. Static fields are kept. Returns the number of evicted
    /// entries.
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let age = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_millis().saturating_sub(age);
        let mut evicted = 0;
        for item in self.instances.iter() {
            let resource = item.value();
            for field in resource.cache().stored_fields() {
                let computed = resource
                    .kind()
                    .info()
                    .field(&field)
                    .map(|f| !f.is_static())
                    .unwrap_or(false);
                if computed && resource.cache().evict_field_older_than(&field, cutoff) {
                    evicted += 1;
                }
            }
        }
        debug!(evicted, cutoff, "evicted stale fields");
        evicted
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("session_id", &self.session_id)
            .field("kinds", &self.registry.count())
            .field("instances", &self.instances.len())
            .finish()
    }
}
