//! Resource instances and their four field operations
//!
//! `register` wires dependency watches, `compute` fills the cache,
//! `field` reads it, and construction lives in [`Runtime::create_resource`].
//!
//! A plain dependency `name` refers to a field of the same instance; a
//! dotted `resource.field` refers to the shared (empty id) instance of
//! `resource` in the same runtime.

use std::sync::{Arc, OnceLock, Weak};

use tracing::{error, trace};

use super::cache::{Cache, CacheEntry, Claim, ComputeGuard};
use super::observers::field_uid;
use super::registry::ResourceKind;
use super::value::{FromValue, Value};
use super::Runtime;
use crate::compiler::schema::{split_ref, FieldInfo};
use crate::error::{Error, Result};

/// One instance of a resource kind
pub struct Resource {
    kind: Arc<ResourceKind>,
    id: OnceLock<String>,
    cache: Cache,
    runtime: Weak<Runtime>,
}

/// Where a dependency reference points
pub(crate) struct DependencyTarget {
    /// The instance, when it exists
    pub resource: Option<Arc<Resource>>,
    /// Field on that instance
    pub field: String,
    /// Field UID, known even when the instance is not
    pub uid: String,
}

impl Resource {
    pub(crate) fn new(kind: Arc<ResourceKind>, runtime: Weak<Runtime>) -> Self {
        Resource {
            kind,
            id: OnceLock::new(),
            cache: Cache::new(),
            runtime,
        }
    }

    /// Resource kind name
    pub fn name(&self) -> &str {
        self.kind.name()
    }

    /// Instance id; empty until construction assigns it
    pub fn id(&self) -> &str {
        self.id.get().map(String::as_str).unwrap_or("")
    }

    pub(crate) fn set_id(&self, id: String) {
        // ids are assigned once, before the instance is published
        let _ = self.id.set(id);
    }

    /// `kind \0 id`
    pub fn uid(&self) -> String {
        format!("{}\x00{}", self.name(), self.id())
    }

    /// UID of one of this instance's fields
    pub fn field_uid(&self, field: &str) -> String {
        field_uid(self.name(), self.id(), field)
    }

    /// Field cache of this instance
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Kind of this instance
    pub fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Runtime session this instance belongs to
    pub fn runtime(&self) -> Result<Arc<Runtime>> {
        self.runtime
            .upgrade()
            .ok_or_else(|| Error::runtime(format!("runtime of \"{}\" was dropped", self.name())))
    }

    fn field_info(&self, field: &str) -> Result<&FieldInfo> {
        self.kind.info().field(field).ok_or_else(|| Error::UnknownField {
            resource: self.name().to_string(),
            field: field.to_string(),
        })
    }

    pub(crate) fn dependency(self: &Arc<Self>, reference: &str) -> Result<DependencyTarget> {
        match split_ref(reference) {
            (None, name) => Ok(DependencyTarget {
                resource: Some(self.clone()),
                field: name.to_string(),
                uid: self.field_uid(name),
            }),
            (Some(target), name) => {
                let runtime = self.runtime()?;
                let kind = runtime.registry().get(target)?;
                let resource = runtime.get_resource(kind.name(), "").ok();
                Ok(DependencyTarget {
                    resource,
                    field: name.to_string(),
                    uid: field_uid(kind.name(), "", name),
                })
            }
        }
    }

    /// Register watches so `field` is recomputed whenever one of its
    /// dependencies is triggered. A no-op for fields without dependencies.
    pub fn register(self: &Arc<Self>, field: &str) -> Result<()> {
        let info = self.field_info(field)?;
        trace!(resource = %self.name(), id = %self.id(), field, "register");

        if info.refs.is_empty() {
            return Ok(());
        }

        let runtime = self.runtime()?;
        for reference in &info.refs {
            let target = self.dependency(reference)?;
            runtime.watch_dependency(target, self, field)?;
        }
        Ok(())
    }

    /// Compute `field` into the cache.
    ///
    /// Static fields are a no-op. Settled entries are kept, so each
    /// computed field runs at most once until evicted or recomputed.
    /// Returns `NotReady` while a dependency is missing or another caller
    /// is computing the same field.
    pub fn compute(self: &Arc<Self>, field: &str) -> Result<()> {
        let info = self.field_info(field)?;
        trace!(resource = %self.name(), id = %self.id(), field, "compute");

        if info.is_static() {
            return Ok(());
        }

        if info.refs.is_empty() {
            return match self.cache.claim(field, false) {
                Claim::Ready(_) => Ok(()),
                Claim::Busy => Err(Error::NotReady),
                Claim::Acquired(guard) => self.run_compute(field, info, Vec::new(), guard),
            };
        }

        self.compute_with_dependencies(field, info, false)
    }

    /// Compute `field` again even if it is settled. Used when a
    /// dependency changed.
    pub fn recompute(self: &Arc<Self>, field: &str) -> Result<()> {
        let info = self.field_info(field)?;
        trace!(resource = %self.name(), id = %self.id(), field, "recompute");

        if info.is_static() {
            return Ok(());
        }

        if info.refs.is_empty() {
            return match self.cache.claim(field, true) {
                Claim::Ready(_) => Ok(()),
                Claim::Busy => Err(Error::NotReady),
                Claim::Acquired(guard) => self.run_compute(field, info, Vec::new(), guard),
            };
        }

        self.compute_with_dependencies(field, info, true)
    }

    fn compute_with_dependencies(
        self: &Arc<Self>,
        field: &str,
        info: &FieldInfo,
        force: bool,
    ) -> Result<()> {
        let guard = match self.cache.claim(field, force) {
            Claim::Ready(_) => return Ok(()),
            Claim::Busy => return Err(Error::NotReady),
            Claim::Acquired(guard) => guard,
        };

        // dropping the guard on NotReady puts the previous entry back
        let mut values = Vec::with_capacity(info.refs.len());
        for reference in &info.refs {
            let target = self.dependency(reference)?;
            let dep = match target.resource {
                Some(dep) => dep,
                None => return Err(Error::NotReady),
            };

            let value = dep
                .compute(&target.field)
                .and_then(|_| dep.field(&target.field));
            match value {
                Ok(value) => values.push(value),
                Err(Error::NotReady) => return Err(Error::NotReady),
                Err(err) => {
                    // a failed dependency fails the dependent field too
                    guard.finish(CacheEntry::error(err.clone()));
                    return Err(err);
                }
            }
        }

        self.run_compute(field, info, values, guard)
    }

    fn run_compute(
        self: &Arc<Self>,
        field: &str,
        info: &FieldInfo,
        values: Vec<Value>,
        guard: ComputeGuard,
    ) -> Result<()> {
        let compute = match self.kind.compute_fn(field) {
            Some(compute) => compute.clone(),
            None => {
                let err = Error::NotImplemented {
                    resource: self.name().to_string(),
                    field: field.to_string(),
                };
                guard.finish(CacheEntry::error(err.clone()));
                return Err(err);
            }
        };

        match compute(self, values) {
            Ok(value) if value.matches(&info.ty) => {
                guard.finish(CacheEntry::valid(value));
                Ok(())
            }
            Ok(value) => {
                let err = Error::Cast {
                    resource: self.name().to_string(),
                    field: field.to_string(),
                    expected: info.ty.to_string(),
                    got: value.type_name(),
                };
                error!(resource = %self.name(), field, error = %err, "computed value does not match field type");
                guard.finish(CacheEntry::error(err.clone()));
                Err(err)
            }
            // nothing is stored; the guard puts the previous entry back
            Err(Error::NotReady) => Err(Error::NotReady),
            Err(err) => {
                guard.finish(CacheEntry::error(err.clone()));
                Err(err)
            }
        }
    }

    /// Read a field.
    ///
    /// Settled entries are returned as stored. Otherwise static fields
    /// fail, dependency-free fields are computed on the spot (notifying
    /// their watchers), and fields with dependencies return `NotReady`.
    pub fn field(self: &Arc<Self>, field: &str) -> Result<Value> {
        let info = self.field_info(field)?;
        trace!(resource = %self.name(), id = %self.id(), field, "field");

        if let Some(result) = self.cache.load(field).and_then(|e| e.result()) {
            return result;
        }

        if info.is_static() {
            return Err(Error::MissingStaticValue {
                resource: self.name().to_string(),
                field: field.to_string(),
            });
        }

        if !info.refs.is_empty() {
            return Err(Error::NotReady);
        }

        if let Err(err) = self.compute(field) {
            if err.is_not_ready() {
                return Err(err);
            }
        }

        match self.cache.load(field).and_then(|e| e.result()) {
            Some(result) => {
                if let Ok(runtime) = self.runtime() {
                    runtime.observers().trigger(&self.field_uid(field));
                }
                result
            }
            None => Err(Error::NotReady),
        }
    }

    /// Read a field and convert it to a native type
    pub fn get<T: FromValue>(self: &Arc<Self>, field: &str) -> Result<T> {
        let value = self.field(field)?;
        self.cast(field, &value)
    }

    /// Convert a value read from `field`; a mismatch is an internal
    /// consistency error
    pub fn cast<T: FromValue>(&self, field: &str, value: &Value) -> Result<T> {
        T::from_value(value).ok_or_else(|| {
            let err = Error::Cast {
                resource: self.name().to_string(),
                field: field.to_string(),
                expected: T::TYPE_NAME.to_string(),
                got: value.type_name(),
            };
            error!(resource = %self.name(), field, error = %err, "cast failed");
            err
        })
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("fields", &self.cache.stored_fields())
            .finish()
    }
}
