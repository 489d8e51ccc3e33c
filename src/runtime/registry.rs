//! Resource kinds and the registry holding them
//!
//! A [`ResourceKind`] pairs a resource's schema with the logic bound to it:
//! one compute closure per computed field, an optional init hook and an
//! optional id function. Field dispatch is a table lookup by name.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::resource::Resource;
use super::value::Value;
use super::{Args, Runtime};
use crate::compiler::schema::{ResourceInfo, Schema};
use crate::error::{Error, Result};

/// Logic of a computed field; receives dependency values in declaration order
pub type ComputeFn = Arc<dyn Fn(&Arc<Resource>, Vec<Value>) -> Result<Value> + Send + Sync>;

/// Init hook run before construction
pub type InitFn = Arc<dyn Fn(&Arc<Runtime>, Args) -> Result<InitOutcome> + Send + Sync>;

/// Computes the id of a freshly constructed instance
pub type IdFn = Arc<dyn Fn(&Arc<Resource>) -> Result<String> + Send + Sync>;

/// What an init hook decided
pub enum InitOutcome {
    /// Construct a new instance from these (possibly rewritten) arguments
    Continue(Args),
    /// Return this existing instance instead of constructing one
    Existing(Arc<Resource>),
}

/// Schema and bound logic of one resource
#[derive(Clone)]
pub struct ResourceKind {
    info: ResourceInfo,
    computes: HashMap<String, ComputeFn>,
    init: Option<InitFn>,
    id_fn: Option<IdFn>,
}

impl ResourceKind {
    /// Create a kind with no logic bound yet
    pub fn new(info: ResourceInfo) -> Self {
        ResourceKind {
            info,
            computes: HashMap::new(),
            init: None,
            id_fn: None,
        }
    }

    /// Resource ID
    pub fn name(&self) -> &str {
        &self.info.id
    }

    /// Schema of the resource
    pub fn info(&self) -> &ResourceInfo {
        &self.info
    }

    /// Bind the logic of a computed field
    pub fn bind<F>(&mut self, field: &str, compute: F) -> Result<&mut Self>
    where
        F: Fn(&Arc<Resource>, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        let info = self.info.field(field).ok_or_else(|| Error::UnknownField {
            resource: self.info.id.clone(),
            field: field.to_string(),
        })?;
        if info.is_static() {
            return Err(Error::semantic_field(
                &self.info.id,
                field,
                "static fields are supplied at construction and cannot be computed",
            ));
        }
        self.computes.insert(field.to_string(), Arc::new(compute));
        Ok(self)
    }

    /// Set the init hook
    pub fn set_init<F>(&mut self, init: F) -> &mut Self
    where
        F: Fn(&Arc<Runtime>, Args) -> Result<InitOutcome> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Set the id function. Kinds without one produce a single shared
    /// instance with the empty id.
    pub fn set_id<F>(&mut self, id: F) -> &mut Self
    where
        F: Fn(&Arc<Resource>) -> Result<String> + Send + Sync + 'static,
    {
        self.id_fn = Some(Arc::new(id));
        self
    }

    /// Logic bound to a computed field
    pub fn compute_fn(&self, field: &str) -> Option<&ComputeFn> {
        self.computes.get(field)
    }

    /// Init hook, if any
    pub fn init_fn(&self) -> Option<&InitFn> {
        self.init.as_ref()
    }

    /// Id function, if any
    pub fn id_fn(&self) -> Option<&IdFn> {
        self.id_fn.as_ref()
    }

    /// Computed fields that have no logic bound, sorted
    pub fn unbound_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .info
            .fields
            .values()
            .filter(|f| !f.is_static() && !self.computes.contains_key(&f.name))
            .map(|f| f.name.as_str())
            .collect();
        fields.sort();
        fields
    }
}

impl std::fmt::Debug for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut bound: Vec<&String> = self.computes.keys().collect();
        bound.sort();
        f.debug_struct("ResourceKind")
            .field("name", &self.info.id)
            .field("bound", &bound)
            .field("init", &self.init.is_some())
            .field("id_fn", &self.id_fn.is_some())
            .finish()
    }
}

/// Resource kinds of one runtime session
#[derive(Debug, Clone, Default)]
pub struct Registry {
    kinds: HashMap<String, Arc<ResourceKind>>,
    packs: BTreeSet<String>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a kind for every resource of a schema
    pub fn from_schema(schema: &Schema) -> Self {
        let mut registry = Registry::new();
        registry.add_schema(schema);
        registry
    }

    /// Add kinds from a schema. Known kinds gain the schema's extra fields.
    pub fn add_schema(&mut self, schema: &Schema) {
        for (id, info) in &schema.resources {
            match self.kinds.get_mut(id) {
                Some(kind) => {
                    let kind = Arc::make_mut(kind);
                    let mut merged = Schema::default();
                    merged.resources.insert(id.clone(), kind.info.clone());
                    let mut other = Schema::default();
                    other.resources.insert(id.clone(), info.clone());
                    merged.merge(&other);
                    if let Some(info) = merged.resources.remove(id) {
                        kind.info = info;
                    }
                }
                None => {
                    self.kinds
                        .insert(id.clone(), Arc::new(ResourceKind::new(info.clone())));
                }
            }
        }
        debug!(kinds = self.kinds.len(), "registry loaded schema");
    }

    /// Add the kinds of an imported pack. Names qualified with `pack`
    /// then resolve to these kinds.
    pub fn add_pack(&mut self, pack: &str, schema: &Schema) {
        self.packs.insert(pack.to_string());
        self.add_schema(schema);
    }

    /// Parse a schema from JSON and add its kinds
    pub fn load_schema_json(&mut self, json: &str) -> Result<()> {
        let schema = Schema::from_json(json)?;
        self.add_schema(&schema);
        Ok(())
    }

    /// Register a kind, replacing any kind with the same name
    pub fn register(&mut self, kind: ResourceKind) {
        self.kinds.insert(kind.name().to_string(), Arc::new(kind));
    }

    /// Look up a kind. A name qualified with a known pack (`core.asset`)
    /// falls back to the name without its pack when the qualified one is
    /// unknown.
    pub fn get(&self, name: &str) -> Result<Arc<ResourceKind>> {
        self.lookup(name)
            .cloned()
            .ok_or_else(|| Error::UnknownResource {
                name: name.to_string(),
            })
    }

    fn lookup(&self, name: &str) -> Option<&Arc<ResourceKind>> {
        self.kinds.get(name).or_else(|| {
            name.split_once('.')
                .filter(|(pack, _)| self.packs.contains(*pack))
                .and_then(|(_, rest)| self.kinds.get(rest))
        })
    }

    /// Mutable access to a kind, for binding logic
    pub fn kind_mut(&mut self, name: &str) -> Result<&mut ResourceKind> {
        let key = match self.lookup(name) {
            Some(kind) => kind.name().to_string(),
            None => {
                return Err(Error::UnknownResource {
                    name: name.to_string(),
                })
            }
        };
        self.kinds
            .get_mut(&key)
            .map(Arc::make_mut)
            .ok_or(Error::UnknownResource { name: key })
    }

    /// Check if a kind exists
    pub fn has(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// All kind names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.kinds.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of kinds
    pub fn count(&self) -> usize {
        self.kinds.len()
    }

    /// Schema of every registered kind
    pub fn schema(&self) -> Schema {
        Schema {
            resources: self
                .kinds
                .iter()
                .map(|(id, kind)| (id.clone(), kind.info.clone()))
                .collect(),
        }
    }
}
