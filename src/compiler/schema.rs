//! Schema builder
//!
//! Walks a resolved [`Lr`] and produces the reflection-usable [`Schema`]:
//! per resource its fields (type, mandatory flag, dependency refs, docs), its
//! init signature and its list element type. All semantic checks happen here,
//! including a topological check that rejects dependency cycles.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};
use crate::parser::{extract_comments, Lr, Resource, TypeExpr};
use crate::types::Type;

/// Message used when a declared type cannot be resolved
pub const NO_TYPE_DETECTED: &str = "NO_TYPE_DETECTED";

/// Compiled description of every resource
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Resources keyed (and therefore sorted) by ID
    pub resources: BTreeMap<String, ResourceInfo>,
}

/// Shape of one resource
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Dotted resource ID
    pub id: String,
    /// Display name
    pub name: String,
    /// First line of the doc comment
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Remaining doc comment lines
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,
    /// Constructor signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<InitInfo>,
    /// Declared `private`
    #[serde(default)]
    pub private: bool,
    /// Declared with `extend`
    #[serde(default, rename = "isExtension")]
    pub is_extension: bool,
    /// `@defaults(...)` value
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub defaults: String,
    /// Fields keyed by name
    pub fields: BTreeMap<String, FieldInfo>,
    /// Element type for list resources
    #[serde(default, rename = "listType", skip_serializing_if = "Option::is_none")]
    pub list_type: Option<Type>,
}

/// Shape of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Resolved type
    #[serde(rename = "type")]
    pub ty: Type,
    /// Static field: supplied at construction, never computed
    #[serde(default)]
    pub mandatory: bool,
    /// Dependencies as written (`field` or `resource.field`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refs: Vec<String>,
    /// First line of the doc comment
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Remaining doc comment lines
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,
    /// Came from an `embed` declaration
    #[serde(default, rename = "isEmbedded")]
    pub is_embedded: bool,
}

/// Constructor signature of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitInfo {
    /// Arguments in declaration order
    pub args: Vec<InitArg>,
}

/// One constructor argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitArg {
    /// Argument name
    pub name: String,
    /// Resolved type
    #[serde(rename = "type")]
    pub ty: Type,
    /// Marked with `?`
    #[serde(default)]
    pub optional: bool,
}

impl FieldInfo {
    /// Static fields have no dependency list at all
    pub fn is_static(&self) -> bool {
        self.mandatory
    }
}

impl ResourceInfo {
    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.get(name)
    }

    /// Names of all static fields
    pub fn static_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.values().filter(|f| f.is_static())
    }
}

impl Schema {
    /// Look up a resource by ID
    pub fn resource(&self, id: &str) -> Option<&ResourceInfo> {
        self.resources.get(id)
    }

    /// Pretty, deterministic JSON rendering
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a schema from its JSON rendering
    pub fn from_json(json: &str) -> Result<Schema> {
        Ok(serde_json::from_str(json)?)
    }

    /// SHA-256 of the JSON rendering, hex encoded
    pub fn digest(&self) -> Result<String> {
        let json = self.to_json()?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Merge another schema into this one. Unknown resources are added;
    /// for known ones, fields missing here are added and missing docs,
    /// init and list type are filled in.
    pub fn merge(&mut self, other: &Schema) {
        for (id, theirs) in &other.resources {
            match self.resources.get_mut(id) {
                None => {
                    self.resources.insert(id.clone(), theirs.clone());
                }
                Some(ours) => {
                    for (name, field) in &theirs.fields {
                        ours.fields
                            .entry(name.clone())
                            .or_insert_with(|| field.clone());
                    }
                    if ours.title.is_empty() {
                        ours.title = theirs.title.clone();
                    }
                    if ours.desc.is_empty() {
                        ours.desc = theirs.desc.clone();
                    }
                    if ours.init.is_none() {
                        ours.init = theirs.init.clone();
                    }
                    if ours.list_type.is_none() {
                        ours.list_type = theirs.list_type.clone();
                    }
                    if ours.defaults.is_empty() {
                        ours.defaults = theirs.defaults.clone();
                    }
                    // a base declaration wins over extensions
                    ours.is_extension = ours.is_extension && theirs.is_extension;
                    ours.private = ours.private || theirs.private;
                }
            }
        }
    }
}

/// Build the schema for a resolved LR file
pub fn build_schema(lr: &Lr) -> Result<Schema> {
    let local: BTreeSet<&str> = lr.resources.iter().map(|r| r.id.as_str()).collect();
    let mut schema = Schema::default();

    for resource in &lr.resources {
        let info = build_resource(resource, lr, &local)?;
        match schema.resources.get_mut(&resource.id) {
            None => {
                schema.resources.insert(resource.id.clone(), info);
            }
            Some(existing) => {
                if !resource.is_extension && !existing.is_extension {
                    return Err(Error::semantic(
                        &resource.id,
                        "resource declared more than once",
                    ));
                }
                for (name, field) in info.fields {
                    if existing.fields.contains_key(&name) {
                        return Err(Error::semantic_field(
                            &resource.id,
                            name,
                            "field declared more than once",
                        ));
                    }
                    existing.fields.insert(name, field);
                }
                if !resource.is_extension {
                    existing.is_extension = false;
                    existing.title = info.title;
                    existing.desc = info.desc;
                    existing.private = info.private;
                }
                if existing.init.is_some() && info.init.is_some() {
                    return Err(Error::semantic(&resource.id, "duplicate init declaration"));
                }
                existing.init = existing.init.take().or(info.init);
                existing.list_type = existing.list_type.take().or(info.list_type);
                if existing.defaults.is_empty() {
                    existing.defaults = info.defaults;
                }
            }
        }
    }

    for (id, info) in &schema.resources {
        check_refs(id, info, &schema, lr)?;
    }
    check_cycles(&schema)?;

    debug!(
        resources = schema.resources.len(),
        packs = lr.packs.len(),
        "built schema"
    );
    Ok(schema)
}

fn build_resource(resource: &Resource, lr: &Lr, local: &BTreeSet<&str>) -> Result<ResourceInfo> {
    let (title, desc) = resource.docs();
    let mut info = ResourceInfo {
        id: resource.id.clone(),
        name: resource.id.clone(),
        title,
        desc,
        init: None,
        private: resource.is_private,
        is_extension: resource.is_extension,
        defaults: resource.defaults.clone().unwrap_or_default(),
        fields: BTreeMap::new(),
        list_type: None,
    };

    if let Some(list) = &resource.list_type {
        let element = resolve_simple(&list.element.name, lr, local)
            .map_err(|msg| Error::semantic_field(&resource.id, "list", msg))?;
        info.list_type = Some(element);
    }

    for resolved in resource.resolved_fields() {
        let field = &resolved.field;
        let ty = match &field.ty {
            Some(expr) => resolve_type(expr, lr, local)
                .map_err(|msg| Error::semantic_field(&resource.id, &field.id, msg))?,
            None => {
                return Err(Error::semantic_field(
                    &resource.id,
                    &field.id,
                    NO_TYPE_DETECTED,
                ))
            }
        };

        if info.fields.contains_key(&field.id) {
            return Err(Error::semantic_field(
                &resource.id,
                &field.id,
                "field declared more than once",
            ));
        }

        let (title, desc) = extract_comments(&resolved.comments);
        info.fields.insert(
            field.id.clone(),
            FieldInfo {
                name: field.id.clone(),
                ty,
                mandatory: field.is_static(),
                refs: field.dependencies().into_iter().map(str::to_string).collect(),
                title,
                desc,
                is_embedded: resolved.is_embedded,
            },
        );
    }

    let mut inits = resource.inits();
    if let Some(init) = inits.next() {
        if inits.next().is_some() {
            return Err(Error::semantic(&resource.id, "duplicate init declaration"));
        }

        let mut args = Vec::with_capacity(init.args.len());
        let mut seen_optional = false;
        for arg in &init.args {
            let ty = resolve_type(&arg.ty, lr, local)
                .map_err(|msg| Error::semantic_field(&resource.id, &arg.id, msg))?;

            if let Some(field) = info.fields.get(&arg.id) {
                if field.ty != ty {
                    return Err(Error::semantic_field(
                        &resource.id,
                        &arg.id,
                        "init field type and resource field type differ",
                    ));
                }
            }

            if arg.optional {
                seen_optional = true;
            } else if seen_optional {
                return Err(Error::semantic_field(
                    &resource.id,
                    &arg.id,
                    "required init argument follows an optional one",
                ));
            }

            args.push(InitArg {
                name: arg.id.clone(),
                ty,
                optional: arg.optional,
            });
        }
        info.init = Some(InitInfo { args });
    }

    Ok(info)
}

/// Resolve a declared type to a semantic type
pub fn resolve_type(
    expr: &TypeExpr,
    lr: &Lr,
    local: &BTreeSet<&str>,
) -> std::result::Result<Type, String> {
    match expr {
        TypeExpr::Simple(simple) => resolve_simple(&simple.name, lr, local),
        TypeExpr::List(inner) => Ok(Type::array(resolve_type(inner, lr, local)?)),
        TypeExpr::Map { key, value } => Ok(Type::map(
            resolve_simple(&key.name, lr, local)?,
            resolve_type(value, lr, local)?,
        )),
    }
}

fn resolve_simple(
    name: &str,
    lr: &Lr,
    local: &BTreeSet<&str>,
) -> std::result::Result<Type, String> {
    if let Some(ty) = Type::primitive(name) {
        return Ok(ty);
    }
    if local.contains(name) {
        return Ok(Type::Resource(name.to_string()));
    }
    if let Some((pack, rest)) = lr.split_pack(name) {
        let known = lr
            .packs
            .get(pack)
            .map(|p| p.resources.contains(rest))
            .unwrap_or(false);
        if known {
            return Ok(Type::Resource(rest.to_string()));
        }
        return Err(format!("unknown resource '{}' in pack '{}'", rest, pack));
    }
    Err(format!("{} ({})", NO_TYPE_DETECTED, name))
}

/// Split a dependency reference into its target resource (if dotted) and
/// field name. Dotted references split at the last dot.
pub fn split_ref(reference: &str) -> (Option<&str>, &str) {
    match reference.rsplit_once('.') {
        Some((resource, field)) => (Some(resource), field),
        None => (None, reference),
    }
}

fn check_refs(id: &str, info: &ResourceInfo, schema: &Schema, lr: &Lr) -> Result<()> {
    for field in info.fields.values() {
        for reference in &field.refs {
            let known = match split_ref(reference) {
                // extensions of resources declared elsewhere cannot be checked
                (None, name) => info.is_extension || info.fields.contains_key(name),
                (Some(target), name) => match schema.resources.get(target) {
                    Some(other) => other.is_extension || other.fields.contains_key(name),
                    None => lr
                        .split_pack(target)
                        .and_then(|(pack, rest)| lr.packs.get(pack).map(|p| p.resources.contains(rest)))
                        .unwrap_or(false),
                },
            };
            if !known {
                return Err(Error::semantic_field(
                    id,
                    &field.name,
                    format!("unknown dependency '{}'", reference),
                ));
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm over `resource.field` nodes of every computed field
/// with sorted tie-breaking; anything left unordered sits on a cycle.
fn check_cycles(schema: &Schema) -> Result<()> {
    let mut in_degree: HashMap<String, usize> = HashMap::new();
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for (id, info) in &schema.resources {
        for field in info.fields.values().filter(|f| !f.is_static()) {
            let node = format!("{}.{}", id, field.name);
            in_degree.entry(node.clone()).or_insert(0);
            adjacency.entry(node).or_default();
        }
    }

    for (id, info) in &schema.resources {
        for field in info.fields.values().filter(|f| !f.is_static()) {
            let node = format!("{}.{}", id, field.name);
            for reference in &field.refs {
                let dep = match split_ref(reference) {
                    (None, name) => format!("{}.{}", id, name),
                    (Some(_), _) => reference.clone(),
                };
                // static fields and fields of other packs cannot close a loop
                if !in_degree.contains_key(&dep) {
                    continue;
                }
                adjacency.entry(dep).or_default().push(node.clone());
                *in_degree.entry(node.clone()).or_insert(0) += 1;
            }
        }
    }

    let mut zero_degree: Vec<String> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(id, _)| id.clone())
        .collect();
    zero_degree.sort();
    let mut queue: VecDeque<String> = zero_degree.into_iter().collect();

    let mut ordered = 0;
    while let Some(current) = queue.pop_front() {
        ordered += 1;
        let mut next_ready = Vec::new();
        if let Some(neighbors) = adjacency.get(&current) {
            for neighbor in neighbors {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        next_ready.push(neighbor.clone());
                    }
                }
            }
        }
        next_ready.sort();
        queue.extend(next_ready);
    }

    if ordered != in_degree.len() {
        let mut members: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(node, _)| node)
            .collect();
        members.sort();
        return Err(Error::DependencyCycle { members });
    }

    Ok(())
}
