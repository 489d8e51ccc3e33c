//! Rust binding generator
//!
//! For every resource (sorted by ID) emits a typed wrapper around
//! `Arc<Resource>`, a provider trait holding the resource's logic, and a
//! `register_*` function that binds that logic into the kind's field table.

use std::collections::{BTreeMap, BTreeSet};

use super::schema::{build_schema, split_ref};
use super::CompileOptions;
use crate::error::{Error, Result};
use crate::parser::{extract_comments, Lr, ResolvedField, Resource, TypeExpr};
use crate::types::Type;

/// Generate Rust bindings for a resolved LR file
pub fn generate(lr: &Lr, options: &CompileOptions) -> Result<String> {
    let schema = build_schema(lr)?;
    let groups = group_resources(lr);

    let mut generator = Generator {
        lr,
        groups: &groups,
        packs_used: BTreeSet::new(),
        uses_time: false,
        uses_map: false,
    };

    let mut body = String::new();
    for (id, decls) in &groups {
        body.push_str(&generator.resource(id, decls)?);
    }

    let rt = &options.runtime_crate;
    let mut code = String::new();
    code.push_str(&format!("{}\n\n", options.header));
    if generator.uses_map {
        code.push_str("use std::collections::BTreeMap;\n");
    }
    code.push_str("use std::sync::Arc;\n\n");
    if generator.uses_time {
        code.push_str(&format!("use {}::chrono::{{DateTime, Utc}};\n", rt));
    }
    code.push_str(&format!(
        "use {}::runtime::{{Args, FromValue, InitOutcome, Registry, Resource, Runtime, Value}};\n",
        rt
    ));
    code.push_str(&format!("use {}::Result;\n", rt));
    for pack in &generator.packs_used {
        if let Some(info) = lr.packs.get(pack) {
            code.push_str(&format!("use {} as {};\n", info.module_path, pack));
        }
    }
    code.push('\n');

    if options.embed_schema {
        let json = schema.to_json()?;
        let hashes = "#".repeat(raw_string_hashes(&json));
        code.push_str("/// Schema of every resource in this file\n");
        code.push_str(&format!(
            "pub const SCHEMA_JSON: &str = r{h}\"{json}\"{h};\n\n",
            h = hashes,
            json = json
        ));
    }

    let mut bounds: Vec<String> = groups
        .keys()
        .map(|id| format!("{}Provider", wrapper_name(id)))
        .collect();
    bounds.push("Send + Sync + 'static".to_string());
    code.push_str("/// All resource providers of this file\n");
    code.push_str(&format!("pub trait Provider: {} {{}}\n\n", bounds.join(" + ")));

    code.push_str("/// Bind every resource of this file into `registry`\n");
    code.push_str("pub fn init<P: Provider>(registry: &mut Registry, provider: Arc<P>) -> Result<()> {\n");
    for id in groups.keys() {
        code.push_str(&format!(
            "    register_{}(registry, provider.clone())?;\n",
            snake_case(id)
        ));
    }
    code.push_str("    Ok(())\n}\n");

    code.push_str(&body);
    Ok(code)
}

/// Declarations sharing an ID (a base and its local extensions), by ID
fn group_resources(lr: &Lr) -> BTreeMap<&str, Vec<&Resource>> {
    let mut groups: BTreeMap<&str, Vec<&Resource>> = BTreeMap::new();
    for resource in &lr.resources {
        groups.entry(resource.id.as_str()).or_default().push(resource);
    }
    groups
}

struct Generator<'a> {
    lr: &'a Lr,
    groups: &'a BTreeMap<&'a str, Vec<&'a Resource>>,
    packs_used: BTreeSet<String>,
    uses_time: bool,
    uses_map: bool,
}

impl<'a> Generator<'a> {
    fn resource(&mut self, id: &str, decls: &[&Resource]) -> Result<String> {
        let wrapper = wrapper_name(id);
        let base = decls.iter().find(|r| !r.is_extension).unwrap_or(&decls[0]);
        let (title, desc) = base.docs();
        let fields: Vec<ResolvedField> = decls.iter().flat_map(|r| r.resolved_fields()).collect();
        let computed: Vec<&ResolvedField> = fields.iter().filter(|f| !f.field.is_static()).collect();
        let mut code = String::new();

        // Typed wrapper
        code.push('\n');
        code.push_str(&doc_lines(&title, &desc, &format!("`{}` resource", id)));
        code.push_str("#[derive(Debug, Clone)]\n");
        code.push_str(&format!("pub struct {}(pub Arc<Resource>);\n\n", wrapper));
        code.push_str(&format!("impl {} {{\n", wrapper));
        code.push_str("    /// Resource ID\n");
        code.push_str(&format!("    pub const NAME: &'static str = \"{}\";\n\n", id));
        code.push_str("    /// Instance id\n");
        code.push_str("    pub fn id(&self) -> &str {\n        self.0.id()\n    }\n\n");
        code.push_str("    /// Underlying instance\n");
        code.push_str("    pub fn resource(&self) -> &Arc<Resource> {\n        &self.0\n    }\n");
        for field in &fields {
            let name = &field.field.id;
            let ty = self.field_type(field)?;
            let (title, _) = extract_comments(&field.comments);
            code.push('\n');
            if !title.is_empty() {
                code.push_str(&format!("    /// {}\n", title));
            }
            code.push_str(&format!(
                "    pub fn {}(&self) -> Result<{}> {{\n        self.0.get::<{}>(\"{}\")\n    }}\n",
                method_name(name),
                ty,
                ty,
                name
            ));
        }
        code.push_str("}\n\n");

        code.push_str(&format!("impl FromValue for {} {{\n", wrapper));
        code.push_str(&format!("    const TYPE_NAME: &'static str = \"{}\";\n\n", id));
        code.push_str("    fn from_value(value: &Value) -> Option<Self> {\n");
        code.push_str("        match value {\n");
        code.push_str(&format!(
            "            Value::Resource(r) if r.name() == Self::NAME => Some({}(r.clone())),\n",
            wrapper
        ));
        code.push_str("            _ => None,\n        }\n    }\n}\n\n");
        code.push_str(&format!("impl From<{}> for Value {{\n", wrapper));
        code.push_str(&format!(
            "    fn from(r: {}) -> Self {{\n        Value::Resource(r.0)\n    }}\n}}\n",
            wrapper
        ));

        // Provider trait
        code.push('\n');
        code.push_str(&format!("/// Logic of the `{}` resource\n", id));
        code.push_str(&format!("pub trait {}Provider {{\n", wrapper));
        code.push_str("    /// Rewrite constructor arguments or return an existing instance\n");
        code.push_str("    fn init(&self, _runtime: &Arc<Runtime>, args: Args) -> Result<InitOutcome> {\n");
        code.push_str("        Ok(InitOutcome::Continue(args))\n    }\n\n");
        code.push_str("    /// Id of a new instance; the empty id makes it a shared instance\n");
        code.push_str(&format!(
            "    fn id(&self, _resource: &{}) -> Result<String> {{\n        Ok(String::new())\n    }}\n",
            wrapper
        ));
        for field in &computed {
            let ty = self.field_type(field)?;
            let mut signature = format!("resource: &{}", wrapper);
            for (param, param_ty, _) in self.dependency_params(id, field) {
                signature.push_str(&format!(", {}: {}", param, param_ty));
            }
            code.push_str(&format!(
                "\n    fn {}(&self, {}) -> Result<{}>;\n",
                method_name(&field.field.id),
                signature,
                ty
            ));
        }
        code.push_str("}\n");

        // Registration
        code.push('\n');
        code.push_str(&format!("/// Bind the `{}` provider into `registry`\n", id));
        code.push_str(&format!(
            "pub fn register_{}<P: {}Provider + Send + Sync + 'static>(\n    registry: &mut Registry,\n    provider: Arc<P>,\n) -> Result<()> {{\n",
            snake_case(id),
            wrapper
        ));
        code.push_str(&format!("    let kind = registry.kind_mut({}::NAME)?;\n", wrapper));
        code.push_str("    {\n        let provider = provider.clone();\n");
        code.push_str(&format!(
            "        kind.set_init(move |runtime, args| <P as {}Provider>::init(&*provider, runtime, args));\n    }}\n",
            wrapper
        ));
        code.push_str("    {\n        let provider = provider.clone();\n");
        code.push_str(&format!(
            "        kind.set_id(move |resource| <P as {w}Provider>::id(&*provider, &{w}(resource.clone())));\n    }}\n",
            w = wrapper
        ));
        for field in &computed {
            let name = &field.field.id;
            let params = self.dependency_params(id, field);
            let deps_binding = if params.is_empty() { "_deps" } else { "deps" };
            code.push_str("    {\n        let provider = provider.clone();\n");
            code.push_str(&format!(
                "        kind.bind(\"{}\", move |resource, {}| {{\n",
                name, deps_binding
            ));
            if !params.is_empty() {
                code.push_str("            let mut deps = deps.into_iter();\n");
            }
            let mut call_args = format!("&{}(resource.clone())", wrapper);
            for (param, param_ty, reference) in &params {
                code.push_str(&format!(
                    "            let {}: {} = resource.cast(\"{}\", &deps.next().unwrap_or(Value::Null))?;\n",
                    param, param_ty, reference
                ));
                call_args.push_str(&format!(", {}", param));
            }
            code.push_str(&format!(
                "            let value = <P as {}Provider>::{}(&*provider, {})?;\n",
                wrapper,
                method_name(name),
                call_args
            ));
            code.push_str("            Ok(Value::from(value))\n        })?;\n    }\n");
        }
        code.push_str("    Ok(())\n}\n");

        Ok(code)
    }

    fn field_type(&mut self, field: &ResolvedField) -> Result<String> {
        match &field.field.ty {
            Some(expr) => Ok(self.rust_type(expr)),
            None => Err(Error::semantic_field(
                "",
                &field.field.id,
                super::schema::NO_TYPE_DETECTED,
            )),
        }
    }

    /// `(param name, rust type, reference)` per dependency
    fn dependency_params(
        &mut self,
        resource_id: &str,
        field: &ResolvedField,
    ) -> Vec<(String, String, String)> {
        let mut params = Vec::new();
        for reference in field.field.dependencies() {
            let (target, name) = split_ref(reference);
            let target_id = target.unwrap_or(resource_id);
            let ty = match self.local_field_type(target_id, name) {
                Some(expr) => self.rust_type(&expr),
                // fields of other packs are only known at runtime
                None => "Value".to_string(),
            };
            params.push((param_name(reference), ty, reference.to_string()));
        }
        params
    }

    fn local_field_type(&self, resource_id: &str, field: &str) -> Option<TypeExpr> {
        let decls = self.groups.get(resource_id)?;
        decls
            .iter()
            .flat_map(|r| r.resolved_fields())
            .find(|f| f.field.id == field)
            .and_then(|f| f.field.ty)
    }

    fn rust_type(&mut self, expr: &TypeExpr) -> String {
        match expr {
            TypeExpr::List(_) => "Vec<Value>".to_string(),
            TypeExpr::Map { .. } => {
                self.uses_map = true;
                "BTreeMap<String, Value>".to_string()
            }
            TypeExpr::Simple(simple) => match Type::primitive(&simple.name) {
                Some(Type::Bool) => "bool".to_string(),
                Some(Type::Int) => "i64".to_string(),
                Some(Type::Float) => "f64".to_string(),
                Some(Type::String) | Some(Type::Regex) => "String".to_string(),
                Some(Type::Time) => {
                    self.uses_time = true;
                    "DateTime<Utc>".to_string()
                }
                Some(_) => "Value".to_string(),
                None => {
                    if self.groups.contains_key(simple.name.as_str()) {
                        wrapper_name(&simple.name)
                    } else if let Some((pack, rest)) = self.lr.split_pack(&simple.name) {
                        self.packs_used.insert(pack.to_string());
                        format!("{}::{}", pack, wrapper_name(rest))
                    } else {
                        wrapper_name(&simple.name)
                    }
                }
            },
        }
    }
}

fn doc_lines(title: &str, desc: &str, fallback: &str) -> String {
    if title.is_empty() {
        return format!("/// {}\n", fallback);
    }
    if desc.is_empty() {
        return format!("/// {}\n", title);
    }
    format!("/// {}\n///\n/// {}\n", title, desc)
}

/// Enough `#`s to delimit `s` as a raw string literal
fn raw_string_hashes(s: &str) -> usize {
    let mut longest = 0;
    let mut rest = s;
    while let Some(pos) = rest.find('"') {
        rest = &rest[pos + 1..];
        let run = rest.chars().take_while(|c| *c == '#').count();
        longest = longest.max(run);
    }
    longest + 1
}

/// `os.base` -> `OsBase`, `user_group` -> `UserGroup`
pub fn camel_case(id: &str) -> String {
    id.split(|c| c == '.' || c == '_')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// Items the generated code imports or declares itself
const RESERVED_TYPES: &[&str] = &[
    "Args", "Arc", "BTreeMap", "DateTime", "FromValue", "InitOutcome", "Provider", "Registry",
    "Resource", "Result", "Runtime", "Utc", "Value",
];

/// Wrapper type of a resource; names clashing with generated imports get an `Lr` prefix
pub fn wrapper_name(id: &str) -> String {
    let name = camel_case(id);
    if RESERVED_TYPES.contains(&name.as_str()) {
        format!("Lr{}", name)
    } else {
        name
    }
}

/// `os.base` -> `os_base`
pub fn snake_case(id: &str) -> String {
    id.replace('.', "_").to_ascii_lowercase()
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where",
    "while", "abstract", "become", "box", "do", "final", "macro", "override", "priv", "try",
    "typeof", "unsized", "virtual", "yield",
];

/// Names that cannot be raw identifiers, or clash with generated items
const RESERVED: &[&str] = &["self", "Self", "super", "crate", "id", "init", "resource", "_"];

/// Method name for a field
fn method_name(field: &str) -> String {
    let name = field.trim_start_matches('$');
    if RESERVED.contains(&name) {
        format!("{}_field", name)
    } else if RUST_KEYWORDS.contains(&name) {
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}

/// Parameter name for a dependency reference
fn param_name(reference: &str) -> String {
    let name = snake_case(reference.trim_start_matches('$'));
    if RESERVED.contains(&name.as_str()) || name == "provider" || name == "deps" {
        format!("{}_dep", name)
    } else if RUST_KEYWORDS.contains(&name.as_str()) {
        format!("r#{}", name)
    } else {
        name
    }
}
