use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A parsed LR file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Lr {
    /// Import paths in declaration order. Emptied by the resolver once the
    /// imports have been absorbed into `packs`.
    pub imports: Vec<String>,
    /// Top-level `option key = "value"` pairs
    pub options: BTreeMap<String, String>,
    /// Resources in source order
    pub resources: Vec<Resource>,
    /// Resolved imports keyed by pack name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub packs: BTreeMap<String, Pack>,
}

/// What an import contributes once resolved
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pack {
    /// Resource IDs declared directly by the imported file
    pub resources: BTreeSet<String>,
    /// Module path the imported bindings live at
    pub module_path: String,
}

impl Lr {
    /// Find a resource by ID
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Split a dotted name into an imported pack and the remaining name,
    /// if its first segment names a resolved pack
    pub fn split_pack<'a>(&self, name: &'a str) -> Option<(&'a str, &'a str)> {
        let (pack, rest) = name.split_once('.')?;
        if self.packs.contains_key(pack) {
            Some((pack, rest))
        } else {
            None
        }
    }
}

/// Resource declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Raw comments preceding the declaration, markers included
    pub comments: Vec<String>,
    /// `private` modifier
    pub is_private: bool,
    /// `extend` modifier: adds fields to a resource declared elsewhere
    pub is_extension: bool,
    /// Dotted identifier
    pub id: String,
    /// `@defaults("...")` annotation
    pub defaults: Option<String>,
    /// `[]Element` prefix turning the resource into a typed list
    pub list_type: Option<ListTypeDecl>,
    /// Body declarations in source order
    pub body: Vec<Field>,
    /// Line of the resource identifier
    pub line: usize,
    /// Column of the resource identifier
    pub column: usize,
}

/// `[]Element(args)` list prefix of a resource body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListTypeDecl {
    /// Element type of the list
    pub element: SimpleType,
    /// Dependencies of the implicit `list` field
    pub args: Option<FieldArgs>,
}

/// One body declaration together with its doc comments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Raw comments preceding the declaration
    pub comments: Vec<String>,
    /// The declaration itself
    pub kind: FieldKind,
    /// Line where the declaration starts
    pub line: usize,
    /// Column where the declaration starts
    pub column: usize,
}

/// Body declaration kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    /// `name [(deps)] [type]`
    Basic(BasicField),
    /// `init(arg type, opt? type)`
    Init(Init),
    /// `embed other.resource [as alias]`
    Embed(Embed),
}

/// A field declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicField {
    /// Field name
    pub id: String,
    /// `None` for static fields, `Some` (possibly empty) for computed ones
    pub args: Option<FieldArgs>,
    /// Declared type
    pub ty: Option<TypeExpr>,
}

impl BasicField {
    /// Static fields are supplied at construction and never computed
    pub fn is_static(&self) -> bool {
        self.args.is_none()
    }

    /// Names of the fields this one is computed from
    pub fn dependencies(&self) -> Vec<&str> {
        self.args
            .as_ref()
            .map(|a| a.list.iter().map(|t| t.name.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Dependency list of a computed field
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldArgs {
    /// Referenced fields (`name` or `resource.field`)
    pub list: Vec<SimpleType>,
}

/// Constructor signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Init {
    /// Arguments in declaration order
    pub args: Vec<TypedArg>,
}

/// Constructor argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedArg {
    /// Argument name
    pub id: String,
    /// Marked with `?`
    pub optional: bool,
    /// Declared type
    pub ty: TypeExpr,
}

/// Embedded resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    /// Embedded resource ID
    pub ty: String,
    /// Field name override
    pub alias: Option<String>,
}

impl Embed {
    /// Name of the field the embed turns into: the alias, or the first
    /// segment of the embedded ID (`os` for `os.base`)
    pub fn field_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self.ty.split('.').next().unwrap_or(&self.ty).to_string(),
        }
    }
}

/// Declared type expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// Primitive or resource name
    Simple(SimpleType),
    /// `[]T`
    List(Box<TypeExpr>),
    /// `map[K]V`
    Map {
        /// Key type, always simple
        key: SimpleType,
        /// Value type
        value: Box<TypeExpr>,
    },
}

/// Primitive or resource name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimpleType {
    /// Name as written, possibly dotted
    pub name: String,
}

impl SimpleType {
    /// Creates a simple type from a name
    pub fn new(name: impl Into<String>) -> Self {
        SimpleType { name: name.into() }
    }
}

impl fmt::Display for SimpleType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeExpr::Simple(s) => write!(f, "{}", s),
            TypeExpr::List(inner) => write!(f, "[]{}", inner),
            TypeExpr::Map { key, value } => write!(f, "map[{}]{}", key, value),
        }
    }
}

/// A field after list and embed desugaring
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    /// Raw comments of the declaration it came from
    pub comments: Vec<String>,
    /// The field
    pub field: BasicField,
    /// Came from an `embed` declaration
    pub is_embedded: bool,
    /// Line of the declaration
    pub line: usize,
}

impl Resource {
    /// All `init` declarations; more than one is a schema error
    pub fn inits(&self) -> impl Iterator<Item = &Init> {
        self.body.iter().filter_map(|f| match &f.kind {
            FieldKind::Init(init) => Some(init),
            _ => None,
        })
    }

    /// Fields in source order, with embeds turned into dependency-free
    /// computed fields and the implicit `list` field of list resources
    /// appended last.
    pub fn resolved_fields(&self) -> Vec<ResolvedField> {
        let mut fields = Vec::new();

        for decl in &self.body {
            match &decl.kind {
                FieldKind::Basic(basic) => fields.push(ResolvedField {
                    comments: decl.comments.clone(),
                    field: basic.clone(),
                    is_embedded: false,
                    line: decl.line,
                }),
                FieldKind::Embed(embed) => fields.push(ResolvedField {
                    comments: decl.comments.clone(),
                    field: BasicField {
                        id: embed.field_name(),
                        args: Some(FieldArgs::default()),
                        ty: Some(TypeExpr::Simple(SimpleType::new(embed.ty.clone()))),
                    },
                    is_embedded: true,
                    line: decl.line,
                }),
                FieldKind::Init(_) => {}
            }
        }

        if let Some(list) = &self.list_type {
            // the list is always computed, even without declared dependencies
            fields.push(ResolvedField {
                comments: Vec::new(),
                field: BasicField {
                    id: "list".to_string(),
                    args: Some(list.args.clone().unwrap_or_default()),
                    ty: Some(TypeExpr::List(Box::new(TypeExpr::Simple(
                        list.element.clone(),
                    )))),
                },
                is_embedded: false,
                line: self.line,
            });
        }

        fields
    }

    /// Title and description from the doc comments
    pub fn docs(&self) -> (String, String) {
        extract_comments(&self.comments)
    }
}

/// Split raw `//` comments into a title (first line) and a description
/// (remaining lines joined by spaces).
pub fn extract_comments(raw: &[String]) -> (String, String) {
    let mut lines = raw.iter().map(|line| {
        line.strip_prefix("//")
            .unwrap_or(line)
            .trim_matches(|c| c == ' ' || c == '\t' || c == '\n')
            .to_string()
    });
    let title = match lines.next() {
        Some(title) => title,
        None => return (String::new(), String::new()),
    };
    let desc = lines.collect::<Vec<_>>().join(" ");
    (title, desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(id: &str, args: Option<Vec<&str>>, ty: &str) -> Field {
        Field {
            comments: vec![],
            kind: FieldKind::Basic(BasicField {
                id: id.to_string(),
                args: args.map(|a| FieldArgs {
                    list: a.into_iter().map(SimpleType::new).collect(),
                }),
                ty: Some(TypeExpr::Simple(SimpleType::new(ty))),
            }),
            line: 1,
            column: 1,
        }
    }

    #[test]
    fn test_extract_comments() {
        let (title, desc) = extract_comments(&[
            "// File on disk".to_string(),
            "//   with content".to_string(),
            "// and permissions".to_string(),
        ]);
        assert_eq!(title, "File on disk");
        assert_eq!(desc, "with content and permissions");
        assert_eq!(extract_comments(&[]), (String::new(), String::new()));
    }

    #[test]
    fn test_resolved_fields_appends_list() {
        let resource = Resource {
            comments: vec![],
            is_private: false,
            is_extension: false,
            id: "users".to_string(),
            defaults: None,
            list_type: Some(ListTypeDecl {
                element: SimpleType::new("user"),
                args: None,
            }),
            body: vec![
                basic("count", Some(vec![]), "int"),
                Field {
                    comments: vec![],
                    kind: FieldKind::Embed(Embed {
                        ty: "os.base".to_string(),
                        alias: None,
                    }),
                    line: 2,
                    column: 1,
                },
            ],
            line: 1,
            column: 1,
        };

        let fields = resource.resolved_fields();
        let names: Vec<_> = fields.iter().map(|f| f.field.id.as_str()).collect();
        assert_eq!(names, vec!["count", "os", "list"]);
        assert!(fields[1].is_embedded);
        assert_eq!(fields[2].field.args, Some(FieldArgs::default()));
        assert_eq!(fields[2].field.ty.as_ref().unwrap().to_string(), "[]user");
    }

    #[test]
    fn test_field_dependencies() {
        let FieldKind::Basic(field) = basic("content", Some(vec!["path", "os.base"]), "string").kind
        else {
            panic!("expected basic field");
        };
        assert!(!field.is_static());
        assert_eq!(field.dependencies(), vec!["path", "os.base"]);
    }

    #[test]
    fn test_type_expr_display() {
        let ty = TypeExpr::Map {
            key: SimpleType::new("string"),
            value: Box::new(TypeExpr::List(Box::new(TypeExpr::Simple(SimpleType::new(
                "int",
            ))))),
        };
        assert_eq!(ty.to_string(), "map[string][]int");
    }
}
