//! Tests for the LR scanner and parser

use lr::parser::{parse, parse_named, FieldKind, Lr, SimpleType, TypeExpr};
use lr::{Error, LrParser, LrScanner, TokenKind};

fn parse_ok(source: &str) -> Lr {
    parse(source).unwrap_or_else(|e| panic!("failed to parse {:?}: {}", source, e))
}

fn basic_fields(lr: &Lr, resource: &str) -> Vec<(String, Option<TypeExpr>)> {
    lr.resource(resource)
        .unwrap()
        .body
        .iter()
        .filter_map(|f| match &f.kind {
            FieldKind::Basic(b) => Some((b.id.clone(), b.ty.clone())),
            _ => None,
        })
        .collect()
}

// ====================
// Resources and fields
// ====================

#[test]
fn test_list_typed_field() {
    let lr = parse_ok("name {\n field []type\n}");
    assert_eq!(lr.resources.len(), 1);
    assert_eq!(lr.resources[0].id, "name");
    assert_eq!(
        basic_fields(&lr, "name"),
        vec![(
            "field".to_string(),
            Some(TypeExpr::List(Box::new(TypeExpr::Simple(SimpleType::new(
                "type"
            )))))
        )]
    );
}

#[test]
fn test_init_with_optional_argument() {
    let lr = parse_ok("name {\ninit(one int, two? string)\n}");
    let resource = lr.resource("name").unwrap();
    let init = resource.inits().next().unwrap();
    assert_eq!(init.args.len(), 2);
    assert_eq!(init.args[0].id, "one");
    assert!(!init.args[0].optional);
    assert_eq!(init.args[1].id, "two");
    assert!(init.args[1].optional);
}

#[test]
fn test_init_with_optional_argument_first_parses() {
    // ordering is a schema rule, not a grammar rule
    let lr = parse_ok("name {\ninit(two? string, one int)\n}");
    let init = lr.resource("name").unwrap().inits().next().unwrap();
    assert!(init.args[0].optional);
    assert!(!init.args[1].optional);
}

#[test]
fn test_dotted_dependency() {
    let lr = parse_ok("other {\n  field int\n}\nthing {\n  call(other.field) []int\n}");
    let thing = lr.resource("thing").unwrap();
    match &thing.body[0].kind {
        FieldKind::Basic(basic) => {
            assert_eq!(basic.dependencies(), vec!["other.field"]);
            assert!(!basic.is_static());
        }
        other => panic!("expected basic field, got {:?}", other),
    }
}

#[test]
fn test_resource_ids_can_be_dotted() {
    let lr = parse_ok("os.base {\n  name string\n}\nos.base.user {\n  uid int\n}");
    assert!(lr.resource("os.base").is_some());
    assert!(lr.resource("os.base.user").is_some());
}

#[test]
fn test_resource_order_is_preserved() {
    let lr = parse_ok("zeta\nalpha\nmid {\n  b string\n  a string\n}");
    let ids: Vec<&str> = lr.resources.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    let fields: Vec<String> = basic_fields(&lr, "mid").into_iter().map(|(id, _)| id).collect();
    assert_eq!(fields, vec!["b", "a"]);
}

#[test]
fn test_full_file() {
    let source = r#"
import "core.lr"

option go_package = "example.com/os"

// Operating system
// Running on the target
private os @defaults("name") {
  // Name of the OS
  name string
  embed core.platform as platform
  env() map[string]string
}

extend os {
  uptime() time
}

os.users {
  []os.user(name)
  name string
}
"#;
    let lr = parse_ok(source);
    assert_eq!(lr.imports, vec!["core.lr".to_string()]);
    assert_eq!(lr.options.get("go_package").unwrap(), "example.com/os");

    let os = &lr.resources[0];
    assert!(os.is_private);
    assert_eq!(os.defaults.as_deref(), Some("name"));
    assert_eq!(os.docs(), ("Operating system".to_string(), "Running on the target".to_string()));

    let resolved = os.resolved_fields();
    let names: Vec<&str> = resolved.iter().map(|f| f.field.id.as_str()).collect();
    assert_eq!(names, vec!["name", "platform", "env"]);
    assert!(resolved[1].is_embedded);

    assert!(lr.resources[1].is_extension);

    let users = &lr.resources[2];
    let list = users.list_type.as_ref().unwrap();
    assert_eq!(list.element.name, "os.user");
    assert!(users.resolved_fields().iter().any(|f| f.field.id == "list"));
}

// ====================
// Determinism
// ====================

#[test]
fn test_parse_is_deterministic() {
    let source = "file {\n  init(path string)\n  path string\n  size(path) int\n}\nuser\n";
    assert_eq!(parse_ok(source), parse_ok(source));
}

#[test]
fn test_scanner_and_parser_compose() {
    let tokens = LrScanner::new("file {\n  path string\n}").scan_tokens().unwrap();
    assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    let lr = LrParser::new(tokens).parse().unwrap();
    assert_eq!(lr, parse_ok("file {\n  path string\n}"));
}

// ====================
// Syntax errors
// ====================

#[test]
fn test_syntax_error_names_file_and_line() {
    let err = parse_named("file {\n  path string\n", "os.lr").unwrap_err();
    match err {
        Error::SyntaxError { file, line, .. } => {
            assert_eq!(file, "os.lr");
            assert_eq!(line, 3);
        }
        other => panic!("expected syntax error, got {:?}", other),
    }
}

#[test]
fn test_unterminated_string_is_an_error() {
    assert!(matches!(
        parse("import \"core.lr"),
        Err(Error::SyntaxError { .. })
    ));
}

#[test]
fn test_bad_init_argument_is_an_error() {
    assert!(parse("file {\n  init(path)\n}").is_err());
}
