//! Property-based fuzzing tests for the LR scanner, parser and schema builder
//!
//! These tests use proptest to generate random inputs and verify that:
//! 1. The scanner and parser never panic on arbitrary input
//! 2. Parsing and schema building are deterministic
//! 3. Well-formed resource declarations always parse

use lr::compiler::build_schema;
use lr::lexer::LrScanner;
use lr::parser::{parse, FieldKind};
use proptest::prelude::*;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// Generate random strings that might break parsers
fn arbitrary_source_string() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[\x00-\x7F]{0,500}").unwrap()
}

/// Generate LR-looking token soup
fn lr_like_string() -> impl Strategy<Value = String> {
    prop::collection::vec(lr_token(), 0..60).prop_map(|tokens| tokens.join(" "))
}

fn lr_token() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("{".to_string()),
        Just("}".to_string()),
        Just("(".to_string()),
        Just(")".to_string()),
        Just("[]".to_string()),
        Just("map[string]".to_string()),
        Just(",".to_string()),
        Just("?".to_string()),
        Just("=".to_string()),
        Just("@defaults".to_string()),
        Just("\n".to_string()),
        // Keywords
        Just("import".to_string()),
        Just("option".to_string()),
        Just("init".to_string()),
        Just("embed".to_string()),
        Just("as".to_string()),
        Just("private".to_string()),
        Just("extend".to_string()),
        // Types
        Just("int".to_string()),
        Just("string".to_string()),
        Just("bool".to_string()),
        Just("time".to_string()),
        // Literals and comments
        Just("\"core.lr\"".to_string()),
        Just("// comment\n".to_string()),
        identifier(),
    ]
}

fn identifier() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[a-z][a-z0-9_]{0,8}(\.[a-z][a-z0-9_]{0,8})?").unwrap()
}

fn primitive() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("bool"),
        Just("int"),
        Just("float"),
        Just("string"),
        Just("time"),
        Just("dict"),
        Just("[]int"),
        Just("map[string]string"),
    ]
}

/// A resource with unique static fields and one computed field per static field
fn resource_source() -> impl Strategy<Value = (String, usize)> {
    prop::collection::btree_map("[a-z]{1,6}", primitive(), 1..8).prop_map(|fields| {
        let mut source = String::from("res {\n");
        for (name, ty) in &fields {
            source.push_str(&format!("  s_{} {}\n", name, ty));
        }
        for (name, ty) in &fields {
            source.push_str(&format!("  c_{}(s_{}) {}\n", name, name, ty));
        }
        source.push_str("}\n");
        (source, fields.len() * 2)
    })
}

// =============================================================================
// SCANNER AND PARSER ROBUSTNESS
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn scanner_never_panics(source in arbitrary_source_string()) {
        let _ = LrScanner::new(&source).scan_tokens();
    }

    #[test]
    fn parser_never_panics(source in arbitrary_source_string()) {
        let _ = parse(&source);
    }

    #[test]
    fn parser_never_panics_on_token_soup(source in lr_like_string()) {
        if let Ok(lr) = parse(&source) {
            let _ = build_schema(&lr);
        }
    }

    #[test]
    fn parse_is_deterministic(source in lr_like_string()) {
        prop_assert_eq!(parse(&source), parse(&source));
    }
}

// =============================================================================
// WELL-FORMED INPUT
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn well_formed_resource_parses((source, count) in resource_source()) {
        let lr = parse(&source).unwrap();
        let resource = lr.resource("res").unwrap();
        prop_assert_eq!(resource.body.len(), count);
        for field in &resource.body {
            prop_assert!(matches!(field.kind, FieldKind::Basic(_)));
        }

        let schema = build_schema(&lr).unwrap();
        let info = schema.resource("res").unwrap();
        prop_assert_eq!(info.fields.len(), count);
        prop_assert_eq!(info.static_fields().count(), count / 2);
    }

    #[test]
    fn schema_digest_is_stable((source, _) in resource_source()) {
        let first = build_schema(&parse(&source).unwrap()).unwrap();
        let second = build_schema(&parse(&source).unwrap()).unwrap();
        prop_assert_eq!(first.digest().unwrap(), second.digest().unwrap());
    }
}
