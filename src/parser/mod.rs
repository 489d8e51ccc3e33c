//! LR Parser Module
//!
//! Parses LR resource definitions into an Abstract Syntax Tree (AST).

mod ast;
mod lr_parser;

pub use ast::{
    extract_comments, BasicField, Embed, Field, FieldArgs, FieldKind, Init, ListTypeDecl, Lr,
    Pack, ResolvedField, Resource, SimpleType, TypeExpr, TypedArg,
};
pub use lr_parser::LrParser;

use crate::error::Result;
use crate::lexer::LrScanner;

/// Scan and parse LR source in one step
pub fn parse(source: &str) -> Result<Lr> {
    parse_named(source, "<input>")
}

/// Scan and parse LR source, naming `file` in syntax errors
pub fn parse_named(source: &str, file: &str) -> Result<Lr> {
    let tokens = LrScanner::with_file(source, file).scan_tokens()?;
    LrParser::with_file(tokens, file).parse()
}
