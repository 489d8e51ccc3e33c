//! Lexical analysis for LR
//!
//! Converts resource definition source text into a stream of tokens.
//! Comments are emitted as tokens so the parser can attach them as docs.

mod lr_scanner;
mod token;

pub use lr_scanner::LrScanner;
pub use token::{Token, TokenKind};
