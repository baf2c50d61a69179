//! ulang-parser - Parser for the ulang language
//!
//! Converts a token stream into an AST.
//!
//! # Example
//!
//! ```rust
//! use ulang_parser::parse_source;
//!
//! let program = parse_source("int main() { return 2 + 3 * 4; }", 0).unwrap();
//! assert_eq!(program.functions.len(), 1);
//! ```

pub mod ast;
pub mod parser;

pub use ast::*;
pub use parser::{parse, parse_source, Parser};
