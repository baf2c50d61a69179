//! ulang-lexer - Tokenizer for the ulang language
//!
//! Converts source text into a lazy stream of [`Token`]s.
//!
//! # Example
//!
//! ```rust
//! use ulang_lexer::{Lexer, TokenKind};
//!
//! let lexer = Lexer::new();
//! let kinds: Vec<TokenKind> = lexer
//!     .lex("int main() { return 0; }", 0)
//!     .map(|t| t.map(|t| t.kind))
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//!
//! assert_eq!(kinds.first(), Some(&TokenKind::Int));
//! assert_eq!(kinds.last(), Some(&TokenKind::Eof));
//! ```

pub mod lexer;
pub mod token;

pub use lexer::{tokenize, Lexer, Tokens};
pub use token::{Token, TokenKind};
