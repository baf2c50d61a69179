//! ulang-error - Errors and diagnostics for the ulang compiler
//!
//! Every phase reports failure through [`CompileError`]. The driver turns
//! it into a [`Diagnostic`] and renders it with a source snippet.
//!
//! # Example
//!
//! ```rust
//! use ulang_error::{CompileError, DiagnosticRenderer, SourceCache};
//! use ulang_error::span::{Position, Span};
//!
//! let mut cache = SourceCache::new();
//! let file_id = cache.add("example.unnamedlang", "int main() { return x; }");
//!
//! let span = Span::new(Position::new(1, 21, 20), Position::new(1, 22, 21), file_id);
//! let err = CompileError::UnboundVariable { name: "x".into(), span };
//!
//! let rendered = DiagnosticRenderer::new(&cache)
//!     .without_colors()
//!     .render(&err.to_diagnostic());
//! assert!(rendered.contains("example.unnamedlang:1:21"));
//! ```

pub mod diagnostic;
pub mod error;
pub mod span;

pub use diagnostic::{
    Diagnostic, DiagnosticRenderer, ErrorCode, Label, Level, SourceCache, SourceFile,
};
pub use error::CompileError;
pub use span::{Position, Span, Spanned};

/// Result type of every compiler phase
pub type Result<T> = std::result::Result<T, CompileError>;
