//! The fatal error taxonomy shared by every compiler phase.

use crate::diagnostic::{Diagnostic, ErrorCode};
use crate::span::Span;
use thiserror::Error;

/// First error raised by the lexer, the parser or the IR emitter.
///
/// Compilation stops at the first error; there is no recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// No token rule matches at the current position
    #[error("unexpected character `{ch}`")]
    Lex { ch: char, span: Span },

    /// A token that no grammar production accepts here
    #[error("expected {expected}, found {found}")]
    Parse {
        found: String,
        expected: String,
        span: Span,
    },

    #[error("no `main` function defined")]
    NoMainFunction,

    /// A function name is already bound to a global that is not a function
    #[error("function `{name}` collides with a global of the same name")]
    NameCollision { name: String, span: Span },

    /// A function name already has a body
    #[error("redefinition of `{name}`")]
    Redefinition { name: String, span: Span },

    /// Signature redeclared, or function called, with a different argument count
    #[error("`{name}` takes {expected} argument(s) but {found} were given")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },

    #[error("call to unknown function `{name}`")]
    UnknownFunction { name: String, span: Span },

    /// Left side of `=` is not a bare variable
    #[error("invalid assignment target")]
    InvalidAssignmentTarget { span: Span },

    #[error("use of unbound variable `{name}`")]
    UnboundVariable { name: String, span: Span },

    /// Body can fall off its end and there is no trailing return expression
    #[error("function `{name}` may finish without returning a value")]
    MissingReturn { name: String, span: Span },

    /// The IR builder or verifier rejected lowered code
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CompileError::Lex { .. } => ErrorCode::UNEXPECTED_CHAR,
            CompileError::Parse { .. } => ErrorCode::UNEXPECTED_TOKEN,
            CompileError::NoMainFunction => ErrorCode::NO_MAIN_FUNCTION,
            CompileError::NameCollision { .. } => ErrorCode::NAME_COLLISION,
            CompileError::Redefinition { .. } => ErrorCode::REDEFINITION,
            CompileError::ArityMismatch { .. } => ErrorCode::ARITY_MISMATCH,
            CompileError::UnknownFunction { .. } => ErrorCode::UNKNOWN_FUNCTION,
            CompileError::InvalidAssignmentTarget { .. } => ErrorCode::INVALID_ASSIGNMENT,
            CompileError::UnboundVariable { .. } => ErrorCode::UNBOUND_VARIABLE,
            CompileError::MissingReturn { .. } => ErrorCode::MISSING_RETURN,
            CompileError::Internal(_) => ErrorCode::INTERNAL,
        }
    }

    /// Source location, when the error has one
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::Lex { span, .. }
            | CompileError::Parse { span, .. }
            | CompileError::NameCollision { span, .. }
            | CompileError::Redefinition { span, .. }
            | CompileError::ArityMismatch { span, .. }
            | CompileError::UnknownFunction { span, .. }
            | CompileError::InvalidAssignmentTarget { span }
            | CompileError::UnboundVariable { span, .. }
            | CompileError::MissingReturn { span, .. } => Some(*span),
            CompileError::NoMainFunction | CompileError::Internal(_) => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = Diagnostic::error(self.to_string()).with_code(self.code());
        let Some(span) = self.span() else {
            return match self {
                CompileError::NoMainFunction => {
                    diagnostic.with_help("add an entry point: `int main() { return 0; }`")
                }
                _ => diagnostic,
            };
        };

        match self {
            CompileError::Lex { .. } => diagnostic.with_label(span, "no token starts here"),
            CompileError::Parse { found, .. } => {
                diagnostic.with_label(span, format!("unexpected {}", found))
            }
            CompileError::NameCollision { .. } => {
                diagnostic.with_label(span, "this name is already a global")
            }
            CompileError::Redefinition { .. } => {
                diagnostic.with_label(span, "function already has a body")
            }
            CompileError::ArityMismatch { expected, .. } => diagnostic.with_label(
                span,
                format!("expected {} argument(s)", expected),
            ),
            CompileError::UnknownFunction { .. } => {
                diagnostic.with_label(span, "not declared in this module")
            }
            CompileError::InvalidAssignmentTarget { .. } => diagnostic
                .with_label(span, "cannot assign to this expression")
                .with_note("only plain variables can appear on the left of `=`"),
            CompileError::UnboundVariable { name, .. } => diagnostic
                .with_label(span, "not bound in this function")
                .with_help(format!("declare it first: `int {} = ...;`", name)),
            CompileError::MissingReturn { .. } => diagnostic
                .with_label(span, "function defined here")
                .with_help("end the body with `return <expr>;`"),
            _ => diagnostic.with_label(span, ""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Position;

    fn span() -> Span {
        Span::new(Position::new(3, 7, 20), Position::new(3, 8, 21), 0)
    }

    #[test]
    fn test_messages() {
        let err = CompileError::ArityMismatch {
            name: "add".into(),
            expected: 2,
            found: 3,
            span: span(),
        };
        assert_eq!(err.to_string(), "`add` takes 2 argument(s) but 3 were given");

        let err = CompileError::Parse {
            found: "`;`".into(),
            expected: "expression".into(),
            span: span(),
        };
        assert_eq!(err.to_string(), "expected expression, found `;`");
    }

    #[test]
    fn test_codes_and_spans() {
        assert_eq!(CompileError::NoMainFunction.code().to_string(), "ES001");
        assert_eq!(CompileError::NoMainFunction.span(), None);

        let err = CompileError::Lex { ch: '@', span: span() };
        assert_eq!(err.code().to_string(), "EL001");
        assert_eq!(err.span(), Some(span()));
    }

    #[test]
    fn test_to_diagnostic_carries_label() {
        let err = CompileError::UnboundVariable {
            name: "y".into(),
            span: span(),
        };
        let diagnostic = err.to_diagnostic();
        assert_eq!(diagnostic.code, Some(ErrorCode::UNBOUND_VARIABLE));
        assert_eq!(diagnostic.labels.len(), 1);
        assert_eq!(diagnostic.labels[0].span, span());
        assert_eq!(diagnostic.help.len(), 1);
    }
}
