//! Tokens for the ulang language

use std::fmt;
use ulang_error::span::Span;

/// Every kind of token the lexer can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // =========================================
    // Keywords
    // =========================================
    /// `print`
    Print,
    /// `int` - function and variable declarations
    Int,
    /// `return`
    Return,
    /// `if`
    If,
    /// `else`
    Else,
    /// `for`
    For,

    // =========================================
    // Literals and names
    // =========================================
    /// ASCII letter followed by letters or digits
    Ident,
    /// Unsigned decimal integer
    Number,

    // =========================================
    // Operators
    // =========================================
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `!` - logical not
    Bang,
    /// `~` - bitwise complement
    Tilde,
    /// `=` - assignment
    Eq,
    /// `==`
    EqEq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,

    // =========================================
    // Punctuation
    // =========================================
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `;`
    Semicolon,
    /// `,`
    Comma,

    /// End of input
    Eof,
}

impl TokenKind {
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Print
                | TokenKind::Int
                | TokenKind::Return
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::For
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Print => "print",
            TokenKind::Int => "int",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::Ident => "identifier",
            TokenKind::Number => "number",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Bang => "!",
            TokenKind::Tilde => "~",
            TokenKind::Eq => "=",
            TokenKind::EqEq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Eof => "end of file",
        };
        f.write_str(text)
    }
}

/// A token with its literal text and location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Exact source text (empty for `Eof`)
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// Short description used in parse errors: "`;`", "identifier `x`", ...
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Ident => format!("identifier `{}`", self.text),
            TokenKind::Number => format!("number `{}`", self.text),
            TokenKind::Eof => "end of file".to_string(),
            kind if kind.is_keyword() => format!("keyword `{}`", self.text),
            _ => format!("`{}`", self.text),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.describe(), self.span)
    }
}
