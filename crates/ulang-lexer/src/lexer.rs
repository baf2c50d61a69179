//! Lexer for the ulang language
//!
//! The lexer is a fixed, ordered table of rules. At each position the rules
//! are tried in declaration order and the first one that matches produces
//! the token; this is NOT longest-match. Keywords are listed before the
//! identifier rule, so `printx` lexes as `print` `x`.

use crate::token::{Token, TokenKind};
use ulang_error::{
    span::{Position, Span},
    CompileError, Result,
};

/// How a rule recognises its token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    /// Exact text
    Literal(&'static str),
    /// `[0-9]+`
    Number,
    /// `[a-zA-Z][a-zA-Z0-9]*`
    Ident,
}

impl Pattern {
    /// Length in bytes of the match at the start of `rest`, if any
    fn match_len(&self, rest: &str) -> Option<usize> {
        match self {
            Pattern::Literal(text) => rest.starts_with(text).then_some(text.len()),
            Pattern::Number => {
                let len = rest.bytes().take_while(u8::is_ascii_digit).count();
                (len > 0).then_some(len)
            }
            Pattern::Ident => {
                let first = rest.bytes().next()?;
                if !first.is_ascii_alphabetic() {
                    return None;
                }
                Some(1 + rest.bytes().skip(1).take_while(u8::is_ascii_alphanumeric).count())
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    kind: TokenKind,
    pattern: Pattern,
}

const fn literal(kind: TokenKind, text: &'static str) -> Rule {
    Rule {
        kind,
        pattern: Pattern::Literal(text),
    }
}

/// Rule table in priority order.
///
/// Two-character operators come before their one-character prefixes.
const RULES: &[Rule] = &[
    literal(TokenKind::Print, "print"),
    literal(TokenKind::LParen, "("),
    literal(TokenKind::RParen, ")"),
    literal(TokenKind::Semicolon, ";"),
    literal(TokenKind::Plus, "+"),
    literal(TokenKind::Minus, "-"),
    Rule {
        kind: TokenKind::Number,
        pattern: Pattern::Number,
    },
    literal(TokenKind::Star, "*"),
    literal(TokenKind::Slash, "/"),
    literal(TokenKind::Ne, "!="),
    literal(TokenKind::Bang, "!"),
    literal(TokenKind::Tilde, "~"),
    literal(TokenKind::Int, "int"),
    literal(TokenKind::LBrace, "{"),
    literal(TokenKind::RBrace, "}"),
    literal(TokenKind::Return, "return"),
    literal(TokenKind::If, "if"),
    literal(TokenKind::Else, "else"),
    literal(TokenKind::EqEq, "=="),
    literal(TokenKind::For, "for"),
    literal(TokenKind::Le, "<="),
    literal(TokenKind::Ge, ">="),
    literal(TokenKind::Lt, "<"),
    literal(TokenKind::Gt, ">"),
    literal(TokenKind::Eq, "="),
    literal(TokenKind::Comma, ","),
    Rule {
        kind: TokenKind::Ident,
        pattern: Pattern::Ident,
    },
];

/// The ulang lexer
///
/// Built once and reused; every call to [`Lexer::lex`] starts a fresh scan.
#[derive(Debug, Clone)]
pub struct Lexer {
    rules: &'static [Rule],
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    pub fn new() -> Self {
        Self { rules: RULES }
    }

    /// Lazily tokenizes `source`.
    ///
    /// The stream ends with a single `Eof` token. After an error the
    /// iterator yields nothing more.
    pub fn lex<'s>(&self, source: &'s str, file_id: u32) -> Tokens<'_, 's> {
        Tokens {
            rules: self.rules,
            source,
            file_id,
            pos: Position::start(),
            finished: false,
        }
    }
}

/// Token stream over one source text
pub struct Tokens<'l, 's> {
    rules: &'l [Rule],
    source: &'s str,
    file_id: u32,
    pos: Position,
    finished: bool,
}

impl<'l, 's> Tokens<'l, 's> {
    fn rest(&self) -> &'s str {
        &self.source[self.pos.offset..]
    }

    /// Moves the cursor over `text`, tracking lines and columns
    fn bump(&mut self, text: &str) {
        for ch in text.chars() {
            self.pos.offset += ch.len_utf8();
            if ch == '\n' {
                self.pos.line += 1;
                self.pos.column = 1;
            } else {
                self.pos.column += 1;
            }
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let len = rest.len() - rest.trim_start().len();
        self.bump(&rest[..len]);
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        let start = self.pos;
        let rest = self.rest();

        let Some(ch) = rest.chars().next() else {
            return Ok(Token::new(
                TokenKind::Eof,
                "",
                Span::point(start, self.file_id),
            ));
        };

        for rule in self.rules {
            if let Some(len) = rule.pattern.match_len(rest) {
                let text = &rest[..len];
                self.bump(text);
                return Ok(Token::new(
                    rule.kind,
                    text,
                    Span::new(start, self.pos, self.file_id),
                ));
            }
        }

        let mut end = start;
        end.offset += ch.len_utf8();
        end.column += 1;
        Err(CompileError::Lex {
            ch,
            span: Span::new(start, end, self.file_id),
        })
    }
}

impl Iterator for Tokens<'_, '_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if !matches!(&token, Ok(t) if !t.is_eof()) {
            self.finished = true;
        }
        Some(token)
    }
}

impl std::iter::FusedIterator for Tokens<'_, '_> {}

/// Tokenizes the whole source, stopping at the first error
pub fn tokenize(source: &str, file_id: u32) -> Result<Vec<Token>> {
    Lexer::new().lex(source, file_id).collect()
}
