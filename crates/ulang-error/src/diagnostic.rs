//! Diagnostics - human readable error reports
//!
//! A [`Diagnostic`] is the rendered face of a [`CompileError`](crate::CompileError):
//! an error code, a message, labels pointing into the source and optional
//! notes. [`DiagnosticRenderer`] turns it into rustc-style text:
//!
//! ```text
//! error[ES007]: use of unbound variable `y`
//!  --> example.unnamedlang:1:21
//!   |
//! 1 | int main() { return y; }
//!   |                     ^ not bound in this function
//! ```

use crate::span::Span;
use std::fmt;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Aborts compilation
    Error,
    /// Reported but does not stop the pipeline
    Warning,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Level::Error => "\x1b[1;31m",
            Level::Warning => "\x1b[1;33m",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message attached to a region of source
#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    /// Primary labels are underlined with `^`, secondary ones with `-`
    pub primary: bool,
}

impl Label {
    pub fn primary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            primary: true,
        }
    }

    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            primary: false,
        }
    }
}

/// Structured error code, displayed as `E{category}{number:03}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// L = lexer, P = parser, S = semantic (raised while emitting IR), I = internal
    pub category: char,
    pub number: u16,
}

impl ErrorCode {
    pub const fn new(category: char, number: u16) -> Self {
        Self { category, number }
    }

    // Lexer
    pub const UNEXPECTED_CHAR: Self = Self::new('L', 1);

    // Parser
    pub const UNEXPECTED_TOKEN: Self = Self::new('P', 1);

    // Emit
    pub const NO_MAIN_FUNCTION: Self = Self::new('S', 1);
    pub const NAME_COLLISION: Self = Self::new('S', 2);
    pub const REDEFINITION: Self = Self::new('S', 3);
    pub const ARITY_MISMATCH: Self = Self::new('S', 4);
    pub const UNKNOWN_FUNCTION: Self = Self::new('S', 5);
    pub const INVALID_ASSIGNMENT: Self = Self::new('S', 6);
    pub const UNBOUND_VARIABLE: Self = Self::new('S', 7);
    pub const MISSING_RETURN: Self = Self::new('S', 8);

    // Builder / verifier
    pub const INTERNAL: Self = Self::new('I', 1);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}{:03}", self.category, self.number)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

impl Diagnostic {
    fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Level::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Level::Warning, message)
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds a primary label
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::primary(span, message));
        self
    }

    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::secondary(span, message));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }
}

/// Source text of every file seen by the driver, indexed by `file_id`
#[derive(Debug, Default)]
pub struct SourceCache {
    files: Vec<SourceFile>,
}

#[derive(Debug)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    /// Byte offset of the first character of each line
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Self {
            name: name.into(),
            source,
            line_starts,
        }
    }

    /// Text of 1-indexed `line`, without its terminator
    pub fn line(&self, line: u32) -> Option<&str> {
        let idx = line.checked_sub(1)? as usize;
        let start = *self.line_starts.get(idx)?;
        let end = self
            .line_starts
            .get(idx + 1)
            .map(|&next| next - 1)
            .unwrap_or(self.source.len());

        Some(self.source[start..end].trim_end_matches('\r'))
    }
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file and returns its id
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> u32 {
        let id = self.files.len() as u32;
        self.files.push(SourceFile::new(name, source));
        id
    }

    pub fn get(&self, id: u32) -> Option<&SourceFile> {
        self.files.get(id as usize)
    }
}

/// Renders diagnostics against a [`SourceCache`]
pub struct DiagnosticRenderer<'a> {
    cache: &'a SourceCache,
    use_colors: bool,
}

struct Palette {
    level: &'static str,
    accent: &'static str,
    help: &'static str,
    bold: &'static str,
    reset: &'static str,
}

impl<'a> DiagnosticRenderer<'a> {
    pub fn new(cache: &'a SourceCache) -> Self {
        Self {
            cache,
            use_colors: true,
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.use_colors = false;
        self
    }

    fn palette(&self, level: Level) -> Palette {
        if self.use_colors {
            Palette {
                level: level.color_code(),
                accent: "\x1b[1;34m",
                help: "\x1b[1;32m",
                bold: "\x1b[1m",
                reset: "\x1b[0m",
            }
        } else {
            Palette {
                level: "",
                accent: "",
                help: "",
                bold: "",
                reset: "",
            }
        }
    }

    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let p = self.palette(diagnostic.level);
        let mut out = String::new();

        out.push_str(p.level);
        out.push_str(diagnostic.level.as_str());
        if let Some(code) = diagnostic.code {
            out.push_str(&format!("[{}]", code));
        }
        out.push_str(&format!(
            "{}{}: {}{}\n",
            p.reset, p.bold, diagnostic.message, p.reset
        ));

        for label in &diagnostic.labels {
            self.render_label(&mut out, label, &p);
        }

        for note in &diagnostic.notes {
            out.push_str(&format!("  = {}note{}: {}\n", p.bold, p.reset, note));
        }
        for help in &diagnostic.help {
            out.push_str(&format!("  = {}help{}: {}\n", p.help, p.reset, help));
        }

        out
    }

    fn render_label(&self, out: &mut String, label: &Label, p: &Palette) {
        let Some(file) = self.cache.get(label.span.file_id) else {
            return;
        };
        let start = label.span.start;

        out.push_str(&format!(
            " {}-->{} {}:{}:{}\n",
            p.accent, p.reset, file.name, start.line, start.column
        ));

        let Some(text) = file.line(start.line) else {
            return;
        };
        let gutter = " ".repeat(start.line.to_string().len());
        let width = if label.span.end.line == start.line {
            label.span.end.column.saturating_sub(start.column).max(1) as usize
        } else {
            text.chars().count().saturating_sub(start.column as usize - 1).max(1)
        };
        let (mark, color) = if label.primary {
            ('^', p.level)
        } else {
            ('-', p.accent)
        };

        out.push_str(&format!(" {} {}|{}\n", gutter, p.accent, p.reset));
        out.push_str(&format!(
            " {}{} |{} {}\n",
            p.accent, start.line, p.reset, text
        ));
        out.push_str(&format!(
            " {} {}|{} {}{}{} {}{}\n",
            gutter,
            p.accent,
            p.reset,
            " ".repeat(start.column.saturating_sub(1) as usize),
            color,
            mark.to_string().repeat(width),
            label.message,
            p.reset
        ));
    }
}
