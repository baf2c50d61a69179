//! Source locations
//!
//! Every token and AST node carries a [`Span`] so that errors raised
//! late in the pipeline can still point back at the source text.

use std::fmt;

/// A single point in a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Line (1-indexed)
    pub line: u32,
    /// Column (1-indexed, counted in characters)
    pub column: u32,
    /// Byte offset from the beginning of the file
    pub offset: usize,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self { line, column, offset }
    }

    /// The position of the first character of a file
    pub fn start() -> Self {
        Self::new(1, 1, 0)
    }
}

/// A half-open region `[start, end)` of one source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
    /// Index into the [`SourceCache`](crate::SourceCache)
    pub file_id: u32,
}

impl Span {
    pub fn new(start: Position, end: Position, file_id: u32) -> Self {
        Self { start, end, file_id }
    }

    /// Zero-width span at `pos`
    pub fn point(pos: Position, file_id: u32) -> Self {
        Self::new(pos, pos, file_id)
    }

    /// Smallest span covering both `self` and `other`
    pub fn to(self, other: Span) -> Span {
        let start = if other.start.offset < self.start.offset {
            other.start
        } else {
            self.start
        };
        let end = if other.end.offset > self.end.offset {
            other.end
        } else {
            self.end
        };
        Span::new(start, end, self.file_id)
    }

    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slices the covered text out of `source`
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.start.offset..self.end.offset).unwrap_or("")
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

/// Types that know where they came from
pub trait Spanned {
    fn span(&self) -> Span;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: usize, end: usize) -> Span {
        Span::new(
            Position::new(1, start as u32 + 1, start),
            Position::new(1, end as u32 + 1, end),
            0,
        )
    }

    #[test]
    fn test_span_to_covers_both() {
        let merged = span(8, 12).to(span(0, 3));
        assert_eq!(merged.start.offset, 0);
        assert_eq!(merged.end.offset, 12);
        assert_eq!(merged.len(), 12);
    }

    #[test]
    fn test_span_text() {
        let source = "int main() {}";
        assert_eq!(span(4, 8).text(source), "main");
        assert_eq!(span(4, 4).text(source), "");
        assert!(span(4, 4).is_empty());
    }

    #[test]
    fn test_span_display() {
        assert_eq!(span(4, 8).to_string(), "1:5");
    }
}
