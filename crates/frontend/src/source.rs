//! Source text bookkeeping
//!
//! Owns the input text and maps byte offsets to line/column positions.
//! Every AST node carries a [`Span`] of byte offsets; the analysis and
//! emission passes recover verbatim source text through [`SourceFile`].

/// A position in the source, 1-indexed for user display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open byte range into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// The input translation unit's text plus a line offset table.
#[derive(Debug, Clone)]
pub struct SourceFile {
    text: String,
    /// Byte offset of the first character of each line.
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        SourceFile { text, line_starts }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Verbatim text for a span. Out-of-range spans clamp to the text.
    pub fn slice(&self, span: Span) -> &str {
        let start = span.start.min(self.text.len());
        let end = span.end.min(self.text.len()).max(start);
        &self.text[start..end]
    }

    /// Line/column (1-indexed) of a byte offset.
    pub fn pos_at(&self, offset: usize) -> SourcePos {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line_idx];
        let column = self.text[line_start..offset.min(self.text.len())]
            .chars()
            .count() as u32
            + 1;
        SourcePos {
            line: line_idx as u32 + 1,
            column,
        }
    }

    /// Start and end positions of a span.
    pub fn span_pos(&self, span: Span) -> (SourcePos, SourcePos) {
        (self.pos_at(span.start), self.pos_at(span.end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pos_at_first_line() {
        let sf = SourceFile::new("int x;\nint y;\n");
        assert_eq!(sf.pos_at(0), SourcePos { line: 1, column: 1 });
        assert_eq!(sf.pos_at(4), SourcePos { line: 1, column: 5 });
    }

    #[test]
    fn test_pos_at_later_lines() {
        let sf = SourceFile::new("int x;\nint y;\n");
        assert_eq!(sf.pos_at(7), SourcePos { line: 2, column: 1 });
        assert_eq!(sf.pos_at(11), SourcePos { line: 2, column: 5 });
    }

    #[test]
    fn test_slice_clamps() {
        let sf = SourceFile::new("abc");
        assert_eq!(sf.slice(Span::new(1, 3)), "bc");
        assert_eq!(sf.slice(Span::new(1, 100)), "bc");
        assert_eq!(sf.slice(Span::new(100, 200)), "");
    }

    #[test]
    fn test_span_join() {
        let a = Span::new(4, 8);
        let b = Span::new(6, 12);
        assert_eq!(a.to(b), Span::new(4, 12));
        assert_eq!(b.to(a), Span::new(4, 12));
    }
}
