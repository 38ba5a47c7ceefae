use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Half-open byte range into a document's source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Shift a span that is relative to `base` into absolute coordinates
    pub fn offset(self, base: usize) -> Self {
        Self {
            start: self.start + base,
            end: self.end + base,
        }
    }

    pub fn overlaps(&self, other: &TextSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn slice<'t>(&self, text: &'t str) -> &'t str {
        &text[self.start..self.end]
    }
}

/// A replacement of one byte range with new text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextEdit {
    pub span: TextSpan,
    pub new_text: String,
}

impl TextEdit {
    pub fn new(span: TextSpan, new_text: impl Into<String>) -> Self {
        Self {
            span,
            new_text: new_text.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("edit {start}..{end} is outside the document (length {len})")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("edit {start}..{end} does not fall on a character boundary")]
    NotCharBoundary { start: usize, end: usize },

    #[error("edits {first_start}..{first_end} and {second_start}..{second_end} overlap")]
    Overlap {
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },
}

/// Apply edits to `text`, copying every unedited byte verbatim.
///
/// Edits are applied in descending offset order so earlier offsets stay valid.
/// Overlapping edits are rejected rather than merged.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> Result<String, EditError> {
    let mut sorted: Vec<&TextEdit> = edits.iter().collect();
    sorted.sort_by(|a, b| b.span.start.cmp(&a.span.start).then(b.span.end.cmp(&a.span.end)));

    for edit in &sorted {
        let TextSpan { start, end } = edit.span;
        if start > end || end > text.len() {
            return Err(EditError::OutOfBounds {
                start,
                end,
                len: text.len(),
            });
        }
        if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            return Err(EditError::NotCharBoundary { start, end });
        }
    }

    for pair in sorted.windows(2) {
        let (later, earlier) = (pair[0], pair[1]);
        if earlier.span.overlaps(&later.span)
            || (earlier.span == later.span && earlier.span.is_empty())
        {
            return Err(EditError::Overlap {
                first_start: earlier.span.start,
                first_end: earlier.span.end,
                second_start: later.span.start,
                second_end: later.span.end,
            });
        }
    }

    let mut output = text.to_string();
    for edit in sorted {
        output.replace_range(edit.span.start..edit.span.end, &edit.new_text);
    }
    Ok(output)
}

/// Maps byte offsets to 1-indexed line/column positions
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (idx, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(idx + 1);
            }
        }
        Self { line_starts }
    }

    /// Line and column (both 1-indexed, column counted in characters)
    pub fn position(&self, text: &str, offset: usize) -> (usize, usize) {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line_start = self.line_starts[line_idx];
        let end = offset.min(text.len());
        let column = text
            .get(line_start..end)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(0)
            + 1;
        (line_idx + 1, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_no_edits_is_identity() {
        let text = "table Sales\n\tcolumn Amount\r\n";
        assert_eq!(apply_edits(text, &[]).unwrap(), text);
    }

    #[test]
    fn test_apply_edits_in_any_order() {
        let text = "Sales[Amount] + Sales[Qty]";
        let edits = vec![
            TextEdit::new(TextSpan::new(0, 5), "'Fact Sales'"),
            TextEdit::new(TextSpan::new(16, 21), "'Fact Sales'"),
        ];
        assert_eq!(
            apply_edits(text, &edits).unwrap(),
            "'Fact Sales'[Amount] + 'Fact Sales'[Qty]"
        );
    }

    #[test]
    fn test_apply_rejects_overlap() {
        let edits = vec![
            TextEdit::new(TextSpan::new(0, 5), "a"),
            TextEdit::new(TextSpan::new(3, 7), "b"),
        ];
        assert!(matches!(
            apply_edits("0123456789", &edits),
            Err(EditError::Overlap { .. })
        ));
    }

    #[test]
    fn test_apply_allows_adjacent_edits() {
        let edits = vec![
            TextEdit::new(TextSpan::new(0, 2), "ab"),
            TextEdit::new(TextSpan::new(2, 4), "cd"),
        ];
        assert_eq!(apply_edits("wxyz", &edits).unwrap(), "abcd");
    }

    #[test]
    fn test_apply_rejects_out_of_bounds_and_split_chars() {
        assert!(matches!(
            apply_edits("abc", &[TextEdit::new(TextSpan::new(1, 9), "x")]),
            Err(EditError::OutOfBounds { .. })
        ));
        assert!(matches!(
            apply_edits("é", &[TextEdit::new(TextSpan::new(1, 2), "x")]),
            Err(EditError::NotCharBoundary { .. })
        ));
    }

    #[test]
    fn test_line_index_positions() {
        let text = "ab\ncdé\nf";
        let index = LineIndex::new(text);
        assert_eq!(index.position(text, 0), (1, 1));
        assert_eq!(index.position(text, 3), (2, 1));
        assert_eq!(index.position(text, 7), (2, 4));
        assert_eq!(index.position(text, 8), (3, 1));
    }
}
