//! Name tokens in TMDL: bare words or single-quoted names with `''` escapes.

use crate::core::TextSpan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameToken {
    /// Unquoted, unescaped name
    pub value: String,
    /// Span of the raw token (including quotes), relative to the scanned text
    pub span: TextSpan,
    pub quoted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTokenError {
    Missing,
    UnterminatedQuote,
}

fn is_bare_name_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '=' | ':' | '\'' | '.')
}

/// Read one name token starting at byte `start` of `text`.
///
/// Bare names stop at whitespace, `=`, `:`, `'` or `.`.
pub fn read_name(text: &str, start: usize) -> Result<NameToken, NameTokenError> {
    let rest = &text[start..];
    if let Some(quoted) = rest.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    chars.next();
                    value.push('\'');
                    continue;
                }
                let end = start + 1 + idx + 1;
                return Ok(NameToken {
                    value,
                    span: TextSpan::new(start, end),
                    quoted: true,
                });
            }
            if c == '\n' || c == '\r' {
                break;
            }
            value.push(c);
        }
        return Err(NameTokenError::UnterminatedQuote);
    }

    let len = rest
        .char_indices()
        .find(|(_, c)| !is_bare_name_char(*c))
        .map(|(idx, _)| idx)
        .unwrap_or(rest.len());
    if len == 0 {
        return Err(NameTokenError::Missing);
    }
    Ok(NameToken {
        value: rest[..len].to_string(),
        span: TextSpan::new(start, start + len),
        quoted: false,
    })
}

/// Split a dotted reference such as `'Fact Sales'.Amount` into its parts.
///
/// Returns `None` when the text is not exactly a sequence of name tokens
/// separated by single dots (surrounding whitespace is allowed).
pub fn parse_qualified(text: &str) -> Option<Vec<NameToken>> {
    let mut parts = Vec::new();
    let trimmed_start = text.len() - text.trim_start().len();
    let trimmed_end = text.trim_end().len();
    let mut pos = trimmed_start;
    if pos >= trimmed_end {
        return None;
    }

    loop {
        let token = read_name(text, pos).ok()?;
        pos = token.span.end;
        parts.push(token);
        if pos >= trimmed_end {
            break;
        }
        if text[pos..].starts_with('.') {
            pos += 1;
            continue;
        }
        return None;
    }
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bare_and_quoted_names() {
        let token = read_name("table Sales", 6).unwrap();
        assert_eq!(token.value, "Sales");
        assert_eq!(token.span, TextSpan::new(6, 11));
        assert!(!token.quoted);

        let token = read_name("table 'O''Brien Data' ", 6).unwrap();
        assert_eq!(token.value, "O'Brien Data");
        assert_eq!(token.span, TextSpan::new(6, 21));
        assert!(token.quoted);
    }

    #[test]
    fn test_read_name_errors() {
        assert_eq!(read_name("table 'Sales", 6), Err(NameTokenError::UnterminatedQuote));
        assert_eq!(read_name("table =", 6), Err(NameTokenError::Missing));
    }

    #[test]
    fn test_parse_qualified() {
        let parts = parse_qualified(" 'Fact Sales'.Amount").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].value, "Fact Sales");
        assert_eq!(parts[0].span, TextSpan::new(1, 13));
        assert_eq!(parts[1].value, "Amount");
        assert_eq!(parts[1].span, TextSpan::new(14, 20));

        let parts = parse_qualified("Month").unwrap();
        assert_eq!(parts.len(), 1);

        assert!(parse_qualified("Sales Amount").is_none());
        assert!(parse_qualified("Sales.").is_none());
        assert!(parse_qualified("").is_none());
    }
}
