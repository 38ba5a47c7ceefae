//! Conservative DAX tokenizer. It only finds name references and never
//! evaluates anything.

use std::collections::HashSet;
use thiserror::Error;

use crate::core::{fold_name, TextSpan};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("offset {offset}: {reason}")]
pub struct DaxError {
    pub offset: usize,
    pub reason: String,
}

impl DaxError {
    fn new(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Identifier(String),
    /// `'Table Name'`, unescaped
    QuotedTable(String),
    /// `[Field]`, unescaped
    Bracket(String),
    StringLiteral(String),
    Number,
    Punct(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Span of the whole token, including quotes or brackets
    pub span: TextSpan,
}

/// A name reference found in an expression. Spans are relative to the
/// expression text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaxReference {
    /// `Table[Field]` or `'Table'[Field]`
    Qualified {
        table: String,
        table_span: TextSpan,
        table_quoted: bool,
        field: String,
        /// Text between the brackets
        field_span: TextSpan,
    },
    /// `[Field]` with no table in front
    Bare { field: String, span: TextSpan },
    /// Standalone table token
    Table {
        name: String,
        span: TextSpan,
        quoted: bool,
    },
    StringLiteral { value: String, span: TextSpan },
    /// Name declared with `VAR`
    Variable { name: String, span: TextSpan },
}

const KEYWORDS: &[&str] = &[
    "VAR", "RETURN", "IN", "NOT", "AND", "OR", "TRUE", "FALSE", "ASC", "DESC", "DEFINE",
    "EVALUATE", "ORDER", "BY", "MEASURE",
];

struct Lexer<'t> {
    text: &'t str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'t> Lexer<'t> {
    fn new(text: &'t str) -> Self {
        Self {
            text,
            chars: text.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(idx, _)| *idx)
            .unwrap_or(self.text.len())
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), DaxError> {
        loop {
            while matches!(self.peek(), Some(ch) if ch.is_whitespace()) {
                self.advance();
            }

            match (self.peek(), self.peek_next()) {
                (Some('/'), Some('/')) | (Some('-'), Some('-')) => {
                    while let Some(ch) = self.advance() {
                        if ch == '\n' || ch == '\r' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.offset();
                    self.advance();
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(DaxError::new(start, "unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Read a token delimited by `close`, where a doubled `close` is an escape
    fn read_delimited(&mut self, close: char, what: &str) -> Result<String, DaxError> {
        let start = self.offset();
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                Some(ch) if ch == close => {
                    if self.peek() == Some(close) {
                        self.advance();
                        value.push(close);
                    } else {
                        return Ok(value);
                    }
                }
                Some(ch) => value.push(ch),
                None => return Err(DaxError::new(start, format!("unterminated {}", what))),
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, DaxError> {
        self.skip_whitespace_and_comments()?;
        let Some(ch) = self.peek() else {
            return Ok(None);
        };
        let start = self.offset();

        let kind = match ch {
            '\'' => TokenKind::QuotedTable(self.read_delimited('\'', "quoted name")?),
            '[' => {
                let start = self.offset();
                self.advance();
                let mut value = String::new();
                loop {
                    match self.advance() {
                        Some(']') if self.peek() == Some(']') => {
                            self.advance();
                            value.push(']');
                        }
                        Some(']') => break,
                        Some(c) => value.push(c),
                        None => return Err(DaxError::new(start, "unterminated bracket")),
                    }
                }
                TokenKind::Bracket(value)
            }
            '"' => TokenKind::StringLiteral(self.read_delimited('"', "string")?),
            c if c.is_ascii_digit() => {
                while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '.') {
                    self.advance();
                }
                TokenKind::Number
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut buf = String::new();
                while let Some(c) = self.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        buf.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                TokenKind::Identifier(buf)
            }
            c => {
                self.advance();
                TokenKind::Punct(c)
            }
        };

        Ok(Some(Token {
            kind,
            span: TextSpan::new(start, self.offset()),
        }))
    }
}

pub fn tokenize(text: &str) -> Result<Vec<Token>, DaxError> {
    let mut lexer = Lexer::new(text);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn inner_span(span: TextSpan) -> TextSpan {
    TextSpan::new(span.start + 1, span.end - 1)
}

/// Extract every name reference from a DAX expression.
///
/// Fails when the expression has an unterminated quote, bracket, string or
/// comment; callers treat the whole expression as opaque in that case.
pub fn references(text: &str) -> Result<Vec<DaxReference>, DaxError> {
    let tokens = tokenize(text)?;

    let mut variables = HashSet::new();
    for pair in tokens.windows(2) {
        if let (TokenKind::Identifier(kw), TokenKind::Identifier(name)) = (&pair[0].kind, &pair[1].kind) {
            if kw.eq_ignore_ascii_case("VAR") {
                variables.insert(fold_name(name));
            }
        }
    }

    let is_punct = |idx: Option<usize>, c: char| {
        idx.and_then(|i| tokens.get(i))
            .is_some_and(|t| t.kind == TokenKind::Punct(c))
    };

    let mut refs = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        let prev = i.checked_sub(1);
        let (name, quoted) = match &token.kind {
            TokenKind::Identifier(name) => (name, false),
            TokenKind::QuotedTable(name) => (name, true),
            TokenKind::Bracket(field) => {
                refs.push(DaxReference::Bare {
                    field: field.clone(),
                    span: inner_span(token.span),
                });
                i += 1;
                continue;
            }
            TokenKind::StringLiteral(value) => {
                refs.push(DaxReference::StringLiteral {
                    value: value.clone(),
                    span: token.span,
                });
                i += 1;
                continue;
            }
            TokenKind::Number | TokenKind::Punct(_) => {
                i += 1;
                continue;
            }
        };

        if let Some(Token {
            kind: TokenKind::Bracket(field),
            span: field_span,
        }) = tokens.get(i + 1)
        {
            if field_span.start == token.span.end {
                refs.push(DaxReference::Qualified {
                    table: name.clone(),
                    table_span: token.span,
                    table_quoted: quoted,
                    field: field.clone(),
                    field_span: inner_span(*field_span),
                });
                i += 2;
                continue;
            }
        }

        let after_var = prev
            .and_then(|p| tokens.get(p))
            .is_some_and(|t| matches!(&t.kind, TokenKind::Identifier(kw) if kw.eq_ignore_ascii_case("VAR")));
        if !quoted && after_var {
            refs.push(DaxReference::Variable {
                name: name.clone(),
                span: token.span,
            });
        } else if is_punct(Some(i + 1), '(') || is_punct(Some(i + 1), '.') || is_punct(prev, '.') {
            // function call or dotted function name
        } else if !quoted && (is_keyword(name) || variables.contains(&fold_name(name))) {
            // keyword or variable use
        } else {
            refs.push(DaxReference::Table {
                name: name.clone(),
                span: token.span,
                quoted,
            });
        }
        i += 1;
    }
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn slices<'t>(text: &'t str, refs: &[DaxReference]) -> Vec<&'t str> {
        refs.iter()
            .map(|r| match r {
                DaxReference::Qualified { table_span, .. } => table_span.slice(text),
                DaxReference::Bare { span, .. }
                | DaxReference::Table { span, .. }
                | DaxReference::StringLiteral { span, .. }
                | DaxReference::Variable { span, .. } => span.slice(text),
            })
            .collect()
    }

    #[test]
    fn test_qualified_and_bare_references() {
        let text = "SUMX('tbl_Sales', 'tbl_Sales'[Amount] * [Rate]) + COUNTROWS(Customers)";
        let refs = references(text).unwrap();
        assert_eq!(slices(text, &refs), vec!["'tbl_Sales'", "'tbl_Sales'", "Rate", "Customers"]);
        let DaxReference::Qualified { field, field_span, table_quoted, .. } = &refs[1] else {
            panic!("expected qualified reference");
        };
        assert_eq!(field, "Amount");
        assert_eq!(field_span.slice(text), "Amount");
        assert!(*table_quoted);
    }

    #[test]
    fn test_escapes_are_unescaped() {
        let text = "'O''Brien'[Net]]Amount]";
        let refs = references(text).unwrap();
        assert_eq!(
            refs,
            vec![DaxReference::Qualified {
                table: "O'Brien".to_string(),
                table_span: TextSpan::new(0, 10),
                table_quoted: true,
                field: "Net]Amount".to_string(),
                field_span: TextSpan::new(11, 22),
            }]
        );
    }

    #[test]
    fn test_whitespace_breaks_qualification() {
        let refs = references("Sales [Amount]").unwrap();
        assert!(matches!(&refs[0], DaxReference::Table { name, .. } if name == "Sales"));
        assert!(matches!(&refs[1], DaxReference::Bare { field, .. } if field == "Amount"));
    }

    #[test]
    fn test_comments_and_strings() {
        let text = "// Sales[Amount]\n\"Sales\" & /* [X] */ -- Customers\n[Y]";
        let refs = references(text).unwrap();
        assert_eq!(slices(text, &refs), vec!["\"Sales\"", "Y"]);
    }

    #[test]
    fn test_variables_are_excluded() {
        let text = "VAR Sales = 1\nVAR total = SUM(Orders[Qty])\nRETURN Sales + total";
        let refs = references(text).unwrap();
        assert!(matches!(&refs[0], DaxReference::Variable { name, .. } if name == "Sales"));
        assert!(!refs
            .iter()
            .any(|r| matches!(r, DaxReference::Table { name, .. } if name.eq_ignore_ascii_case("sales"))));
        assert!(refs
            .iter()
            .any(|r| matches!(r, DaxReference::Qualified { table, .. } if table == "Orders")));
    }

    #[test]
    fn test_functions_and_keywords_are_not_tables() {
        let refs = references("IF(TRUE, PERCENTILE.INC(Sales[Amount], 0.5), BLANK())").unwrap();
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn test_unterminated_tokens_fail() {
        for bad in ["'Sales", "Sales[Amount", "\"text", "1 /* open"] {
            assert!(references(bad).is_err(), "accepted {:?}", bad);
        }
    }
}
