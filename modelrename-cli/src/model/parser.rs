use std::collections::HashSet;

use crate::core::{fold_name, EntityKind, LineIndex, ParseError, TextSpan};

use super::document::{Expression, ModelObject, Name, Property, PropertyValue};
use super::names::{read_name, NameTokenError};

/// Declarations that carry a name: `keyword name [= expression]`
const NAMED_KEYWORDS: &[&str] = &[
    "table",
    "column",
    "measure",
    "relationship",
    "partition",
    "hierarchy",
    "level",
    "annotation",
    "extendedProperty",
    "calculationItem",
    "role",
    "member",
    "tablePermission",
    "columnPermission",
    "perspective",
    "perspectiveTable",
    "perspectiveColumn",
    "perspectiveMeasure",
    "perspectiveHierarchy",
    "culture",
    "cultureInfo",
    "expression",
    "model",
    "database",
    "dataSource",
    "variation",
    "changedProperty",
    "queryGroup",
    "function",
];

/// Named declarations whose name may be left out (`database` in database.tmdl)
const OPTIONAL_NAME_KEYWORDS: &[&str] = &["database"];

/// Declarations without a name, which may still own an expression and children
const NAMELESS_KEYWORDS: &[&str] = &[
    "calculationGroup",
    "kpi",
    "formatStringDefinition",
    "detailRowsDefinition",
    "linguisticMetadata",
    "dataAccessOptions",
    "refreshPolicy",
    "alternateOf",
];

fn entity_kind(keyword: &str) -> Option<EntityKind> {
    match keyword {
        "table" => Some(EntityKind::Table),
        "column" => Some(EntityKind::Column),
        "measure" => Some(EntityKind::Measure),
        "relationship" => Some(EntityKind::Relationship),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndentUnit {
    Tab,
    Spaces(usize),
}

#[derive(Debug, Clone, Copy)]
struct Line {
    number: usize,
    start: usize,
    end: usize,
    indent: usize,
    blank: bool,
}

enum LineShape {
    Declaration,
    Property,
}

pub(crate) struct Parser<'t> {
    text: &'t str,
    lines: Vec<Line>,
    pos: usize,
    unit: IndentUnit,
    line_index: LineIndex,
    last_end: usize,
}

impl<'t> Parser<'t> {
    pub(crate) fn new(text: &'t str) -> Self {
        let lines = split_lines(text);
        let unit = infer_indent_unit(text, &lines);
        Self {
            text,
            lines,
            pos: 0,
            unit,
            line_index: LineIndex::new(text),
            last_end: 0,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Vec<ModelObject>, ParseError> {
        let (_, objects) = self.parse_items(0)?;
        Ok(objects)
    }

    fn current(&self) -> Option<Line> {
        self.lines.get(self.pos).copied()
    }

    fn skip_blank(&mut self) {
        while matches!(self.current(), Some(line) if line.blank) {
            self.pos += 1;
        }
    }

    fn error_at(&self, offset: usize, reason: impl Into<String>) -> ParseError {
        let (line, column) = self.line_index.position(self.text, offset);
        ParseError::new(line, column, reason)
    }

    fn content(&self, line: Line) -> &'t str {
        &self.text[line.start + line.indent..line.end]
    }

    /// Depth of a structural line; its indentation must be whole units
    fn strict_depth(&self, line: Line) -> Result<usize, ParseError> {
        let indent = &self.text[line.start..line.start + line.indent];
        match self.unit {
            IndentUnit::Tab => {
                if indent.chars().all(|c| c == '\t') {
                    Ok(indent.len())
                } else {
                    Err(self.error_at(line.start, "inconsistent indentation"))
                }
            }
            IndentUnit::Spaces(width) => {
                if indent.chars().all(|c| c == ' ') && indent.len() % width == 0 {
                    Ok(indent.len() / width)
                } else {
                    Err(self.error_at(line.start, "inconsistent indentation"))
                }
            }
        }
    }

    /// Whole indentation units at the start of a line, ignoring whatever follows
    fn body_depth(&self, line: Line) -> usize {
        let bytes = self.text[line.start..line.end].as_bytes();
        match self.unit {
            IndentUnit::Tab => bytes.iter().take_while(|b| **b == b'\t').count(),
            IndentUnit::Spaces(width) => bytes.iter().take_while(|b| **b == b' ').count() / width,
        }
    }

    fn parse_items(&mut self, depth: usize) -> Result<(Vec<Property>, Vec<ModelObject>), ParseError> {
        let mut properties = Vec::new();
        let mut children: Vec<ModelObject> = Vec::new();
        let mut description: Option<TextSpan> = None;

        loop {
            self.skip_blank();
            let Some(line) = self.current() else { break };
            let line_depth = self.strict_depth(line)?;
            if line_depth < depth {
                break;
            }
            if line_depth > depth {
                return Err(self.error_at(line.start + line.indent, "unexpected indentation"));
            }

            let content = self.content(line);
            if content.starts_with("///") {
                let start = description.map(|d| d.start).unwrap_or(line.start + line.indent);
                description = Some(TextSpan::new(start, line.end));
                self.last_end = line.end;
                self.pos += 1;
                continue;
            }

            match classify_line(content) {
                Some(LineShape::Declaration) => {
                    let object = self.parse_object(line, depth, description.take())?;
                    children.push(object);
                }
                Some(LineShape::Property) if depth > 0 => {
                    description = None;
                    properties.push(self.parse_property(line, depth)?);
                }
                _ => {
                    return Err(self.error_at(
                        line.start + line.indent,
                        format!("expected a declaration, found '{}'", first_word_or_text(content)),
                    ));
                }
            }
        }

        self.check_duplicates(&children)?;
        Ok((properties, children))
    }

    fn parse_object(
        &mut self,
        line: Line,
        depth: usize,
        description: Option<TextSpan>,
    ) -> Result<ModelObject, ParseError> {
        let content_start = line.start + line.indent;
        let keyword = leading_word(self.content(line)).to_string();
        let mut cursor = content_start + keyword.len();

        let mut ref_target = None;
        if keyword == "ref" {
            cursor = self.skip_spaces(cursor, line.end);
            let target = leading_word(&self.text[cursor..line.end]);
            if target.is_empty() {
                return Err(self.error_at(cursor, "expected object type after 'ref'"));
            }
            ref_target = Some(target.to_string());
            cursor += target.len();
        }

        let mut name = None;
        let name_omitted = OPTIONAL_NAME_KEYWORDS.contains(&keyword.as_str())
            && self.skip_spaces(cursor, line.end) == line.end;
        if !name_omitted && (keyword == "ref" || NAMED_KEYWORDS.contains(&keyword.as_str())) {
            let name_start = self.skip_spaces(cursor, line.end);
            if name_start == cursor {
                return Err(self.error_at(cursor, format!("expected a name after '{}'", keyword)));
            }
            let token = read_name(&self.text[..line.end], name_start).map_err(|e| match e {
                NameTokenError::Missing => self.error_at(name_start, format!("expected a name after '{}'", keyword)),
                NameTokenError::UnterminatedQuote => self.error_at(name_start, "unterminated quoted name"),
            })?;
            cursor = token.span.end;
            name = Some(Name {
                value: token.value,
                span: token.span,
                quoted: token.quoted,
            });
        }

        let rest_start = self.skip_spaces(cursor, line.end);
        let mut expression = None;
        if rest_start < line.end {
            if self.text[rest_start..].starts_with('=') {
                expression = Some(self.parse_expression(line, rest_start + 1, depth)?);
            } else {
                return Err(self.error_at(rest_start, "unexpected text after name"));
            }
        } else {
            self.last_end = line.end;
            self.pos += 1;
        }

        let (properties, children) = self.parse_items(depth + 1)?;
        let kind = if keyword == "ref" { None } else { entity_kind(&keyword) };

        Ok(ModelObject {
            keyword,
            ref_target,
            name,
            kind,
            expression,
            description,
            properties,
            children,
            line: line.number,
            span: TextSpan::new(content_start, self.last_end.max(line.end)),
        })
    }

    fn parse_property(&mut self, line: Line, depth: usize) -> Result<Property, ParseError> {
        let content_start = line.start + line.indent;
        let key = leading_word(self.content(line)).to_string();
        let after_key = self.skip_spaces(content_start + key.len(), line.end);
        let rest = &self.text[after_key..line.end];

        let value = if rest.is_empty() {
            self.last_end = line.end;
            self.pos += 1;
            PropertyValue::Flag
        } else if let Some(value) = rest.strip_prefix(':') {
            let value_start = self.skip_spaces(after_key + 1, line.end);
            let value_end = after_key + 1 + value.trim_end().len();
            let value = if self.text[value_start..].starts_with('"') {
                self.parse_quoted(value_start, value_end)?
            } else {
                let span = TextSpan::new(value_start, value_end.max(value_start));
                PropertyValue::Scalar {
                    text: span.slice(self.text).to_string(),
                    span,
                }
            };
            self.last_end = line.end;
            self.pos += 1;
            value
        } else if rest.starts_with('=') {
            PropertyValue::Expression(self.parse_expression(line, after_key + 1, depth)?)
        } else {
            return Err(self.error_at(after_key, format!("unexpected text after property '{}'", key)));
        };

        Ok(Property {
            key,
            value,
            line: line.number,
            span: TextSpan::new(content_start, self.last_end.max(line.end)),
        })
    }

    fn parse_quoted(&self, start: usize, end: usize) -> Result<PropertyValue, ParseError> {
        let raw = &self.text[start + 1..end];
        let mut value = String::new();
        let mut chars = raw.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            if c == '"' {
                if matches!(chars.peek(), Some((_, '"'))) {
                    chars.next();
                    value.push('"');
                    continue;
                }
                if start + 1 + idx + 1 != end {
                    return Err(self.error_at(start + 1 + idx + 1, "unexpected text after quoted value"));
                }
                return Ok(PropertyValue::Quoted {
                    value,
                    span: TextSpan::new(start, end),
                });
            }
            value.push(c);
        }
        Err(self.error_at(start, "unterminated quoted string"))
    }

    /// Parse the expression after `=` at byte `after_eq` of `line`, consuming
    /// any body lines.
    fn parse_expression(&mut self, line: Line, after_eq: usize, owner_depth: usize) -> Result<Expression, ParseError> {
        let inline_start = self.skip_spaces(after_eq, line.end);
        let inline = self.text[inline_start..line.end].trim_end();

        if inline == "```" {
            self.pos += 1;
            let body_start = self.current().map(|l| l.start).unwrap_or(self.text.len());
            let mut body_end = body_start;
            while let Some(body_line) = self.current() {
                if self.text[body_line.start..body_line.end].trim() == "```" {
                    self.last_end = body_line.end;
                    self.pos += 1;
                    return Ok(Expression {
                        span: TextSpan::new(body_start, body_end.max(body_start)),
                        line: line.number + 1,
                        fenced: true,
                    });
                }
                body_end = body_line.end;
                self.pos += 1;
            }
            return Err(self.error_at(inline_start, "unterminated fenced expression"));
        }

        if !inline.is_empty() {
            self.last_end = line.end;
            self.pos += 1;
            return Ok(Expression {
                span: TextSpan::new(inline_start, inline_start + inline.len()),
                line: line.number,
                fenced: false,
            });
        }

        self.pos += 1;
        let mut body: Option<(Line, Line)> = None;
        let mut lookahead = self.pos;
        while let Some(body_line) = self.lines.get(lookahead).copied() {
            if !body_line.blank {
                if self.body_depth(body_line) < owner_depth + 2 {
                    break;
                }
                body = Some(match body {
                    Some((first, _)) => (first, body_line),
                    None => (body_line, body_line),
                });
                self.pos = lookahead + 1;
            }
            lookahead += 1;
        }

        let Some((first, last)) = body else {
            return Err(self.error_at(after_eq.saturating_sub(1), "missing expression body"));
        };
        self.last_end = last.end;
        Ok(Expression {
            span: TextSpan::new(first.start, last.end),
            line: first.number,
            fenced: false,
        })
    }

    fn skip_spaces(&self, mut pos: usize, end: usize) -> usize {
        let bytes = self.text.as_bytes();
        while pos < end && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
            pos += 1;
        }
        pos
    }

    fn check_duplicates(&self, objects: &[ModelObject]) -> Result<(), ParseError> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for object in objects {
            let Some(name) = &object.name else { continue };
            let namespace = match (object.keyword.as_str(), &object.ref_target) {
                ("column" | "measure", _) => "field".to_string(),
                ("ref", Some(target)) => format!("ref {}", target),
                (keyword, _) => keyword.to_string(),
            };
            if !seen.insert((namespace, fold_name(&name.value))) {
                return Err(self.error_at(
                    name.span.start,
                    format!("duplicate name '{}' for {}", name.value, object.keyword),
                ));
            }
        }
        Ok(())
    }
}

fn leading_word(content: &str) -> &str {
    let len = content
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(idx, _)| idx)
        .unwrap_or(content.len());
    &content[..len]
}

fn first_word_or_text(content: &str) -> &str {
    let word = leading_word(content);
    if word.is_empty() {
        content.split_whitespace().next().unwrap_or(content)
    } else {
        word
    }
}

fn classify_line(content: &str) -> Option<LineShape> {
    let word = leading_word(content);
    if word.is_empty() || !word.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let after = content[word.len()..].trim_start();
    // `formatStringDefinition = ...` owns an expression and may have children
    if after.starts_with('=') && NAMELESS_KEYWORDS.contains(&word) {
        return Some(LineShape::Declaration);
    }
    // `column: Month` inside a level, `expression = ...` inside an object
    if after.starts_with(':') || after.starts_with('=') {
        return Some(LineShape::Property);
    }
    if word == "ref" || NAMED_KEYWORDS.contains(&word) || NAMELESS_KEYWORDS.contains(&word) {
        return Some(LineShape::Declaration);
    }
    Some(LineShape::Property)
}

fn split_lines(text: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut start = if text.starts_with('\u{feff}') { 3 } else { 0 };
    let mut number = 1;
    while start <= text.len() {
        let newline = text[start..].find('\n').map(|i| start + i);
        let raw_end = newline.unwrap_or(text.len());
        let end = if raw_end > start && text.as_bytes()[raw_end - 1] == b'\r' {
            raw_end - 1
        } else {
            raw_end
        };
        let line_text = &text[start..end];
        let indent = line_text.len() - line_text.trim_start_matches([' ', '\t']).len();
        lines.push(Line {
            number,
            start,
            end,
            indent,
            blank: line_text.trim().is_empty(),
        });
        match newline {
            Some(nl) => start = nl + 1,
            None => break,
        }
        number += 1;
    }
    lines
}

fn infer_indent_unit(text: &str, lines: &[Line]) -> IndentUnit {
    let mut min_spaces: Option<usize> = None;
    for line in lines.iter().filter(|l| !l.blank && l.indent > 0) {
        let indent = &text[line.start..line.start + line.indent];
        if indent.starts_with('\t') {
            return IndentUnit::Tab;
        }
        let spaces = indent.bytes().take_while(|b| *b == b' ').count();
        min_spaces = Some(min_spaces.map_or(spaces, |m| m.min(spaces)));
    }
    match min_spaces {
        Some(width) if width > 0 => IndentUnit::Spaces(width),
        _ => IndentUnit::Tab,
    }
}
