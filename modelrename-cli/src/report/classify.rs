//! Recognizes the places in report JSON that bind to model entities.

use regex::Regex;
use std::collections::HashMap;

use crate::core::{fold_name, LeafSyntax, TextSpan, TokenSyntax};

use super::document::{EmbeddedDocument, JsonString, Node, NodeValue, ReportDialect, ReportDocument};
use super::parser::decode_json_string;

/// One entity name token inside a report file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePart {
    pub name: String,
    /// File span of the raw token
    pub span: TextSpan,
    pub syntax: TokenSyntax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Column,
    Measure,
    /// Unknown until resolved against the model
    Any,
}

/// A `Table.Field` split the index has to resolve against the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedCandidate {
    pub table: NamePart,
    pub field: NamePart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Table(NamePart),
    Field {
        table: String,
        field: NamePart,
        kind: FieldKind,
    },
    /// `Table.Field` text with one candidate per dot
    Dotted {
        text: String,
        span: TextSpan,
        candidates: Vec<DottedCandidate>,
    },
    /// Field whose `SourceRef.Source` alias has no `From` entry in scope
    UnresolvedAlias { alias: String, field: NamePart },
}

pub struct BindingClassifier {
    bracket_ref: Regex,
    wrapped_ref: Regex,
}

impl Default for BindingClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl BindingClassifier {
    pub fn new() -> Self {
        Self {
            bracket_ref: Regex::new(
                r"^(?:'((?:[^']|'')+)'|([\p{L}_][\p{L}\p{N}_]*))\[((?:[^\]]|\]\])+)\]$",
            )
            .expect("Failed to compile regex"),
            wrapped_ref: Regex::new(r"^[A-Za-z][A-Za-z0-9.]*\((.+)\)$")
                .expect("Failed to compile regex"),
        }
    }

    /// Every binding in the file, in document order
    pub fn classify(&self, doc: &ReportDocument) -> Vec<Binding> {
        let mut walker = Walker {
            classifier: self,
            dialect: doc.dialect(),
            text: doc.text(),
            embedded: None,
            depth: 1,
            scopes: Vec::new(),
            out: Vec::new(),
        };
        walker.walk(doc.root(), None);
        for embedded in doc.embedded() {
            walker.text = &embedded.text;
            walker.embedded = Some(embedded);
            walker.depth = 2;
            walker.scopes.clear();
            walker.walk(&embedded.root, None);
        }
        walker.out
    }
}

struct Walker<'a> {
    classifier: &'a BindingClassifier,
    dialect: ReportDialect,
    text: &'a str,
    embedded: Option<&'a EmbeddedDocument>,
    depth: u8,
    /// Innermost last: folded alias -> entity
    scopes: Vec<HashMap<String, String>>,
    out: Vec<Binding>,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, node: &Node, key: Option<&str>) {
        match &node.value {
            NodeValue::Object(members) => {
                let scoped = self.push_aliases(node);
                if key == Some("SourceRef") {
                    if let Some(entity) = node.get_str("Entity") {
                        let part = self.whole(entity, LeafSyntax::Plain);
                        self.out.push(Binding::Table(part));
                    }
                }
                for member in members {
                    match member.key.value.as_str() {
                        "Column" => self.structured_field(&member.value, FieldKind::Column),
                        "Measure" => self.structured_field(&member.value, FieldKind::Measure),
                        _ => {}
                    }
                }
                self.lowercase_field(node);
                for member in members {
                    self.walk(&member.value, Some(&member.key.value));
                }
                if scoped {
                    self.scopes.pop();
                }
            }
            NodeValue::Array(items) => {
                for item in items {
                    self.walk(item, key);
                }
            }
            NodeValue::String(s) => self.string_shapes(s, key),
            _ => {}
        }
    }

    /// `"From": [{"Name": "s", "Entity": "Sales"}]` opens an alias scope
    fn push_aliases(&mut self, node: &Node) -> bool {
        let Some(NodeValue::Array(entries)) = node.get("From").map(|n| &n.value) else {
            return false;
        };
        let mut scope = HashMap::new();
        for entry in entries {
            let Some(entity) = entry.get_str("Entity") else {
                continue;
            };
            if let Some(alias) = entry.get_str("Name") {
                scope.insert(fold_name(&alias.value), entity.value.clone());
            }
            let part = self.whole(entity, LeafSyntax::Plain);
            self.out.push(Binding::Table(part));
        }
        self.scopes.push(scope);
        true
    }

    fn resolve_alias(&self, alias: &str) -> Option<String> {
        let folded = fold_name(alias);
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(&folded).cloned())
    }

    /// `{"Column": {"Expression": {"SourceRef": {...}}, "Property": "Amount"}}`
    fn structured_field(&mut self, node: &Node, kind: FieldKind) {
        let Some(property) = node.get_str("Property") else {
            return;
        };
        let Some(source) = node.get("Expression").and_then(|e| e.get("SourceRef")) else {
            return;
        };
        let field = self.whole(property, LeafSyntax::Plain);
        if let Some(entity) = source.get_str("Entity") {
            self.out.push(Binding::Field {
                table: entity.value.clone(),
                field,
                kind,
            });
        } else if let Some(alias) = source.get_str("Source") {
            match self.resolve_alias(&alias.value) {
                Some(table) => self.out.push(Binding::Field { table, field, kind }),
                None => self.out.push(Binding::UnresolvedAlias {
                    alias: alias.value.clone(),
                    field,
                }),
            }
        }
    }

    /// `{"table": "Sales", "column": "Amount"}`
    fn lowercase_field(&mut self, node: &Node) {
        let Some(table) = node.get_str("table") else {
            return;
        };
        let (field, kind) = match (node.get_str("column"), node.get_str("measure")) {
            (Some(column), _) => (column, FieldKind::Column),
            (None, Some(measure)) => (measure, FieldKind::Measure),
            (None, None) => return,
        };
        let table_part = self.whole(table, LeafSyntax::Plain);
        let field_part = self.whole(field, LeafSyntax::Plain);
        self.out.push(Binding::Table(table_part));
        self.out.push(Binding::Field {
            table: table.value.clone(),
            field: field_part,
            kind,
        });
    }

    fn string_shapes(&mut self, s: &JsonString, key: Option<&str>) {
        if let Some(caps) = self.classifier.bracket_ref.captures(&s.value) {
            let (table_name, table_range, quoted) = match (caps.get(1), caps.get(2)) {
                (Some(inner), _) => (
                    inner.as_str().replace("''", "'"),
                    inner.start() - 1..inner.end() + 1,
                    true,
                ),
                (None, Some(bare)) => (bare.as_str().to_string(), bare.range(), false),
                (None, None) => return,
            };
            let Some(field) = caps.get(3) else {
                return;
            };
            let field_name = field.as_str().replace("]]", "]");
            let (Some(table_part), Some(field_part)) = (
                self.sub(s, table_range, table_name.clone(), LeafSyntax::DaxTable { quoted }),
                self.sub(s, field.range(), field_name, LeafSyntax::DaxBracket),
            ) else {
                return;
            };
            self.out.push(Binding::Table(table_part));
            self.out.push(Binding::Field {
                table: table_name,
                field: field_part,
                kind: FieldKind::Any,
            });
            return;
        }

        if key.is_some_and(|k| self.is_dotted_key(k)) {
            self.dotted(s);
        }
    }

    fn is_dotted_key(&self, key: &str) -> bool {
        match self.dialect {
            ReportDialect::Legacy => matches!(key, "queryRef" | "metadata" | "Name"),
            ReportDialect::Current => matches!(key, "queryRef" | "metadata"),
        }
    }

    /// `Sales.Amount` or `Sum(Sales.Amount)`
    fn dotted(&mut self, s: &JsonString) {
        let (inner, base) = match self.classifier.wrapped_ref.captures(&s.value).and_then(|c| c.get(1)) {
            Some(m) => (m.as_str(), m.start()),
            None => (s.value.as_str(), 0),
        };
        let mut candidates = Vec::new();
        for (dot, _) in inner.match_indices('.') {
            let (table, field) = (&inner[..dot], &inner[dot + 1..]);
            if table.trim().is_empty() || field.trim().is_empty() {
                continue;
            }
            let table_part = self.sub(s, base..base + dot, table.to_string(), LeafSyntax::Plain);
            let field_part = self.sub(
                s,
                base + dot + 1..base + inner.len(),
                field.to_string(),
                LeafSyntax::Plain,
            );
            if let (Some(table), Some(field)) = (table_part, field_part) {
                candidates.push(DottedCandidate { table, field });
            }
        }
        if !candidates.is_empty() {
            self.out.push(Binding::Dotted {
                text: s.value.clone(),
                span: self.file_span(s.span),
                candidates,
            });
        }
    }

    fn file_span(&self, span: TextSpan) -> TextSpan {
        match self.embedded {
            Some(doc) => doc.to_file_span(span),
            None => span,
        }
    }

    fn syntax(&self, leaf: LeafSyntax) -> TokenSyntax {
        TokenSyntax::dax(leaf).in_json(self.depth)
    }

    fn whole(&self, s: &JsonString, leaf: LeafSyntax) -> NamePart {
        NamePart {
            name: s.value.clone(),
            span: self.file_span(s.span),
            syntax: self.syntax(leaf),
        }
    }

    /// A part covering `range` of the decoded string value
    fn sub(&self, s: &JsonString, range: std::ops::Range<usize>, name: String, leaf: LeafSyntax) -> Option<NamePart> {
        let (_, offsets) = decode_json_string(s.span.slice(self.text)).ok()?;
        let start = s.span.start + offsets.get(range.start)?;
        let end = s.span.start + offsets.get(range.end)?;
        Some(NamePart {
            name,
            span: self.file_span(TextSpan::new(start, end)),
            syntax: self.syntax(leaf),
        })
    }
}
