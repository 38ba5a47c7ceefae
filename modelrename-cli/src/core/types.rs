use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::span::TextSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Table,
    Column,
    Measure,
    Relationship,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Column => "column",
            Self::Measure => "measure",
            Self::Relationship => "relationship",
        }
    }

    /// Whether names of this kind are scoped by an owning table
    pub fn is_table_scoped(self) -> bool {
        matches!(self, Self::Column | Self::Measure)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "column" => Ok(Self::Column),
            "measure" => Ok(Self::Measure),
            "relationship" => Ok(Self::Relationship),
            other => Err(format!("unknown entity kind: {}", other)),
        }
    }
}

/// An entity name scoped by its owning table where applicable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }

    pub fn field(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "'{}'[{}]", table, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Power BI object names compare case-insensitively
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// Case-insensitive identity of an entity, used as the reference index key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub table: String,
    pub name: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, table: Option<&str>, name: &str) -> Self {
        Self {
            kind,
            table: table.map(fold_name).unwrap_or_default(),
            name: fold_name(name),
        }
    }

    pub fn of(kind: EntityKind, name: &QualifiedName) -> Self {
        Self::new(kind, name.table.as_deref(), &name.name)
    }
}

/// A position in a project file (path relative to the project root)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file_path: PathBuf,
    pub line: usize,
    pub column: usize,
}

/// The syntactic role of an occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceKind {
    Declaration,
    ModelReference,
    RelationshipEndpoint,
    FormulaReference,
    VisualBinding,
}

/// How a name token is spelled at an occurrence site, so the replacement
/// keeps the site's syntax valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafSyntax {
    /// TMDL object name or qualified-name part; quoted when required or already quoted
    TmdlName { quoted: bool },
    /// DAX table token; quoted when required or already quoted
    DaxTable { quoted: bool },
    /// Text between `[` and `]`, with `]` doubled
    DaxBracket,
    /// Raw name with no surrounding syntax
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TokenSyntax {
    pub leaf: LeafSyntax,
    /// Number of JSON string layers the token is embedded in
    pub json_depth: u8,
}

impl TokenSyntax {
    pub fn tmdl(quoted: bool) -> Self {
        Self {
            leaf: LeafSyntax::TmdlName { quoted },
            json_depth: 0,
        }
    }

    pub fn dax(leaf: LeafSyntax) -> Self {
        Self {
            leaf,
            json_depth: 0,
        }
    }

    pub fn in_json(self, depth: u8) -> Self {
        Self {
            leaf: self.leaf,
            json_depth: depth,
        }
    }

    /// Spell `name` for this site
    pub fn render(&self, name: &str) -> String {
        let mut text = match self.leaf {
            LeafSyntax::TmdlName { quoted } => {
                if quoted || tmdl_needs_quotes(name) {
                    quote_single(name)
                } else {
                    name.to_string()
                }
            }
            LeafSyntax::DaxTable { quoted } => {
                if quoted || dax_needs_quotes(name) {
                    quote_single(name)
                } else {
                    name.to_string()
                }
            }
            LeafSyntax::DaxBracket => name.replace(']', "]]"),
            LeafSyntax::Plain => name.to_string(),
        };
        for _ in 0..self.json_depth {
            text = escape_json_content(&text);
        }
        text
    }
}

fn quote_single(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

pub fn tmdl_needs_quotes(name: &str) -> bool {
    !is_plain_identifier(name)
}

pub fn dax_needs_quotes(name: &str) -> bool {
    !is_plain_identifier(name)
}

/// Escape text for placement between JSON string quotes
pub fn escape_json_content(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// One recorded occurrence of an entity's name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occurrence {
    pub location: Location,
    pub span: TextSpan,
    pub kind: OccurrenceKind,
    pub syntax: TokenSyntax,
    /// The raw source text of the name token
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_tmdl_quotes_only_when_needed() {
        assert_eq!(TokenSyntax::tmdl(false).render("Sales"), "Sales");
        assert_eq!(TokenSyntax::tmdl(false).render("Fact Sales"), "'Fact Sales'");
        assert_eq!(TokenSyntax::tmdl(true).render("Sales"), "'Sales'");
        assert_eq!(TokenSyntax::tmdl(false).render("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn test_render_dax_bracket_escapes_closing_bracket() {
        let syntax = TokenSyntax::dax(LeafSyntax::DaxBracket);
        assert_eq!(syntax.render("Amount [USD]"), "Amount [USD]]");
    }

    #[test]
    fn test_render_embedded_json_escapes_per_layer() {
        let syntax = TokenSyntax::dax(LeafSyntax::Plain).in_json(2);
        assert_eq!(syntax.render("Say \"hi\""), "Say \\\\\\\"hi\\\\\\\"");
        let syntax = TokenSyntax::dax(LeafSyntax::DaxTable { quoted: false }).in_json(1);
        assert_eq!(syntax.render("Fact Sales"), "'Fact Sales'");
    }

    #[test]
    fn test_entity_key_is_case_insensitive() {
        assert_eq!(
            EntityKey::new(EntityKind::Column, Some("Sales"), "Amount"),
            EntityKey::new(EntityKind::Column, Some("SALES"), "amount")
        );
        assert_ne!(
            EntityKey::new(EntityKind::Column, Some("Sales"), "Amount"),
            EntityKey::new(EntityKind::Measure, Some("Sales"), "Amount")
        );
    }
}
