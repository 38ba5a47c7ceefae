use serde::Serialize;

use crate::core::{apply_edits, EditError, LineIndex, ParseError, TextEdit, TextSpan};

use super::parser::{decode_json_string, JsonParser};

/// Keys whose string values hold a nested JSON document in `report.json`
const EMBEDDED_KEYS: &[&str] = &["config", "filters", "query", "dataTransforms"];

/// Which report layout a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportDialect {
    /// Single `report.json` with stringified `config`/`filters`/`query` payloads
    Legacy,
    /// `definition/**/*.json`, one visual or page per file
    Current,
}

/// A JSON string literal. `span` covers the raw content between the quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonString {
    pub value: String,
    pub span: TextSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub key: JsonString,
    pub value: Node,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeValue {
    Object(Vec<Member>),
    Array(Vec<Node>),
    String(JsonString),
    Number,
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub value: NodeValue,
    pub span: TextSpan,
}

impl Node {
    pub fn members(&self) -> &[Member] {
        match &self.value {
            NodeValue::Object(members) => members,
            _ => &[],
        }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.members()
            .iter()
            .find(|m| m.key.value == key)
            .map(|m| &m.value)
    }

    pub fn as_str(&self) -> Option<&JsonString> {
        match &self.value {
            NodeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&JsonString> {
        self.get(key).and_then(Node::as_str)
    }
}

/// A JSON document stored as a string value inside the file
#[derive(Debug, Clone)]
pub struct EmbeddedDocument {
    pub key: String,
    /// Decoded text of the host string; spans in `root` index into it
    pub text: String,
    pub root: Node,
    /// File offset for each byte of `text`, plus one for its end
    offsets: Vec<usize>,
}

impl EmbeddedDocument {
    /// Translate a span within `text` to a span within the file
    pub fn to_file_span(&self, span: TextSpan) -> TextSpan {
        TextSpan::new(self.offsets[span.start], self.offsets[span.end])
    }
}

/// A parsed report JSON file
#[derive(Debug, Clone)]
pub struct ReportDocument {
    text: String,
    dialect: ReportDialect,
    root: Node,
    embedded: Vec<EmbeddedDocument>,
    line_index: LineIndex,
}

impl ReportDocument {
    pub fn parse(text: &str, dialect: ReportDialect) -> Result<Self, ParseError> {
        Self::parse_with(text, dialect, true)
    }

    /// Parse without descending into stringified payloads
    pub fn parse_shallow(text: &str, dialect: ReportDialect) -> Result<Self, ParseError> {
        Self::parse_with(text, dialect, false)
    }

    fn parse_with(text: &str, dialect: ReportDialect, embedded: bool) -> Result<Self, ParseError> {
        let root = JsonParser::new(text).parse()?;
        let line_index = LineIndex::new(text);
        let mut docs = Vec::new();
        if dialect == ReportDialect::Legacy && embedded {
            collect_embedded(text, &line_index, &root, &mut docs)?;
        }
        Ok(Self {
            text: text.to_string(),
            dialect,
            root,
            embedded: docs,
            line_index,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn dialect(&self) -> ReportDialect {
        self.dialect
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn embedded(&self) -> &[EmbeddedDocument] {
        &self.embedded
    }

    pub fn position(&self, offset: usize) -> (usize, usize) {
        self.line_index.position(&self.text, offset)
    }

    pub fn serialize(&self, edits: &[TextEdit]) -> Result<String, EditError> {
        apply_edits(&self.text, edits)
    }
}

fn collect_embedded(
    text: &str,
    line_index: &LineIndex,
    node: &Node,
    out: &mut Vec<EmbeddedDocument>,
) -> Result<(), ParseError> {
    match &node.value {
        NodeValue::Object(members) => {
            for member in members {
                let host = match member.value.as_str() {
                    Some(s) if EMBEDDED_KEYS.contains(&member.key.value.as_str()) => s,
                    _ => {
                        collect_embedded(text, line_index, &member.value, out)?;
                        continue;
                    }
                };
                let trimmed = host.value.trim_start();
                if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
                    continue;
                }
                let located = |offset: usize, reason: String| {
                    let (line, column) = line_index.position(text, offset);
                    ParseError::new(line, column, reason)
                };
                let (decoded, raw_offsets) = decode_json_string(host.span.slice(text))
                    .map_err(|(offset, reason)| located(host.span.start + offset, reason.to_string()))?;
                let root = JsonParser::new(&decoded).parse().map_err(|e| {
                    located(
                        host.span.start,
                        format!("embedded {} document: {}", member.key.value, e),
                    )
                })?;
                out.push(EmbeddedDocument {
                    key: member.key.value.clone(),
                    offsets: raw_offsets.iter().map(|o| host.span.start + o).collect(),
                    text: decoded,
                    root,
                });
            }
        }
        NodeValue::Array(items) => {
            for item in items {
                collect_embedded(text, line_index, item, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"{
  "config": "{\"version\":\"5.43\"}",
  "sections": [
    {
      "name": "ReportSection",
      "visualContainers": [
        {
          "config": "{\"name\":\"v1\",\"singleVisual\":{\"projections\":{\"Values\":[{\"queryRef\":\"tbl_Sales.Amount\"}]}}}",
          "query": "plain text, not json"
        }
      ]
    }
  ]
}"#;

    #[test]
    fn test_legacy_embedded_documents_are_parsed() {
        let doc = ReportDocument::parse(LEGACY, ReportDialect::Legacy).unwrap();
        assert_eq!(doc.embedded().len(), 2);
        let visual = &doc.embedded()[1];
        assert_eq!(visual.key, "config");
        assert!(visual.text.contains("\"queryRef\":\"tbl_Sales.Amount\""));
    }

    #[test]
    fn test_embedded_spans_map_back_to_file() {
        let doc = ReportDocument::parse(LEGACY, ReportDialect::Legacy).unwrap();
        let visual = &doc.embedded()[1];
        let at = visual.text.find("tbl_Sales.Amount").unwrap();
        let span = visual.to_file_span(TextSpan::new(at, at + "tbl_Sales".len()));
        assert_eq!(span.slice(doc.text()), "tbl_Sales");

        // Spans that cover an escaped quote map to the escape sequence
        let quote = visual.text.find("\"v1\"").unwrap();
        let span = visual.to_file_span(TextSpan::new(quote, quote + 4));
        assert_eq!(span.slice(doc.text()), "\\\"v1\\\"");
    }

    #[test]
    fn test_current_dialect_skips_embedded() {
        let doc = ReportDocument::parse(LEGACY, ReportDialect::Current).unwrap();
        assert!(doc.embedded().is_empty());
    }

    #[test]
    fn test_malformed_embedded_document_fails() {
        let text = r#"{"config": "{\"name\": }"}"#;
        let err = ReportDocument::parse(text, ReportDialect::Legacy).unwrap_err();
        assert!(err.reason.contains("embedded config document"));
        assert!(ReportDocument::parse_shallow(text, ReportDialect::Legacy).is_ok());
    }

    #[test]
    fn test_serialize_without_edits_is_identity() {
        let doc = ReportDocument::parse(LEGACY, ReportDialect::Legacy).unwrap();
        assert_eq!(doc.serialize(&[]).unwrap(), LEGACY);
    }
}
