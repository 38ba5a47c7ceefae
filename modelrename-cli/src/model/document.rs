use crate::core::{apply_edits, EditError, EntityKind, LineIndex, ParseError, TextEdit, TextSpan};

use super::parser::Parser;

/// An object or property name as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub value: String,
    /// Raw token span, including quotes when quoted
    pub span: TextSpan,
    pub quoted: bool,
}

/// A DAX or M expression body following `=`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub span: TextSpan,
    pub line: usize,
    pub fenced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// `isHidden`
    Flag,
    /// `dataType: int64`
    Scalar { text: String, span: TextSpan },
    /// `formatString: "0.0"`, span includes the quotes
    Quoted { value: String, span: TextSpan },
    /// `source = ...`
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: String,
    pub value: PropertyValue,
    pub line: usize,
    pub span: TextSpan,
}

/// One declaration block (`table`, `column`, `measure`, `relationship`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelObject {
    pub keyword: String,
    /// For `ref table X`, the referenced keyword (`table`)
    pub ref_target: Option<String>,
    pub name: Option<Name>,
    pub kind: Option<EntityKind>,
    pub expression: Option<Expression>,
    /// Span of the `///` description lines above the declaration
    pub description: Option<TextSpan>,
    pub properties: Vec<Property>,
    pub children: Vec<ModelObject>,
    pub line: usize,
    pub span: TextSpan,
}

impl ModelObject {
    pub fn name_str(&self) -> Option<&str> {
        self.name.as_ref().map(|n| n.value.as_str())
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.key == key)
    }

    /// Raw text of a scalar or quoted property value
    pub fn property_text(&self, key: &str) -> Option<&str> {
        match &self.property(key)?.value {
            PropertyValue::Scalar { text, .. } => Some(text),
            PropertyValue::Quoted { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn has_flag(&self, key: &str) -> bool {
        matches!(self.property(key).map(|p| &p.value), Some(PropertyValue::Flag))
    }

    pub fn children_with<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a ModelObject> {
        self.children.iter().filter(move |c| c.keyword == keyword)
    }

    pub fn is_ref_to(&self, keyword: &str) -> bool {
        self.keyword == "ref" && self.ref_target.as_deref() == Some(keyword)
    }
}

/// A parsed TMDL file. Owns the source text so unedited bytes can be
/// reproduced exactly.
#[derive(Debug, Clone)]
pub struct ModelDocument {
    text: String,
    objects: Vec<ModelObject>,
    line_index: LineIndex,
}

impl ModelDocument {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let objects = Parser::new(text).parse()?;
        Ok(Self {
            text: text.to_string(),
            objects,
            line_index: LineIndex::new(text),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn objects(&self) -> &[ModelObject] {
        &self.objects
    }

    pub fn slice(&self, span: TextSpan) -> &str {
        span.slice(&self.text)
    }

    pub fn position(&self, offset: usize) -> (usize, usize) {
        self.line_index.position(&self.text, offset)
    }

    pub fn tables(&self) -> impl Iterator<Item = &ModelObject> {
        self.objects.iter().filter(|o| o.kind == Some(EntityKind::Table))
    }

    pub fn relationships(&self) -> impl Iterator<Item = &ModelObject> {
        self.objects
            .iter()
            .filter(|o| o.kind == Some(EntityKind::Relationship))
    }

    /// Regenerate the file text with `edits` applied
    pub fn serialize(&self, edits: &[TextEdit]) -> Result<String, EditError> {
        apply_edits(&self.text, edits)
    }
}
