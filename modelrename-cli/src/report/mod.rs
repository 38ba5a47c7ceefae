//! Report definitions: span-preserving JSON and the field bindings inside it.

mod classify;
mod document;
mod parser;

pub use classify::{Binding, BindingClassifier, DottedCandidate, FieldKind, NamePart};
pub use document::{EmbeddedDocument, JsonString, Member, Node, NodeValue, ReportDialect, ReportDocument};
