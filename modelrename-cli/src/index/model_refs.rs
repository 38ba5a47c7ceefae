use crate::core::{EntityKey, EntityKind, LeafSyntax, OccurrenceKind, QualifiedName, TextSpan, TokenSyntax};
use crate::dax::{self, DaxReference};
use crate::model::names::{parse_qualified, NameToken};
use crate::model::{Expression, ModelDocument, ModelObject, Name, PropertyValue};
use crate::project::ProjectFile;

use super::{IndexBuilder, OpaqueRegion};

/// KPI properties whose values are DAX
const KPI_EXPRESSIONS: &[&str] = &["targetExpression", "statusExpression", "trendExpression"];

/// Calculation group properties whose values are DAX
const CALCULATION_GROUP_EXPRESSIONS: &[&str] = &["noSelectionExpression", "multipleOrEmptySelectionExpression"];

impl IndexBuilder {
    pub(super) fn declare_model(&mut self, file: &ProjectFile, doc: &ModelDocument) {
        for table in doc.tables() {
            let Some(table_name) = &table.name else { continue };
            self.declare(
                file,
                EntityKind::Table,
                QualifiedName::table(&table_name.value),
                table_name.span,
                TokenSyntax::tmdl(table_name.quoted),
            );
            for child in &table.children {
                let (Some(kind @ (EntityKind::Column | EntityKind::Measure)), Some(name)) = (child.kind, &child.name) else {
                    continue;
                };
                self.declare(
                    file,
                    kind,
                    QualifiedName::field(&table_name.value, &name.value),
                    name.span,
                    TokenSyntax::tmdl(name.quoted),
                );
            }
        }
        for rel in doc.relationships() {
            let Some(name) = &rel.name else { continue };
            self.declare(
                file,
                EntityKind::Relationship,
                QualifiedName::table(&name.value),
                name.span,
                TokenSyntax::tmdl(name.quoted),
            );
        }
    }

    pub(super) fn scan_model(&mut self, file: &ProjectFile, doc: &ModelDocument) {
        for object in doc.objects() {
            self.visit(file, doc, object, None);
        }
    }

    fn visit(&mut self, file: &ProjectFile, doc: &ModelDocument, object: &ModelObject, host: Option<&str>) {
        let mut host = host.map(str::to_string);

        match object.keyword.as_str() {
            "ref" if object.is_ref_to("table") => {
                if let Some(name) = &object.name {
                    self.record_name(file, EntityKind::Table, None, name, OccurrenceKind::ModelReference);
                }
            }
            "table" => host = object.name_str().map(str::to_string),
            "column" | "measure" | "calculationItem" | "formatStringDefinition" | "detailRowsDefinition" => {
                if let Some(expr) = &object.expression {
                    self.scan_dax(file, doc, expr, host.as_deref());
                }
                if let Some(table) = host.as_deref() {
                    self.scalar_field(file, object, "sortByColumn", table);
                }
            }
            "calculationGroup" => {
                for key in CALCULATION_GROUP_EXPRESSIONS {
                    if let Some(PropertyValue::Expression(expr)) = object.property(key).map(|p| &p.value) {
                        self.scan_dax(file, doc, expr, host.as_deref());
                    }
                }
            }
            "kpi" => {
                for key in KPI_EXPRESSIONS {
                    if let Some(PropertyValue::Expression(expr)) = object.property(key).map(|p| &p.value) {
                        self.scan_dax(file, doc, expr, host.as_deref());
                    }
                }
            }
            "partition" => {
                let calculated = object
                    .expression
                    .as_ref()
                    .is_some_and(|e| doc.slice(e.span).trim().eq_ignore_ascii_case("calculated"));
                if calculated {
                    if let Some(PropertyValue::Expression(expr)) = object.property("source").map(|p| &p.value) {
                        self.scan_dax(file, doc, expr, host.as_deref());
                    }
                }
            }
            "level" => {
                if let Some(table) = host.as_deref() {
                    self.scalar_field(file, object, "column", table);
                }
            }
            "relationship" => {
                for key in ["fromColumn", "toColumn"] {
                    self.endpoint(file, object, key);
                }
            }
            "variation" => {
                if let Some(parts) = scalar_parts(object, "relationship") {
                    if let [id] = parts.as_slice() {
                        self.record_token(file, EntityKind::Relationship, None, id, OccurrenceKind::ModelReference);
                    }
                }
                if let Some(parts) = scalar_parts(object, "defaultHierarchy") {
                    if let [table, _hierarchy] = parts.as_slice() {
                        self.record_token(file, EntityKind::Table, None, table, OccurrenceKind::ModelReference);
                    }
                }
            }
            "tablePermission" | "perspectiveTable" => {
                if let Some(name) = &object.name {
                    self.record_name(file, EntityKind::Table, None, name, OccurrenceKind::ModelReference);
                    host = self.table_name(&name.value);
                }
                if let Some(expr) = &object.expression {
                    self.scan_dax(file, doc, expr, host.as_deref());
                }
            }
            "columnPermission" | "perspectiveColumn" | "perspectiveMeasure" => {
                let kind = if object.keyword == "perspectiveMeasure" {
                    EntityKind::Measure
                } else {
                    EntityKind::Column
                };
                if let (Some(name), Some(table)) = (&object.name, host.as_deref()) {
                    self.record_name(file, kind, Some(table), name, OccurrenceKind::ModelReference);
                }
            }
            _ => {}
        }

        for child in &object.children {
            self.visit(file, doc, child, host.as_deref());
        }
    }

    fn record_name(&mut self, file: &ProjectFile, kind: EntityKind, table: Option<&str>, name: &Name, occurrence: OccurrenceKind) {
        let key = EntityKey::new(kind, table, &name.value);
        self.record(&key, file, name.span, occurrence, TokenSyntax::tmdl(name.quoted));
    }

    fn record_token(&mut self, file: &ProjectFile, kind: EntityKind, table: Option<&str>, token: &NameToken, occurrence: OccurrenceKind) {
        let key = EntityKey::new(kind, table, &token.value);
        self.record(&key, file, token.span, occurrence, TokenSyntax::tmdl(token.quoted));
    }

    /// `sortByColumn: Month` style properties naming a column of `table`
    fn scalar_field(&mut self, file: &ProjectFile, object: &ModelObject, key: &str, table: &str) {
        if let Some(parts) = scalar_parts(object, key) {
            if let [column] = parts.as_slice() {
                self.record_token(file, EntityKind::Column, Some(table), column, OccurrenceKind::ModelReference);
            }
        }
    }

    /// `fromColumn: 'Fact Sales'.CustomerKey`
    fn endpoint(&mut self, file: &ProjectFile, object: &ModelObject, key: &str) {
        let Some(parts) = scalar_parts(object, key) else { return };
        let [table, column] = parts.as_slice() else {
            tracing::warn!(
                "{}:{}: relationship endpoint '{}' is not Table.Column",
                file.rel_path.display(),
                object.line,
                key
            );
            return;
        };
        let kind = OccurrenceKind::RelationshipEndpoint;
        self.record_token(file, EntityKind::Table, None, table, kind);
        if let Some(table_name) = self.table_name(&table.value) {
            self.record_token(file, EntityKind::Column, Some(&table_name), column, kind);
        }
    }

    fn scan_dax(&mut self, file: &ProjectFile, doc: &ModelDocument, expr: &Expression, host: Option<&str>) {
        let text = doc.slice(expr.span);
        let refs = match dax::references(text) {
            Ok(refs) => refs,
            Err(error) => {
                tracing::debug!("{}:{}: opaque formula ({})", file.rel_path.display(), expr.line, error);
                self.opaque.push(OpaqueRegion {
                    location: file.location(expr.span.start),
                    span: expr.span,
                    text: text.to_string(),
                    reason: error.reason,
                });
                return;
            }
        };

        let base = expr.span.start;
        let kind = OccurrenceKind::FormulaReference;
        for reference in refs {
            match reference {
                DaxReference::Qualified {
                    table,
                    table_span,
                    table_quoted,
                    field,
                    field_span,
                } => {
                    let Some(table_name) = self.table_name(&table) else { continue };
                    let table_syntax = TokenSyntax::dax(LeafSyntax::DaxTable { quoted: table_quoted });
                    self.record(&EntityKey::new(EntityKind::Table, None, &table), file, table_span.offset(base), kind, table_syntax);
                    let field_syntax = TokenSyntax::dax(LeafSyntax::DaxBracket);
                    let field_kind = if self.has(EntityKind::Column, &table_name, &field) {
                        EntityKind::Column
                    } else {
                        EntityKind::Measure
                    };
                    self.record(
                        &EntityKey::new(field_kind, Some(&table_name), &field),
                        file,
                        field_span.offset(base),
                        kind,
                        field_syntax,
                    );
                }
                DaxReference::Bare { field, span } => self.bare_field(file, &field, span.offset(base), host),
                DaxReference::Table { name, span, quoted } => {
                    let syntax = TokenSyntax::dax(LeafSyntax::DaxTable { quoted });
                    self.record(&EntityKey::new(EntityKind::Table, None, &name), file, span.offset(base), kind, syntax);
                }
                DaxReference::StringLiteral { value, span } => {
                    let candidates = self.named(&value);
                    if !candidates.is_empty() {
                        self.flag(file, span.offset(base), "string literal matches an entity name", candidates);
                    }
                }
                DaxReference::Variable { name, span } => {
                    if self.table_name(&name).is_some() {
                        let candidates = vec![EntityKey::new(EntityKind::Table, None, &name)];
                        self.flag(file, span.offset(base), "variable has the same name as a table", candidates);
                    }
                }
            }
        }
    }

    /// `[X]` with no table: resolved against the host table's columns and
    /// the model's measures
    fn bare_field(&mut self, file: &ProjectFile, field: &str, span: TextSpan, host: Option<&str>) {
        let host_column = host.filter(|t| self.has(EntityKind::Column, t, field));
        let measure_tables = self.tables_with(EntityKind::Measure, field);
        let syntax = TokenSyntax::dax(LeafSyntax::DaxBracket);
        let kind = OccurrenceKind::FormulaReference;

        let measure_keys = || {
            measure_tables
                .iter()
                .map(|t| EntityKey::new(EntityKind::Measure, Some(t), field))
                .collect::<Vec<_>>()
        };

        match (host_column, measure_tables.as_slice()) {
            (Some(table), []) => {
                self.record(&EntityKey::new(EntityKind::Column, Some(table), field), file, span, kind, syntax);
            }
            (None, [table]) => {
                let key = EntityKey::new(EntityKind::Measure, Some(table), field);
                self.record(&key, file, span, kind, syntax);
            }
            (Some(table), _) => {
                let mut candidates = measure_keys();
                candidates.push(EntityKey::new(EntityKind::Column, Some(table), field));
                self.flag(file, span, "matches both a column of the current table and a measure", candidates);
            }
            (None, [_, _, ..]) => {
                self.flag(file, span, "matches measures in several tables", measure_keys());
            }
            (None, []) => {
                let column_tables = self.tables_with(EntityKind::Column, field);
                if !column_tables.is_empty() {
                    let candidates = column_tables
                        .iter()
                        .map(|t| EntityKey::new(EntityKind::Column, Some(t), field))
                        .collect();
                    self.flag(file, span, "column of another table referenced without its table", candidates);
                }
            }
        }
    }
}

/// Name tokens of a scalar property value, with spans in the file
fn scalar_parts(object: &ModelObject, key: &str) -> Option<Vec<NameToken>> {
    let PropertyValue::Scalar { text, span } = &object.property(key)?.value else {
        return None;
    };
    let parts = parse_qualified(text)?;
    Some(
        parts
            .into_iter()
            .map(|p| NameToken {
                span: p.span.offset(span.start),
                ..p
            })
            .collect(),
    )
}
