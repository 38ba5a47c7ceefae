use crate::core::{EntityKey, EntityKind, OccurrenceKind};
use crate::project::ProjectFile;
use crate::report::{Binding, BindingClassifier, DottedCandidate, FieldKind, NamePart, ReportDocument};

use super::IndexBuilder;

impl IndexBuilder {
    pub(super) fn scan_report(&mut self, file: &ProjectFile, doc: &ReportDocument, classifier: &BindingClassifier) {
        for binding in classifier.classify(doc) {
            match binding {
                Binding::Table(part) => {
                    self.record_part(file, EntityKind::Table, None, &part);
                }
                Binding::Field { table, field, kind } => {
                    let Some(table_name) = self.table_name(&table) else { continue };
                    if let Some(field_kind) = self.field_kind(&table_name, &field.name, kind) {
                        self.record_part(file, field_kind, Some(&table_name), &field);
                    }
                }
                Binding::Dotted { text, span, candidates } => {
                    let resolved: Vec<(String, EntityKind, &DottedCandidate)> = candidates
                        .iter()
                        .filter_map(|c| {
                            let table = self.table_name(&c.table.name)?;
                            let kind = self.field_kind(&table, &c.field.name, FieldKind::Any)?;
                            Some((table, kind, c))
                        })
                        .collect();
                    match resolved.as_slice() {
                        [] => {}
                        [(table, kind, candidate)] => {
                            self.record_part(file, EntityKind::Table, None, &candidate.table);
                            self.record_part(file, *kind, Some(table), &candidate.field);
                        }
                        many => {
                            let keys = many
                                .iter()
                                .flat_map(|(table, kind, c)| {
                                    [
                                        EntityKey::new(EntityKind::Table, None, table),
                                        EntityKey::new(*kind, Some(table), &c.field.name),
                                    ]
                                })
                                .collect();
                            tracing::debug!("{}: '{}' splits into several known fields", file.rel_path.display(), text);
                            self.flag(file, span, "qualified name splits into more than one known field", keys);
                        }
                    }
                }
                Binding::UnresolvedAlias { alias, field } => {
                    let candidates: Vec<EntityKey> = self
                        .named(&field.name)
                        .into_iter()
                        .filter(|k| k.kind.is_table_scoped())
                        .collect();
                    if !candidates.is_empty() {
                        let reason = format!("source alias '{}' has no matching From entry", alias);
                        self.flag(file, field.span, reason, candidates);
                    }
                }
            }
        }
    }

    fn record_part(&mut self, file: &ProjectFile, kind: EntityKind, table: Option<&str>, part: &NamePart) -> bool {
        let key = EntityKey::new(kind, table, &part.name);
        self.record(&key, file, part.span, OccurrenceKind::VisualBinding, part.syntax)
    }

    fn field_kind(&self, table: &str, field: &str, hint: FieldKind) -> Option<EntityKind> {
        let is_column = self.has(EntityKind::Column, table, field);
        let is_measure = self.has(EntityKind::Measure, table, field);
        match hint {
            FieldKind::Column if is_column => Some(EntityKind::Column),
            FieldKind::Measure if is_measure => Some(EntityKind::Measure),
            FieldKind::Any if is_column => Some(EntityKind::Column),
            FieldKind::Any if is_measure => Some(EntityKind::Measure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::core::{EntityKey, EntityKind, OccurrenceKind};
    use crate::index::tests::index_of;

    const MODEL: (&str, &str) = (
        "M.SemanticModel/definition/tables/Sales.tmdl",
        "table Sales\n\n\tmeasure Total = 1\n\n\tcolumn Amount\n\t\tdataType: int64\n",
    );

    #[test]
    fn test_current_visual_bindings_are_indexed() {
        let visual = r#"{"visual": {"query": {"queryState": {"Values": {"projections": [
            {"field": {"Column": {"Expression": {"SourceRef": {"Entity": "Sales"}}, "Property": "Amount"}},
             "queryRef": "Sum(Sales.Amount)"},
            {"field": {"Measure": {"Expression": {"SourceRef": {"Entity": "Sales"}}, "Property": "Total"}},
             "queryRef": "Sales.Total"}
        ]}}}}}"#;
        let (index, _temp) = index_of(&[MODEL, ("M.Report/definition/pages/p/visuals/v/visual.json", visual)]);

        let visual_hits = |key: EntityKey| {
            index
                .entity(&key)
                .unwrap()
                .occurrences
                .iter()
                .filter(|o| o.kind == OccurrenceKind::VisualBinding)
                .count()
        };
        assert_eq!(visual_hits(EntityKey::new(EntityKind::Table, None, "Sales")), 4);
        assert_eq!(visual_hits(EntityKey::new(EntityKind::Column, Some("Sales"), "Amount")), 2);
        assert_eq!(visual_hits(EntityKey::new(EntityKind::Measure, Some("Sales"), "Total")), 2);
        assert!(index.flagged().is_empty());
    }

    #[test]
    fn test_dotted_with_two_resolutions_is_flagged() {
        let model = (
            "M.SemanticModel/definition/tables/A.tmdl",
            "table A\n\n\tcolumn 'B.C'\n\t\tdataType: int64\n\ntable 'A.B'\n\n\tcolumn C\n\t\tdataType: int64\n",
        );
        let visual = r#"{"queryRef": "A.B.C"}"#;
        let (index, _temp) = index_of(&[model, ("M.Report/definition/pages/p/page.json", visual)]);
        assert_eq!(index.flagged().len(), 1);
        assert_eq!(index.flagged()[0].candidates.len(), 4);
    }

    #[test]
    fn test_unknown_names_are_ignored() {
        let visual = r#"{"queryRef": "Other.Amount", "expr": "Other[Amount]"}"#;
        let (index, _temp) = index_of(&[MODEL, ("M.Report/definition/report.json", visual)]);
        let amount = index
            .entity(&EntityKey::new(EntityKind::Column, Some("Sales"), "Amount"))
            .unwrap();
        assert_eq!(amount.occurrences.len(), 1);
        assert!(index.flagged().is_empty());
    }
}
