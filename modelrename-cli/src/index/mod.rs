//! Cross-file reference index: every occurrence of every entity name, plus
//! the sites that look like references but cannot be resolved safely.

mod model_refs;
mod report_refs;

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::core::{
    fold_name, EntityKey, EntityKind, Location, Occurrence, OccurrenceKind, QualifiedName, TextSpan,
    TokenSyntax, UnknownReason,
};
use crate::project::{Project, ProjectFile};
use crate::report::BindingClassifier;

/// An entity and everything that names it
#[derive(Debug, Clone, Serialize)]
pub struct IndexedEntity {
    pub kind: EntityKind,
    pub name: QualifiedName,
    pub declared_in: PathBuf,
    pub occurrences: Vec<Occurrence>,
}

impl IndexedEntity {
    pub fn key(&self) -> EntityKey {
        EntityKey::of(self.kind, &self.name)
    }
}

/// A site that matches an entity name but is never edited
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedOccurrence {
    pub location: Location,
    #[serde(skip)]
    pub span: TextSpan,
    pub text: String,
    pub reason: String,
    /// Entities the site might refer to
    pub candidates: Vec<EntityKey>,
}

/// A formula that could not be tokenized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpaqueRegion {
    pub location: Location,
    #[serde(skip)]
    pub span: TextSpan,
    #[serde(skip)]
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    entities: BTreeMap<EntityKey, IndexedEntity>,
    flagged: Vec<FlaggedOccurrence>,
    opaque: Vec<OpaqueRegion>,
}

impl ReferenceIndex {
    pub fn build(project: &Project) -> Self {
        let mut builder = IndexBuilder::default();
        for (file, doc) in project.model_files() {
            builder.declare_model(file, doc);
        }
        for (file, doc) in project.model_files() {
            builder.scan_model(file, doc);
        }
        let classifier = BindingClassifier::new();
        for (file, doc) in project.report_files() {
            builder.scan_report(file, doc, &classifier);
        }
        let index = builder.finish();
        tracing::debug!(
            "Indexed {} entities, {} flagged sites, {} opaque formulas",
            index.entities.len(),
            index.flagged.len(),
            index.opaque.len()
        );
        index
    }

    pub fn entity(&self, key: &EntityKey) -> Option<&IndexedEntity> {
        self.entities.get(key)
    }

    pub fn entities(&self) -> impl Iterator<Item = &IndexedEntity> {
        self.entities.values()
    }

    pub fn flagged(&self) -> &[FlaggedOccurrence] {
        &self.flagged
    }

    pub fn opaque(&self) -> &[OpaqueRegion] {
        &self.opaque
    }

    /// Find the entity a user-supplied name refers to. For columns and
    /// measures the table may be omitted when the name is unique.
    pub fn resolve(&self, kind: EntityKind, table: Option<&str>, name: &str) -> Result<&IndexedEntity, UnknownReason> {
        if !kind.is_table_scoped() || table.is_some() {
            let table = table.filter(|_| kind.is_table_scoped());
            return self
                .entities
                .get(&EntityKey::new(kind, table, name))
                .ok_or(UnknownReason::Missing);
        }

        let folded = fold_name(name);
        let matches: Vec<&IndexedEntity> = self
            .entities
            .iter()
            .filter(|(key, _)| key.kind == kind && key.name == folded)
            .map(|(_, entity)| entity)
            .collect();
        match matches.as_slice() {
            [] => Err(UnknownReason::Missing),
            [only] => Ok(*only),
            many => Err(UnknownReason::Ambiguous {
                candidates: many.iter().map(|e| e.name.to_string()).collect(),
            }),
        }
    }

    /// Columns and measures declared in `table`
    pub fn fields_of<'a>(&'a self, table: &str) -> impl Iterator<Item = &'a IndexedEntity> + 'a {
        let folded = fold_name(table);
        self.entities
            .iter()
            .filter(move |(key, _)| key.kind.is_table_scoped() && key.table == folded)
            .map(|(_, entity)| entity)
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &IndexedEntity> {
        self.entities.values().filter(move |e| e.kind == kind)
    }
}

/// Mutable state while walking the project
#[derive(Default)]
pub(crate) struct IndexBuilder {
    entities: BTreeMap<EntityKey, IndexedEntity>,
    /// Folded table name -> declared name
    tables: HashMap<String, String>,
    /// Folded column name -> declared names of the tables that have it
    column_tables: HashMap<String, Vec<String>>,
    /// Folded measure name -> declared names of the tables that have it
    measure_tables: HashMap<String, Vec<String>>,
    flagged: Vec<FlaggedOccurrence>,
    opaque: Vec<OpaqueRegion>,
}

impl IndexBuilder {
    fn declare(
        &mut self,
        file: &ProjectFile,
        kind: EntityKind,
        name: QualifiedName,
        span: TextSpan,
        syntax: TokenSyntax,
    ) {
        let key = EntityKey::of(kind, &name);
        match (kind, name.table.as_ref()) {
            (EntityKind::Table, _) => {
                self.tables.insert(key.name.clone(), name.name.clone());
            }
            (EntityKind::Column, Some(table)) => {
                self.column_tables.entry(key.name.clone()).or_default().push(table.clone());
            }
            (EntityKind::Measure, Some(table)) => {
                self.measure_tables.entry(key.name.clone()).or_default().push(table.clone());
            }
            _ => {}
        }
        let entity = self.entities.entry(key.clone()).or_insert_with(|| IndexedEntity {
            kind,
            name,
            declared_in: file.rel_path.clone(),
            occurrences: Vec::new(),
        });
        entity.occurrences.push(occurrence(file, span, OccurrenceKind::Declaration, syntax));
    }

    /// Record an occurrence if `key` names a declared entity
    fn record(&mut self, key: &EntityKey, file: &ProjectFile, span: TextSpan, kind: OccurrenceKind, syntax: TokenSyntax) -> bool {
        match self.entities.get_mut(key) {
            Some(entity) => {
                entity.occurrences.push(occurrence(file, span, kind, syntax));
                true
            }
            None => false,
        }
    }

    fn flag(&mut self, file: &ProjectFile, span: TextSpan, reason: impl Into<String>, candidates: Vec<EntityKey>) {
        self.flagged.push(FlaggedOccurrence {
            location: file.location(span.start),
            span,
            text: span.slice(file.text()).to_string(),
            reason: reason.into(),
            candidates,
        });
    }

    fn table_name(&self, name: &str) -> Option<String> {
        self.tables.get(&fold_name(name)).cloned()
    }

    fn has(&self, kind: EntityKind, table: &str, name: &str) -> bool {
        self.entities.contains_key(&EntityKey::new(kind, Some(table), name))
    }

    fn tables_with(&self, kind: EntityKind, name: &str) -> Vec<String> {
        let map = match kind {
            EntityKind::Column => &self.column_tables,
            EntityKind::Measure => &self.measure_tables,
            _ => return Vec::new(),
        };
        map.get(&fold_name(name)).cloned().unwrap_or_default()
    }

    /// Every entity whose own name equals `name`
    fn named(&self, name: &str) -> Vec<EntityKey> {
        let folded = fold_name(name);
        self.entities
            .keys()
            .filter(|key| key.name == folded)
            .cloned()
            .collect()
    }

    fn finish(mut self) -> ReferenceIndex {
        for entity in self.entities.values_mut() {
            entity
                .occurrences
                .sort_by(|a, b| (&a.location.file_path, a.span.start).cmp(&(&b.location.file_path, b.span.start)));
            entity
                .occurrences
                .dedup_by(|a, b| a.location.file_path == b.location.file_path && a.span == b.span);
        }
        self.flagged
            .sort_by(|a, b| (&a.location.file_path, a.span.start).cmp(&(&b.location.file_path, b.span.start)));
        self.flagged
            .dedup_by(|a, b| a.location.file_path == b.location.file_path && a.span == b.span);
        self.opaque
            .sort_by(|a, b| (&a.location.file_path, a.span.start).cmp(&(&b.location.file_path, b.span.start)));

        ReferenceIndex {
            entities: self.entities,
            flagged: self.flagged,
            opaque: self.opaque,
        }
    }
}

fn occurrence(file: &ProjectFile, span: TextSpan, kind: OccurrenceKind, syntax: TokenSyntax) -> Occurrence {
    Occurrence {
        location: file.location(span.start),
        span,
        kind,
        syntax,
        text: span.slice(file.text()).to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::RenameConfig;
    use crate::project::{discover, load_files};
    use std::fs;
    use tempfile::TempDir;

    /// Build a project from `(path, text)` pairs under a temp root and index it
    pub(crate) fn index_of(files: &[(&str, &str)]) -> (ReferenceIndex, TempDir) {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("M.pbip"), "{}").unwrap();
        fs::create_dir_all(temp.path().join("M.SemanticModel/definition")).unwrap();
        for (rel, text) in files {
            let path = temp.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        let layout = discover(temp.path()).unwrap();
        let project = load_files(layout, &RenameConfig::default()).unwrap();
        (ReferenceIndex::build(&project), temp)
    }

    #[test]
    fn test_resolve_by_name_and_table() {
        let (index, _temp) = index_of(&[
            (
                "M.SemanticModel/definition/tables/Sales.tmdl",
                "table Sales\n\n\tcolumn Key\n\t\tdataType: int64\n\n\tcolumn Amount\n\t\tdataType: int64\n",
            ),
            (
                "M.SemanticModel/definition/tables/Customer.tmdl",
                "table Customer\n\n\tcolumn Key\n\t\tdataType: int64\n",
            ),
        ]);

        let amount = index.resolve(EntityKind::Column, None, "amount").unwrap();
        assert_eq!(amount.name, QualifiedName::field("Sales", "Amount"));

        assert!(matches!(
            index.resolve(EntityKind::Column, None, "Key"),
            Err(UnknownReason::Ambiguous { .. })
        ));
        let key = index.resolve(EntityKind::Column, Some("customer"), "KEY").unwrap();
        assert_eq!(key.name, QualifiedName::field("Customer", "Key"));

        assert_eq!(index.resolve(EntityKind::Table, None, "Missing").unwrap_err(), UnknownReason::Missing);
        assert_eq!(index.fields_of("Sales").count(), 2);
    }

    #[test]
    fn test_occurrences_are_sorted_and_unique() {
        let (index, _temp) = index_of(&[(
            "M.SemanticModel/definition/tables/Sales.tmdl",
            "table Sales\n\n\tmeasure Total = SUM(Sales[Amount]) + SUM(Sales[Amount])\n\n\tcolumn Amount\n\t\tdataType: int64\n",
        )]);
        let amount = index.resolve(EntityKind::Column, Some("Sales"), "Amount").unwrap();
        let starts: Vec<_> = amount.occurrences.iter().map(|o| o.span.start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(starts, sorted);
        assert_eq!(starts.len(), 3);
    }
}
