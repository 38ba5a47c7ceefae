//! Validate rename requests against the reference index and turn them into
//! per-file edit lists.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use crate::core::{
    apply_edits, fold_name, EditError, EntityKey, EntityKind, Location, OccurrenceKind, PlanError, QualifiedName,
    TextEdit, TextSpan,
};
use crate::index::{FlaggedOccurrence, IndexedEntity, ReferenceIndex};
use crate::project::{FileKind, Project};

const MAX_NAME_CHARS: usize = 100;

/// One requested rename. All requests of a batch use pre-batch names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRequest {
    pub kind: EntityKind,
    /// Owning table for columns and measures; optional when the name is unique
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub old_name: String,
    pub new_name: String,
}

impl RenameRequest {
    pub fn table(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Table,
            table: None,
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    pub fn column(table: impl Into<String>, old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Column,
            table: Some(table.into()),
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    pub fn measure(table: impl Into<String>, old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Measure,
            table: Some(table.into()),
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    pub fn relationship(old_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Relationship,
            table: None,
            old_name: old_name.into(),
            new_name: new_name.into(),
        }
    }

    fn display_name(&self) -> String {
        match &self.table {
            Some(table) if self.kind.is_table_scoped() => QualifiedName::field(table, &self.old_name).to_string(),
            _ => self.old_name.clone(),
        }
    }
}

/// A request after resolution to a declared entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRename {
    pub kind: EntityKind,
    pub old: QualifiedName,
    pub new_name: String,
    pub occurrences: usize,
}

/// One edit of an occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedEdit {
    pub location: Location,
    #[serde(skip)]
    pub span: TextSpan,
    pub kind: OccurrenceKind,
    pub old_text: String,
    pub new_text: String,
}

/// All edits of one file, sorted by descending offset
#[derive(Debug, Clone)]
pub struct FilePlan {
    pub path: PathBuf,
    pub rel_path: PathBuf,
    pub kind: FileKind,
    /// File content the edits were computed against
    pub original: String,
    pub edits: Vec<PlannedEdit>,
}

impl FilePlan {
    pub fn new_content(&self) -> Result<String, EditError> {
        let edits: Vec<TextEdit> = self
            .edits
            .iter()
            .map(|e| TextEdit::new(e.span, e.new_text.clone()))
            .collect();
        apply_edits(&self.original, &edits)
    }
}

#[derive(Debug, Clone)]
pub struct RenamePlan {
    pub renames: Vec<ResolvedRename>,
    /// Files with at least one edit, in path order
    pub files: Vec<FilePlan>,
    /// Sites that match a renamed entity but are left untouched
    pub flagged: Vec<FlaggedOccurrence>,
}

impl RenamePlan {
    pub fn references_updated(&self) -> usize {
        self.files.iter().map(|f| f.edits.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Namespace a new name is claimed in, for collision detection inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Claim {
    Table(String),
    Field { table: String, name: String },
    Measure(String),
    Relationship(String),
}

pub fn plan(project: &Project, index: &ReferenceIndex, requests: &[RenameRequest]) -> Result<RenamePlan, PlanError> {
    if requests.is_empty() {
        return Err(PlanError::EmptyBatch);
    }

    let mut targets: Vec<(&IndexedEntity, &RenameRequest)> = Vec::with_capacity(requests.len());
    let mut seen: HashSet<EntityKey> = HashSet::new();
    let mut claims: HashMap<Claim, String> = HashMap::new();

    for request in requests {
        validate_name(&request.new_name)?;

        let entity = index
            .resolve(request.kind, request.table.as_deref(), &request.old_name)
            .map_err(|reason| PlanError::UnknownEntity {
                kind: request.kind,
                name: request.display_name(),
                reason,
            })?;

        if entity.name.name == request.new_name {
            return Err(PlanError::InvalidName {
                name: request.new_name.clone(),
                reason: "identical to the current name".to_string(),
            });
        }

        if !seen.insert(entity.key()) {
            let declaration = entity.occurrences.iter().find(|o| o.kind == OccurrenceKind::Declaration);
            let location = declaration.map(|o| o.location.clone()).unwrap_or(Location {
                file_path: entity.declared_in.clone(),
                line: 1,
                column: 1,
            });
            return Err(PlanError::ConflictingEdit {
                file: location.file_path,
                line: location.line,
                column: location.column,
            });
        }

        check_collision(index, entity, &request.new_name)?;

        for claim in claims_for(entity, &request.new_name) {
            if let Some(previous) = claims.insert(claim, entity.name.to_string()) {
                return Err(PlanError::NameCollision {
                    kind: entity.kind,
                    old_name: entity.name.to_string(),
                    new_name: request.new_name.clone(),
                    existing: format!("the rename of {} in the same batch", previous),
                });
            }
        }

        targets.push((entity, request));
    }

    let originals: HashMap<&PathBuf, _> = project.files.iter().map(|f| (&f.rel_path, f)).collect();
    let mut by_file: BTreeMap<PathBuf, Vec<PlannedEdit>> = BTreeMap::new();
    let mut renames = Vec::with_capacity(targets.len());

    for (entity, request) in &targets {
        let mut count = 0;
        for occurrence in &entity.occurrences {
            let new_text = occurrence.syntax.render(&request.new_name);
            if new_text == occurrence.text {
                continue;
            }
            count += 1;
            by_file
                .entry(occurrence.location.file_path.clone())
                .or_default()
                .push(PlannedEdit {
                    location: occurrence.location.clone(),
                    span: occurrence.span,
                    kind: occurrence.kind,
                    old_text: occurrence.text.clone(),
                    new_text,
                });
        }
        tracing::debug!("{} {} -> '{}': {} edits", entity.kind, entity.name, request.new_name, count);
        renames.push(ResolvedRename {
            kind: entity.kind,
            old: entity.name.clone(),
            new_name: request.new_name.clone(),
            occurrences: count,
        });
    }

    let mut files = Vec::with_capacity(by_file.len());
    for (rel_path, mut edits) in by_file {
        edits.sort_by_key(|e| e.span.start);
        for pair in edits.windows(2) {
            if pair[0].span.overlaps(&pair[1].span) || pair[0].span == pair[1].span {
                return Err(PlanError::ConflictingEdit {
                    file: rel_path,
                    line: pair[1].location.line,
                    column: pair[1].location.column,
                });
            }
        }
        edits.reverse();

        let Some(file) = originals.get(&rel_path) else {
            continue;
        };
        files.push(FilePlan {
            path: file.path.clone(),
            rel_path,
            kind: file.kind,
            original: file.text().to_string(),
            edits,
        });
    }

    let renamed: HashSet<EntityKey> = targets.iter().map(|(e, _)| e.key()).collect();
    let flagged = flagged_for(index, &targets, &renamed);

    let plan = RenamePlan { renames, files, flagged };
    tracing::info!(
        "Planned {} edits across {} files ({} flagged)",
        plan.references_updated(),
        plan.files.len(),
        plan.flagged.len()
    );
    Ok(plan)
}

fn validate_name(name: &str) -> Result<(), PlanError> {
    let invalid = |reason: &str| {
        Err(PlanError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    };
    if name.is_empty() {
        return invalid("name is empty");
    }
    if name.trim() != name {
        return invalid("leading or trailing whitespace");
    }
    if name.chars().any(char::is_control) {
        return invalid("contains control characters");
    }
    if name.contains(['/', '\\']) {
        return invalid("contains a path separator");
    }
    if name.chars().count() >= MAX_NAME_CHARS {
        return invalid("must be shorter than 100 characters");
    }
    Ok(())
}

/// Reject a new name already taken in the entity's namespace, ignoring the
/// entity itself so case-only renames pass.
fn check_collision(index: &ReferenceIndex, entity: &IndexedEntity, new_name: &str) -> Result<(), PlanError> {
    let own = entity.key();
    let folded = fold_name(new_name);
    let host = entity.name.table.as_deref().map(fold_name).unwrap_or_default();

    let existing = index.entities().find(|other| {
        let key = other.key();
        if key == own || key.name != folded {
            return false;
        }
        match entity.kind {
            EntityKind::Table => key.kind == EntityKind::Table,
            EntityKind::Relationship => key.kind == EntityKind::Relationship,
            EntityKind::Column => key.kind.is_table_scoped() && key.table == host,
            EntityKind::Measure => {
                key.kind == EntityKind::Measure || (key.kind == EntityKind::Column && key.table == host)
            }
        }
    });

    match existing {
        Some(other) => Err(PlanError::NameCollision {
            kind: entity.kind,
            old_name: entity.name.to_string(),
            new_name: new_name.to_string(),
            existing: format!("{} {}", other.kind, other.name),
        }),
        None => Ok(()),
    }
}

fn claims_for(entity: &IndexedEntity, new_name: &str) -> Vec<Claim> {
    let name = fold_name(new_name);
    let table = entity.name.table.as_deref().map(fold_name).unwrap_or_default();
    match entity.kind {
        EntityKind::Table => vec![Claim::Table(name)],
        EntityKind::Relationship => vec![Claim::Relationship(name)],
        EntityKind::Column => vec![Claim::Field { table, name }],
        EntityKind::Measure => vec![Claim::Field { table, name: name.clone() }, Claim::Measure(name)],
    }
}

/// Flagged sites that may refer to a renamed entity, plus untokenizable
/// formulas that mention one of the old names.
fn flagged_for(
    index: &ReferenceIndex,
    targets: &[(&IndexedEntity, &RenameRequest)],
    renamed: &HashSet<EntityKey>,
) -> Vec<FlaggedOccurrence> {
    let mut flagged: Vec<FlaggedOccurrence> = index
        .flagged()
        .iter()
        .filter(|f| f.candidates.iter().any(|c| renamed.contains(c)))
        .cloned()
        .collect();

    for region in index.opaque() {
        let text = fold_name(&region.text);
        let candidates: Vec<EntityKey> = targets
            .iter()
            .filter(|(entity, _)| text.contains(&fold_name(&entity.name.name)))
            .map(|(entity, _)| entity.key())
            .collect();
        if candidates.is_empty() {
            continue;
        }
        flagged.push(FlaggedOccurrence {
            location: region.location.clone(),
            span: region.span,
            text: region.text.clone(),
            reason: format!("formula could not be tokenized ({}) and was not edited", region.reason),
            candidates,
        });
    }

    flagged.sort_by(|a, b| (&a.location.file_path, a.span.start).cmp(&(&b.location.file_path, b.span.start)));
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenameConfig;
    use crate::project::{discover, load_files};
    use crate::core::UnknownReason;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const SALES: &str = "table Sales\n\n\tmeasure Total = SUM(Sales[Amount])\n\n\tcolumn Amount\n\t\tdataType: int64\n\n\tcolumn Region\n\t\tdataType: string\n";
    const DETAIL: &str = "table 'Sales Detail'\n\n\tmeasure 'Detail Total' = SUM('Sales Detail'[Qty])\n\n\tcolumn Qty\n\t\tdataType: int64\n";

    fn project(files: &[(&str, &str)]) -> (Project, ReferenceIndex, TempDir) {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("M.pbip"), "{}").unwrap();
        for (rel, text) in files {
            let path = temp.path().join("M.SemanticModel/definition/tables").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        let project = load_files(discover(temp.path()).unwrap(), &RenameConfig::default()).unwrap();
        let index = ReferenceIndex::build(&project);
        (project, index, temp)
    }

    fn sales() -> (Project, ReferenceIndex, TempDir) {
        project(&[("Sales.tmdl", SALES), ("Detail.tmdl", DETAIL)])
    }

    #[test]
    fn test_table_rename_quotes_new_name() {
        let (project, index, _temp) = sales();
        let plan = plan(&project, &index, &[RenameRequest::table("Sales", "Fact Sales")]).unwrap();

        assert_eq!(plan.files.len(), 1);
        let content = plan.files[0].new_content().unwrap();
        assert_eq!(
            content,
            SALES
                .replace("table Sales", "table 'Fact Sales'")
                .replace("SUM(Sales[Amount])", "SUM('Fact Sales'[Amount])")
        );
        assert_eq!(plan.renames[0].occurrences, 2);
    }

    #[test]
    fn test_edits_are_descending() {
        let (project, index, _temp) = sales();
        let plan = plan(&project, &index, &[RenameRequest::column("Sales", "Amount", "Net Amount")]).unwrap();
        let starts: Vec<_> = plan.files[0].edits.iter().map(|e| e.span.start).collect();
        let mut sorted = starts.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(starts, sorted);
        assert_eq!(plan.references_updated(), 2);
    }

    #[test]
    fn test_invalid_names() {
        let (project, index, _temp) = sales();
        let long = "x".repeat(100);
        for bad in ["", " Sales2", "Sales2 ", "Sa\nles", "Sales/2024", "Sales\\2024", long.as_str(), "Sales"] {
            let err = plan(&project, &index, &[RenameRequest::table("Sales", bad)]).unwrap_err();
            assert!(matches!(err, PlanError::InvalidName { .. }), "{bad:?}: {err}");
        }
        assert!(plan(&project, &index, &[RenameRequest::table("Sales", "x".repeat(99))]).is_ok());
    }

    #[test]
    fn test_case_only_rename_is_allowed() {
        let (project, index, _temp) = sales();
        let plan = plan(&project, &index, &[RenameRequest::table("Sales", "SALES")]).unwrap();
        assert_eq!(plan.references_updated(), 2);
    }

    #[test]
    fn test_unknown_and_ambiguous_entities() {
        let (project, index, _temp) = project(&[
            ("Sales.tmdl", SALES),
            ("Budget.tmdl", "table Budget\n\n\tcolumn Amount\n\t\tdataType: int64\n"),
        ]);
        let err = plan(&project, &index, &[RenameRequest::table("Nope", "X")]).unwrap_err();
        assert!(matches!(
            err,
            PlanError::UnknownEntity {
                reason: UnknownReason::Missing,
                ..
            }
        ));

        let ambiguous = RenameRequest {
            kind: EntityKind::Column,
            table: None,
            old_name: "Amount".into(),
            new_name: "Value".into(),
        };
        let err = plan(&project, &index, &[ambiguous]).unwrap_err();
        assert!(matches!(
            err,
            PlanError::UnknownEntity {
                reason: UnknownReason::Ambiguous { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_collisions() {
        let (project, index, _temp) = sales();
        let cases = [
            RenameRequest::table("Sales", "sales detail"),
            RenameRequest::column("Sales", "Amount", "region"),
            RenameRequest::column("Sales", "Amount", "Total"),
            RenameRequest::measure("Sales", "Total", "Detail Total"),
            RenameRequest::measure("Sales", "Total", "Amount"),
        ];
        for request in cases {
            let err = plan(&project, &index, &[request.clone()]).unwrap_err();
            assert!(matches!(err, PlanError::NameCollision { .. }), "{request:?}: {err}");
        }
    }

    #[test]
    fn test_batch_uses_pre_batch_names() {
        let (project, index, _temp) = sales();

        let swap = [
            RenameRequest::column("Sales", "Amount", "Region"),
            RenameRequest::column("Sales", "Region", "Amount"),
        ];
        assert!(matches!(
            plan(&project, &index, &swap).unwrap_err(),
            PlanError::NameCollision { .. }
        ));

        let same_target = [
            RenameRequest::column("Sales", "Amount", "Value"),
            RenameRequest::column("Sales", "Region", "value"),
        ];
        assert!(matches!(
            plan(&project, &index, &same_target).unwrap_err(),
            PlanError::NameCollision { .. }
        ));

        let table_and_column = [
            RenameRequest::table("Sales", "Fact Sales"),
            RenameRequest::column("Sales", "Amount", "Net Amount"),
        ];
        let plan = plan(&project, &index, &table_and_column).unwrap();
        assert!(plan.files[0]
            .new_content()
            .unwrap()
            .contains("SUM('Fact Sales'[Net Amount])"));
    }

    #[test]
    fn test_same_entity_twice_conflicts() {
        let (project, index, _temp) = sales();
        let requests = [RenameRequest::table("Sales", "A"), RenameRequest::table("sales", "B")];
        assert!(matches!(
            plan(&project, &index, &requests).unwrap_err(),
            PlanError::ConflictingEdit { .. }
        ));
    }

    #[test]
    fn test_empty_batch() {
        let (project, index, _temp) = sales();
        assert_eq!(plan(&project, &index, &[]).unwrap_err(), PlanError::EmptyBatch);
    }

    #[test]
    fn test_opaque_formula_mentioning_old_name_is_flagged() {
        let broken = "table Other\n\n\tmeasure Broken = IF(Sales[Amount] > 0, \"yes)\n\n\tcolumn Id\n\t\tdataType: int64\n";
        let (project, index, _temp) = project(&[("Sales.tmdl", SALES), ("Other.tmdl", broken)]);
        let plan = plan(&project, &index, &[RenameRequest::column("Sales", "Amount", "Net")]).unwrap();
        assert_eq!(plan.flagged.len(), 1);
        assert!(plan.flagged[0].location.file_path.ends_with("Other.tmdl"));
        assert!(plan.files.iter().all(|f| !f.rel_path.ends_with("Other.tmdl")));
    }
}
