//! Entry points: load, inspect, preview and rename.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::core::{EntityKind, LoadError, Occurrence, PlanError, QualifiedName, RenameError};
use crate::index::{FlaggedOccurrence, ReferenceIndex};
use crate::project::{ProjectHandle, ProjectSchema};

use super::planner::{plan, RenameRequest};
use super::preview::RenamePreview;
use super::transaction::{ApplyReport, DocumentVerifier, ParseVerifier, RenameTransaction, TransactionMode};

pub fn load_project(path: &Path) -> Result<ProjectHandle, LoadError> {
    ProjectHandle::open(path)
}

/// Rename one or more entities everywhere they are referenced, atomically
pub fn rename(handle: &mut ProjectHandle, requests: &[RenameRequest]) -> Result<ApplyReport, RenameError> {
    let verifier = ParseVerifier::new(handle.config());
    rename_with_verifier(handle, requests, &verifier)
}

/// `rename` with a caller-supplied check of every written file
pub fn rename_with_verifier(
    handle: &mut ProjectHandle,
    requests: &[RenameRequest],
    verifier: &dyn DocumentVerifier,
) -> Result<ApplyReport, RenameError> {
    let lock = Arc::clone(&handle.lock);
    let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

    handle.reload()?;
    let index = ReferenceIndex::build(handle.project());
    let plan = plan(handle.project(), &index, requests)?;

    let report = RenameTransaction::new(handle.root(), TransactionMode::Execute, verifier, &handle.config().backup)
        .apply(&plan)?;

    if let Err(e) = handle.reload() {
        tracing::warn!("Rename committed but reloading the project failed: {}", e);
    }
    Ok(report)
}

/// Everything `rename` would do, without writing anything
pub fn preview_rename(handle: &mut ProjectHandle, requests: &[RenameRequest]) -> Result<RenamePreview, RenameError> {
    let lock = Arc::clone(&handle.lock);
    let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

    handle.reload()?;
    let index = ReferenceIndex::build(handle.project());
    let plan = plan(handle.project(), &index, requests)?;

    let verifier = ParseVerifier::new(handle.config());
    let report = RenameTransaction::new(handle.root(), TransactionMode::DryRun, &verifier, &handle.config().backup)
        .apply(&plan)?;
    Ok(RenamePreview::new(&plan, report)?)
}

pub fn describe_project(handle: &ProjectHandle) -> ProjectSchema {
    handle.schema()
}

/// Every occurrence of one entity, plus sites flagged as possibly referring to it
#[derive(Debug, Clone, Serialize)]
pub struct References {
    pub kind: EntityKind,
    pub name: QualifiedName,
    pub occurrences: Vec<Occurrence>,
    pub flagged: Vec<FlaggedOccurrence>,
}

pub fn find_references(
    handle: &ProjectHandle,
    kind: EntityKind,
    table: Option<&str>,
    name: &str,
) -> Result<References, PlanError> {
    let index = ReferenceIndex::build(handle.project());
    let entity = index
        .resolve(kind, table, name)
        .map_err(|reason| PlanError::UnknownEntity {
            kind,
            name: name.to_string(),
            reason,
        })?;
    let key = entity.key();

    Ok(References {
        kind,
        name: entity.name.clone(),
        occurrences: entity.occurrences.clone(),
        flagged: index
            .flagged()
            .iter()
            .filter(|f| f.candidates.contains(&key))
            .cloned()
            .collect(),
    })
}
