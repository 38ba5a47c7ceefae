use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{BackupConfig, RenameConfig};
use crate::core::{ApplyError, ParseError};
use crate::index::FlaggedOccurrence;
use crate::project::{parse_document, FileKind};

use super::backup::{create_backup, write_atomic};
use super::planner::{RenamePlan, ResolvedRename};

/// Checks that an edited file still parses with its grammar
pub trait DocumentVerifier: Send + Sync {
    fn verify(&self, kind: FileKind, text: &str) -> Result<(), ParseError>;
}

/// Re-parses with the same grammar and options the project was loaded with
#[derive(Debug, Clone)]
pub struct ParseVerifier {
    config: RenameConfig,
}

impl ParseVerifier {
    pub fn new(config: &RenameConfig) -> Self {
        Self { config: config.clone() }
    }
}

impl DocumentVerifier for ParseVerifier {
    fn verify(&self, kind: FileKind, text: &str) -> Result<(), ParseError> {
        parse_document(kind, text, &self.config).map(|_| ())
    }
}

/// A single file operation in a transaction
#[derive(Debug, Clone)]
pub struct FileOperation {
    pub path: PathBuf,

    /// Path relative to the project root, used in reports and the backup
    pub rel_path: PathBuf,

    pub kind: FileKind,

    /// The original content (for rollback)
    pub original_content: String,

    /// The new content to write
    pub new_content: String,

    /// Whether this operation has been applied
    pub applied: bool,
}

/// Transaction execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    /// Actually write files
    Execute,

    /// Dry-run - compute and verify in memory, don't write files
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionPhase {
    Idle,
    Snapshotting,
    Writing,
    Verifying,
    Committed,
    RolledBack,
}

/// Applies a rename plan with all-or-nothing semantics: every file is backed
/// up before the first write, and any failure restores every written file.
pub struct RenameTransaction<'v> {
    operations: Vec<FileOperation>,
    mode: TransactionMode,
    phase: TransactionPhase,
    root: PathBuf,
    verifier: &'v dyn DocumentVerifier,
    backup_config: BackupConfig,
    backup_path: Option<PathBuf>,
}

impl<'v> RenameTransaction<'v> {
    pub fn new(root: &Path, mode: TransactionMode, verifier: &'v dyn DocumentVerifier, backup: &BackupConfig) -> Self {
        Self {
            operations: Vec::new(),
            mode,
            phase: TransactionPhase::Idle,
            root: root.to_path_buf(),
            verifier,
            backup_config: backup.clone(),
            backup_path: None,
        }
    }

    /// Execute the plan. On error the project is unchanged unless the error
    /// is `RollbackFailed`.
    pub fn apply(mut self, plan: &RenamePlan) -> Result<ApplyReport, ApplyError> {
        self.stage(plan)?;

        if self.mode == TransactionMode::DryRun {
            for op in &self.operations {
                self.verifier
                    .verify(op.kind, &op.new_content)
                    .map_err(|error| ApplyError::VerificationFailed {
                        file: op.rel_path.clone(),
                        error,
                    })?;
            }
            tracing::info!("Dry run: {} files would change", self.operations.len());
            return Ok(self.report(plan));
        }

        self.check_stale()?;

        if !self.operations.is_empty() {
            self.enter(TransactionPhase::Snapshotting);
            let files: Vec<(&Path, &str)> = self
                .operations
                .iter()
                .map(|op| (op.rel_path.as_path(), op.original_content.as_str()))
                .collect();
            self.backup_path = Some(create_backup(&self.root, &files, self.backup_config.directory.as_deref())?);
        }

        self.enter(TransactionPhase::Writing);
        if let Err(e) = self.write_all() {
            return Err(self.fail(e));
        }

        self.enter(TransactionPhase::Verifying);
        if let Err(e) = self.verify_written() {
            return Err(self.fail(e));
        }

        self.enter(TransactionPhase::Committed);
        tracing::info!(
            "Committed {} edits across {} files",
            plan.references_updated(),
            self.operations.len()
        );
        Ok(self.report(plan))
    }

    fn enter(&mut self, phase: TransactionPhase) {
        tracing::debug!("Transaction {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn stage(&mut self, plan: &RenamePlan) -> Result<(), ApplyError> {
        for file in &plan.files {
            let new_content = file.new_content().map_err(|source| ApplyError::Edit {
                file: file.rel_path.clone(),
                source,
            })?;
            self.operations.push(FileOperation {
                path: file.path.clone(),
                rel_path: file.rel_path.clone(),
                kind: file.kind,
                original_content: file.original.clone(),
                new_content,
                applied: false,
            });
        }
        Ok(())
    }

    /// Every file must still hold the text the plan was computed against
    fn check_stale(&self) -> Result<(), ApplyError> {
        for op in &self.operations {
            let current = fs::read_to_string(&op.path).ok();
            if current.as_deref() != Some(op.original_content.as_str()) {
                tracing::warn!("{} changed since the project was loaded", op.rel_path.display());
                return Err(ApplyError::StaleProject {
                    file: op.rel_path.clone(),
                });
            }
        }
        Ok(())
    }

    fn write_all(&mut self) -> Result<(), ApplyError> {
        for op in &mut self.operations {
            write_atomic(&op.path, &op.new_content).map_err(|source| ApplyError::WriteFailed {
                file: op.rel_path.clone(),
                source,
            })?;
            op.applied = true;
            tracing::debug!("Wrote {}", op.rel_path.display());
        }
        Ok(())
    }

    fn verify_written(&self) -> Result<(), ApplyError> {
        for op in &self.operations {
            let text = fs::read_to_string(&op.path).map_err(|source| ApplyError::WriteFailed {
                file: op.rel_path.clone(),
                source,
            })?;
            self.verifier
                .verify(op.kind, &text)
                .map_err(|error| ApplyError::VerificationFailed {
                    file: op.rel_path.clone(),
                    error,
                })?;
        }
        Ok(())
    }

    /// Roll back, then return the original error, or `RollbackFailed` if
    /// restoring did not succeed
    fn fail(&mut self, error: ApplyError) -> ApplyError {
        tracing::error!("Rename failed: {}", error);
        match self.rollback() {
            Ok(()) => error,
            Err(rollback) => rollback,
        }
    }

    /// Rollback all applied operations
    fn rollback(&mut self) -> Result<(), ApplyError> {
        let mut errors = Vec::new();

        // Rollback in reverse order
        for op in self.operations.iter_mut().rev() {
            if !op.applied {
                continue;
            }
            match write_atomic(&op.path, &op.original_content) {
                Ok(()) => op.applied = false,
                Err(e) => errors.push(format!("{}: {}", op.rel_path.display(), e)),
            }
        }

        if !errors.is_empty() {
            let backup = self.backup_path.clone().unwrap_or_default();
            tracing::error!("Rollback failed, backup kept at {}", backup.display());
            return Err(ApplyError::RollbackFailed {
                errors: errors.join("; "),
                backup,
            });
        }

        self.enter(TransactionPhase::RolledBack);
        if let Some(backup) = self.backup_path.take() {
            if self.backup_config.retain_on_rollback {
                tracing::info!("Rolled back; backup retained at {}", backup.display());
            } else if let Err(e) = fs::remove_dir_all(&backup) {
                tracing::warn!("Failed to remove backup {}: {}", backup.display(), e);
            }
        }
        Ok(())
    }

    fn report(&self, plan: &RenamePlan) -> ApplyReport {
        ApplyReport {
            mode: self.mode,
            files_changed: self.operations.iter().map(|op| op.rel_path.clone()).collect(),
            references_updated: plan.references_updated(),
            backup_path: self.backup_path.clone(),
            renames: plan.renames.clone(),
            flagged: plan.flagged.clone(),
        }
    }
}

/// Outcome of a committed (or dry-run) rename
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub mode: TransactionMode,

    /// Files that were (or would be) modified, relative to the project root
    pub files_changed: Vec<PathBuf>,

    pub references_updated: usize,

    pub backup_path: Option<PathBuf>,

    pub renames: Vec<ResolvedRename>,

    /// Sites left untouched that may still refer to an old name
    pub flagged: Vec<FlaggedOccurrence>,
}

impl ApplyReport {
    /// Format result for display
    pub fn format_summary(&self) -> String {
        let mut output = String::new();

        output.push_str("========================================\n");
        output.push_str(if self.mode == TransactionMode::DryRun {
            "          DRY-RUN RENAME RESULT\n"
        } else {
            "             RENAME RESULT\n"
        });
        output.push_str("========================================\n\n");

        for rename in &self.renames {
            output.push_str(&format!(
                "✅ {} {} -> '{}' ({} reference{})\n",
                rename.kind,
                rename.old,
                rename.new_name,
                rename.occurrences,
                if rename.occurrences == 1 { "" } else { "s" }
            ));
        }

        output.push_str(&format!(
            "\n📊 {} reference{} updated\n",
            self.references_updated,
            if self.references_updated == 1 { "" } else { "s" }
        ));

        if !self.files_changed.is_empty() {
            output.push_str(&format!(
                "\n📝 {} file{} {}:\n",
                self.files_changed.len(),
                if self.files_changed.len() == 1 { "" } else { "s" },
                if self.mode == TransactionMode::DryRun {
                    "would be modified"
                } else {
                    "modified"
                }
            ));
            for file in &self.files_changed {
                output.push_str(&format!("   {}\n", file.display()));
            }
        }

        if let Some(backup) = &self.backup_path {
            output.push_str(&format!("\n💾 Backup: {}\n", backup.display()));
        }

        if !self.flagged.is_empty() {
            output.push_str(&format!(
                "\n⚠️  {} site{} not updated, review manually:\n",
                self.flagged.len(),
                if self.flagged.len() == 1 { "" } else { "s" }
            ));
            for flag in &self.flagged {
                output.push_str(&format!(
                    "   {}:{}:{}  {}  ({})\n",
                    flag.location.file_path.display(),
                    flag.location.line,
                    flag.location.column,
                    flag.text,
                    flag.reason
                ));
            }
        }

        output.push_str("\n========================================\n");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ReferenceIndex;
    use crate::project::{discover, load_files};
    use crate::refactor::planner::{plan, RenameRequest};
    use crate::report::ReportDialect;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SALES: &str = "table Sales\n\n\tmeasure Total = SUM(Sales[Amount])\n\n\tcolumn Amount\n\t\tdataType: int64\n";
    const VISUAL: &str = r#"{"query": {"Commands": [{"SemanticQueryDataShapeCommand": {"Query": {"From": [{"Name": "s", "Entity": "Sales"}]}}}]}}"#;

    struct Fixture {
        temp: TempDir,
        root: PathBuf,
        backup: BackupConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path().join("Shop");
            let write = |rel: &str, text: &str| {
                let path = root.join(rel);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(path, text).unwrap();
            };
            write("Shop.pbip", "{}");
            write("Shop.SemanticModel/definition/tables/Sales.tmdl", SALES);
            write("Shop.Report/definition/pages/p/visuals/v/visual.json", VISUAL);
            let backup = BackupConfig {
                retain_on_rollback: false,
                directory: Some(temp.path().join("backups")),
            };
            Self { temp, root, backup }
        }

        fn plan(&self) -> RenamePlan {
            let project = load_files(discover(&self.root).unwrap(), &RenameConfig::default()).unwrap();
            let index = ReferenceIndex::build(&project);
            plan(&project, &index, &[RenameRequest::table("Sales", "Fact Sales")]).unwrap()
        }

        fn read(&self, rel: &str) -> String {
            fs::read_to_string(self.root.join(rel)).unwrap()
        }

        fn backups(&self) -> usize {
            fs::read_dir(self.temp.path().join("backups")).map(|d| d.count()).unwrap_or(0)
        }
    }

    struct RejectKind(FileKind);

    impl DocumentVerifier for RejectKind {
        fn verify(&self, kind: FileKind, _text: &str) -> Result<(), ParseError> {
            if kind == self.0 {
                Err(ParseError::new(1, 1, "rejected"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_execute_writes_and_backs_up() {
        let fx = Fixture::new();
        let plan = fx.plan();
        let verifier = ParseVerifier::new(&RenameConfig::default());

        let report = RenameTransaction::new(&fx.root, TransactionMode::Execute, &verifier, &fx.backup)
            .apply(&plan)
            .unwrap();

        assert_eq!(report.files_changed.len(), 2);
        assert_eq!(report.references_updated, 3);
        assert!(fx
            .read("Shop.SemanticModel/definition/tables/Sales.tmdl")
            .starts_with("table 'Fact Sales'\n"));
        assert!(fx
            .read("Shop.Report/definition/pages/p/visuals/v/visual.json")
            .contains(r#""Entity": "Fact Sales""#));

        let backup = report.backup_path.unwrap();
        assert_eq!(
            fs::read_to_string(backup.join("Shop.SemanticModel/definition/tables/Sales.tmdl")).unwrap(),
            SALES
        );
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let fx = Fixture::new();
        let plan = fx.plan();
        let verifier = ParseVerifier::new(&RenameConfig::default());

        let report = RenameTransaction::new(&fx.root, TransactionMode::DryRun, &verifier, &fx.backup)
            .apply(&plan)
            .unwrap();

        assert_eq!(report.mode, TransactionMode::DryRun);
        assert_eq!(report.files_changed.len(), 2);
        assert!(report.backup_path.is_none());
        assert_eq!(fx.read("Shop.SemanticModel/definition/tables/Sales.tmdl"), SALES);
        assert_eq!(fx.backups(), 0);
        assert!(report.format_summary().contains("would be modified"));
    }

    #[test]
    fn test_verification_failure_rolls_back_every_file() {
        let fx = Fixture::new();
        let plan = fx.plan();
        let verifier = RejectKind(FileKind::Model);

        let err = RenameTransaction::new(&fx.root, TransactionMode::Execute, &verifier, &fx.backup)
            .apply(&plan)
            .unwrap_err();

        assert!(matches!(err, ApplyError::VerificationFailed { .. }));
        assert_eq!(fx.read("Shop.SemanticModel/definition/tables/Sales.tmdl"), SALES);
        assert_eq!(fx.read("Shop.Report/definition/pages/p/visuals/v/visual.json"), VISUAL);
        assert_eq!(fx.backups(), 0);
    }

    #[test]
    fn test_backup_retained_on_rollback_when_configured() {
        let mut fx = Fixture::new();
        fx.backup.retain_on_rollback = true;
        let plan = fx.plan();
        let verifier = RejectKind(FileKind::Report(ReportDialect::Current));

        assert!(RenameTransaction::new(&fx.root, TransactionMode::Execute, &verifier, &fx.backup)
            .apply(&plan)
            .is_err());
        assert_eq!(fx.backups(), 1);
        assert_eq!(fx.read("Shop.Report/definition/pages/p/visuals/v/visual.json"), VISUAL);
    }

    #[test]
    fn test_stale_file_is_rejected_before_writing() {
        let fx = Fixture::new();
        let plan = fx.plan();
        let changed = format!("{}\n\tmeasure Extra = 1\n", SALES);
        fs::write(fx.root.join("Shop.SemanticModel/definition/tables/Sales.tmdl"), &changed).unwrap();
        let verifier = ParseVerifier::new(&RenameConfig::default());

        let err = RenameTransaction::new(&fx.root, TransactionMode::Execute, &verifier, &fx.backup)
            .apply(&plan)
            .unwrap_err();

        assert!(matches!(err, ApplyError::StaleProject { .. }));
        assert_eq!(fx.read("Shop.Report/definition/pages/p/visuals/v/visual.json"), VISUAL);
        assert_eq!(fx.backups(), 0);
    }
}
