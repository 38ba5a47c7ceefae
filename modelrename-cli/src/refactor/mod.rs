//! Planning and applying renames.

mod backup;
mod engine;
mod planner;
mod preview;
mod transaction;

pub use backup::{backup_parent, create_backup, list_backups, prune_backups, restore_backup, BackupInfo};
pub use engine::{
    describe_project, find_references, load_project, preview_rename, rename, rename_with_verifier, References,
};
pub use planner::{plan, FilePlan, PlannedEdit, RenamePlan, RenameRequest, ResolvedRename};
pub use preview::{generate_preview, PreviewChange, PreviewDiff, RenamePreview};
pub use transaction::{
    ApplyReport, DocumentVerifier, FileOperation, ParseVerifier, RenameTransaction, TransactionMode,
    TransactionPhase,
};
