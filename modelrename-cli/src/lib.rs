//! Project-wide rename engine for Power BI projects (PBIP).
//!
//! A project is loaded into span-preserving documents (TMDL for the semantic
//! model, JSON for the report), every reference to every table, column,
//! measure and relationship is indexed, and a rename rewrites exactly those
//! byte ranges across all files in one all-or-nothing transaction.

pub mod config;
pub mod core;
pub mod dax;
pub mod index;
pub mod model;
pub mod project;
pub mod refactor;
pub mod report;

pub use config::RenameConfig;
pub use core::{
    ApplyError, BackupError, EntityKind, LoadError, Occurrence, OccurrenceKind, ParseError, PlanError,
    QualifiedName, RenameError,
};
pub use project::{ProjectHandle, ProjectLocks, ProjectSchema};
pub use refactor::{
    describe_project, find_references, list_backups, load_project, preview_rename, prune_backups, rename,
    restore_backup, ApplyReport, RenamePreview, RenameRequest,
};
