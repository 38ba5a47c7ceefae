use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use super::span::EditError;
use super::types::EntityKind;

/// Structural failure in a model or report document. Always fatal for the file.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("line {line}, column {column}: {reason}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub reason: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            column,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Project path not found: {0}")]
    NotFound(PathBuf),

    #[error("Could not find a valid PBIP project at {0}: expected a .pbip file, a .SemanticModel folder or TMDL files")]
    NotAProject(PathBuf),

    #[error("Semantic model {0} uses model.bim; only TMDL definition folders are supported")]
    UnsupportedFormat(PathBuf),

    #[error("Parse error in {file}: {error}")]
    Parse { file: PathBuf, error: ParseError },

    #[error("File too large to read: {file} ({size} bytes > {limit} bytes cap)")]
    FileTooLarge { file: PathBuf, size: u64, limit: u64 },

    #[error("{kind} '{name}' is declared in both {first} and {second}")]
    DuplicateEntity {
        kind: EntityKind,
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Why a rename request could not be resolved to one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum UnknownReason {
    Missing,
    Ambiguous { candidates: Vec<String> },
}

impl std::fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnknownReason::Missing => f.write_str("not found"),
            UnknownReason::Ambiguous { candidates } => {
                write!(f, "ambiguous between {}", candidates.join(", "))
            }
        }
    }
}

/// Validation failures. Nothing has been written when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("No rename requests given")]
    EmptyBatch,

    #[error("Invalid new name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Unknown {kind} '{name}': {reason}")]
    UnknownEntity {
        kind: EntityKind,
        name: String,
        reason: UnknownReason,
    },

    #[error("Cannot rename {kind} '{old_name}' to '{new_name}': name already used by {existing}")]
    NameCollision {
        kind: EntityKind,
        old_name: String,
        new_name: String,
        existing: String,
    },

    #[error("Conflicting edits in {file} at line {line}, column {column}")]
    ConflictingEdit {
        file: PathBuf,
        line: usize,
        column: usize,
    },
}

/// Execution failures. The project is back in its pre-operation state unless
/// the variant is `RollbackFailed`.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("{file} changed on disk since the project was loaded")]
    StaleProject { file: PathBuf },

    #[error("Failed to back up {file}: {source}")]
    BackupFailed {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to compute new content for {file}: {source}")]
    Edit {
        file: PathBuf,
        #[source]
        source: EditError,
    },

    #[error("Failed to write {file}: {source}. All changes have been rolled back.")]
    WriteFailed {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{file} no longer parses after editing ({error}). All changes have been rolled back.")]
    VerificationFailed { file: PathBuf, error: ParseError },

    #[error("CRITICAL: Rollback failed: {errors}. Restore manually from {backup}")]
    RollbackFailed { errors: String, backup: PathBuf },
}

#[derive(Error, Debug)]
pub enum RenameError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("{0} is not a backup directory")]
    NotABackup(PathBuf),

    #[error("Backup I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
