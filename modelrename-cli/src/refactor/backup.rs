//! Timestamped project backups written before every rename.
//!
//! A backup is a plain directory `<project>_backup_<YYYYMMDD_HHMMSS>` next to
//! the project (or under the configured backup directory) holding a copy of
//! every file the rename touches, at the same relative paths. Nothing is ever
//! pruned automatically.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::{ApplyError, BackupError};

const BACKUP_MARKER: &str = "_backup_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub created: Option<NaiveDateTime>,
    pub files: usize,
}

/// Directory that holds the backups of the project at `root`
pub fn backup_parent(root: &Path, directory: Option<&Path>) -> PathBuf {
    match directory {
        Some(dir) => dir.to_path_buf(),
        None => root.parent().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
    }
}

fn project_stem(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string())
}

/// Copy `files` (relative path, content) into a fresh backup directory.
/// A partially written backup is removed before the error is returned.
pub fn create_backup(root: &Path, files: &[(&Path, &str)], directory: Option<&Path>) -> Result<PathBuf, ApplyError> {
    let parent = backup_parent(root, directory);
    let stamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
    let base = format!("{}{}{}", project_stem(root), BACKUP_MARKER, stamp);

    let mut backup = parent.join(&base);
    let mut suffix = 1;
    while backup.exists() {
        backup = parent.join(format!("{}_{}", base, suffix));
        suffix += 1;
    }

    let result = files.iter().try_for_each(|(rel, content)| {
        let target = backup.join(rel);
        write_file(&target, content).map_err(|source| ApplyError::BackupFailed {
            file: rel.to_path_buf(),
            source,
        })
    });

    if let Err(e) = result {
        if backup.exists() {
            if let Err(cleanup) = fs::remove_dir_all(&backup) {
                tracing::warn!("Failed to remove partial backup {}: {}", backup.display(), cleanup);
            }
        }
        return Err(e);
    }

    tracing::info!("Backed up {} files to {}", files.len(), backup.display());
    Ok(backup)
}

fn write_file(path: &Path, content: &str) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, content)
}

/// Replace `path` with `content` through a temp file in the same directory,
/// so readers never see a half-written file.
pub(crate) fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory"))?;
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Backups of the project at `root`, newest first
pub fn list_backups(root: &Path, directory: Option<&Path>) -> Result<Vec<BackupInfo>, BackupError> {
    let parent = backup_parent(root, directory);
    let prefix = format!("{}{}", project_stem(root), BACKUP_MARKER);
    if !parent.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&parent).map_err(|source| BackupError::Io {
        path: parent.clone(),
        source,
    })?;

    let mut backups = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        if !path.is_dir() {
            continue;
        }
        let files = WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count();
        backups.push((sequence(rest), BackupInfo {
            path,
            created: parse_timestamp(rest),
            files,
        }));
    }

    backups.sort_by(|(a_seq, a), (b_seq, b)| (b.created, b_seq).cmp(&(a.created, a_seq)));
    Ok(backups.into_iter().map(|(_, info)| info).collect())
}

fn parse_timestamp(rest: &str) -> Option<NaiveDateTime> {
    let stamp = rest.get(..15)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

/// Collision suffix after the timestamp, 0 when absent
fn sequence(rest: &str) -> u32 {
    rest.get(16..).and_then(|s| s.parse().ok()).unwrap_or(0)
}

/// Copy every file of `backup` back over the project at `root`.
/// Returns the restored relative paths.
pub fn restore_backup(backup: &Path, root: &Path) -> Result<Vec<PathBuf>, BackupError> {
    let is_backup = backup
        .file_name()
        .map(|n| n.to_string_lossy().contains(BACKUP_MARKER))
        .unwrap_or(false);
    if !is_backup || !backup.is_dir() {
        return Err(BackupError::NotABackup(backup.to_path_buf()));
    }

    let mut restored = Vec::new();
    for entry in WalkDir::new(backup).sort_by_file_name() {
        let entry = entry.map_err(|e| BackupError::Io {
            path: backup.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = pathdiff::diff_paths(entry.path(), backup) else {
            continue;
        };
        let io_err = |source| BackupError::Io {
            path: entry.path().to_path_buf(),
            source,
        };
        let content = fs::read_to_string(entry.path()).map_err(io_err)?;
        let target = root.join(&rel);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        write_atomic(&target, &content).map_err(io_err)?;
        restored.push(rel);
    }

    tracing::info!("Restored {} files from {}", restored.len(), backup.display());
    Ok(restored)
}

/// Delete all but the newest `keep` backups. Returns the removed directories.
pub fn prune_backups(root: &Path, directory: Option<&Path>, keep: usize) -> Result<Vec<PathBuf>, BackupError> {
    let mut removed = Vec::new();
    for info in list_backups(root, directory)?.into_iter().skip(keep) {
        fs::remove_dir_all(&info.path).map_err(|source| BackupError::Io {
            path: info.path.clone(),
            source,
        })?;
        tracing::info!("Removed backup {}", info.path.display());
        removed.push(info.path);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project(temp: &TempDir) -> PathBuf {
        let root = temp.path().join("Shop");
        fs::create_dir_all(root.join("Shop.SemanticModel/definition")).unwrap();
        fs::write(root.join("Shop.SemanticModel/definition/model.tmdl"), "model Model\n").unwrap();
        root
    }

    #[test]
    fn test_create_and_restore_backup() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let rel = Path::new("Shop.SemanticModel/definition/model.tmdl");

        let backup = create_backup(&root, &[(rel, "model Model\n")], None).unwrap();
        assert_eq!(backup.parent().unwrap(), temp.path());
        assert!(backup.file_name().unwrap().to_string_lossy().starts_with("Shop_backup_"));
        assert_eq!(fs::read_to_string(backup.join(rel)).unwrap(), "model Model\n");

        fs::write(root.join(rel), "model Changed\n").unwrap();
        let restored = restore_backup(&backup, &root).unwrap();
        assert_eq!(restored, vec![rel.to_path_buf()]);
        assert_eq!(fs::read_to_string(root.join(rel)).unwrap(), "model Model\n");
    }

    #[test]
    fn test_backup_names_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let store = temp.path().join("backups");
        let rel = Path::new("a.tmdl");

        let first = create_backup(&root, &[(rel, "a")], Some(&store)).unwrap();
        let second = create_backup(&root, &[(rel, "b")], Some(&store)).unwrap();
        assert_ne!(first, second);
        assert_eq!(first.parent().unwrap(), store);

        let listed = list_backups(&root, Some(&store)).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|b| b.created.is_some() && b.files == 1));
    }

    #[test]
    fn test_prune_keeps_newest() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        let store = temp.path().join("backups");
        for stamp in ["20240101_000000", "20250101_000000", "20260101_000000"] {
            let dir = store.join(format!("Shop_backup_{}", stamp));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("x.tmdl"), "x").unwrap();
        }
        fs::create_dir_all(store.join("Other_backup_20260101_000000")).unwrap();

        let removed = prune_backups(&root, Some(&store), 1).unwrap();
        assert_eq!(removed.len(), 2);
        let left = list_backups(&root, Some(&store)).unwrap();
        assert_eq!(left.len(), 1);
        assert!(left[0].path.ends_with("Shop_backup_20260101_000000"));
        assert!(store.join("Other_backup_20260101_000000").exists());
    }

    #[test]
    fn test_restore_rejects_non_backup() {
        let temp = TempDir::new().unwrap();
        let root = project(&temp);
        assert!(matches!(
            restore_backup(&root, &root),
            Err(BackupError::NotABackup(_))
        ));
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("file.json");
        fs::write(&path, "old").unwrap();
        write_atomic(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }
}
