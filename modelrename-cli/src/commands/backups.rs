use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use modelrename::project::discover;
use modelrename::RenameConfig;

use crate::output::OutputWriter;

/// Project root and configured backup directory for `project`
fn locate(project: &Path) -> Result<(PathBuf, Option<PathBuf>)> {
    let layout = discover(project).with_context(|| format!("Failed to find project at {}", project.display()))?;
    let config = RenameConfig::load(&layout.root)?;
    Ok((layout.root, config.backup.directory))
}

pub async fn list(project: PathBuf, format: &crate::OutputFormat) -> Result<()> {
    let output = OutputWriter::new(format);
    let (root, directory) = locate(&project)?;

    let backups = modelrename::list_backups(&root, directory.as_deref())?;
    output.write_backups(&backups)?;
    Ok(())
}

pub async fn restore(backup: PathBuf, project: PathBuf, format: &crate::OutputFormat) -> Result<()> {
    let output = OutputWriter::new(format);
    let (root, _) = locate(&project)?;

    let restored = modelrename::restore_backup(&backup, &root)
        .with_context(|| format!("Failed to restore {}", backup.display()))?;
    output.write_paths("Restored files", &restored)?;
    Ok(())
}

pub async fn prune(keep: usize, project: PathBuf, format: &crate::OutputFormat) -> Result<()> {
    let output = OutputWriter::new(format);
    let (root, directory) = locate(&project)?;

    let removed = modelrename::prune_backups(&root, directory.as_deref(), keep)?;
    output.write_paths("Removed backups", &removed)?;
    Ok(())
}
