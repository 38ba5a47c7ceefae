use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use modelrename::{EntityKind, RenameRequest};

use crate::output::OutputWriter;

pub async fn run(
    kind: EntityKind,
    old_name: String,
    new_name: String,
    table: Option<String>,
    preview: bool,
    project: PathBuf,
    format: &crate::OutputFormat,
) -> Result<()> {
    let request = RenameRequest {
        kind,
        table,
        old_name,
        new_name,
    };
    execute(&[request], preview, &project, format)
}

/// Preview or apply a batch of requests against the project at `project`
pub fn execute(requests: &[RenameRequest], preview: bool, project: &Path, format: &crate::OutputFormat) -> Result<()> {
    let output = OutputWriter::new(format);

    let mut handle = modelrename::load_project(project)
        .with_context(|| format!("Failed to load project at {}", project.display()))?;

    if preview {
        let preview = modelrename::preview_rename(&mut handle, requests)?;
        output.write_preview(&preview)?;
    } else {
        let report = modelrename::rename(&mut handle, requests)?;
        output.write_report(&report)?;
    }
    Ok(())
}
