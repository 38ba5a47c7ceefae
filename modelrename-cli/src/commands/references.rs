use anyhow::{Context, Result};
use std::path::PathBuf;

use modelrename::EntityKind;

use crate::output::OutputWriter;

pub async fn run(
    kind: EntityKind,
    name: String,
    table: Option<String>,
    include_declarations: bool,
    project: PathBuf,
    format: &crate::OutputFormat,
) -> Result<()> {
    let output = OutputWriter::new(format);

    let handle = modelrename::load_project(&project)
        .with_context(|| format!("Failed to load project at {}", project.display()))?;

    let mut references = modelrename::find_references(&handle, kind, table.as_deref(), &name)?;
    if !include_declarations {
        references
            .occurrences
            .retain(|o| o.kind != modelrename::OccurrenceKind::Declaration);
    }

    output.write_references(&references)?;
    Ok(())
}
