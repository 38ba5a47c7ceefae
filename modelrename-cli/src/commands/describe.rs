use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::output::OutputWriter;

pub async fn run(project: PathBuf, format: &crate::OutputFormat) -> Result<()> {
    let output = OutputWriter::new(format);

    let handle = modelrename::load_project(&project)
        .with_context(|| format!("Failed to load project at {}", project.display()))?;

    output.write_schema(&modelrename::describe_project(&handle))?;
    Ok(())
}
